pub mod auth;
pub mod client;
pub mod file_upload;
pub mod job;
pub mod notification;
pub mod operations;
pub mod payment;
pub mod role;
pub mod service;
pub mod user;
