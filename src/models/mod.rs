pub mod user;
pub mod role;
pub mod job;
pub mod company;
pub mod client;
pub mod service;
pub mod notification;
pub mod payment;

pub use user::*;
pub use role::*;
pub use job::*;
pub use company::*;
pub use client::*;
pub use service::*;
pub use notification::*;
pub use payment::*;

use mongodb::bson::DateTime;

/// Timestamps leave the API as RFC 3339 strings.
pub fn to_rfc3339(dt: DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
