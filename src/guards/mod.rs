pub mod auth;
pub mod session;

pub use auth::AuthGuard;
pub use session::{Session, SessionSnapshot};
