pub mod intake;
pub mod jwt;
pub mod notifier;
pub mod workflow;

pub use intake::IntakeRoute;
pub use jwt::{JwtService, PasswordService};
pub use notifier::{ClientService, NotificationService};
pub use workflow::{Transition, WorkflowError};
