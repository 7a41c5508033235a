pub mod models;
pub mod pii;

pub use models::notification::{NotificationPayload, TemplateKind};
pub use pii::Masked;
