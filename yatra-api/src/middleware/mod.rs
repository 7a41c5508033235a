pub mod auth;

pub use auth::{auth_middleware, issue_token, staff_auth_middleware, Claims};
