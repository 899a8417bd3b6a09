pub mod auth;

pub use auth::{RequireAuth, Unauthorized};
