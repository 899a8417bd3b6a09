pub mod config;
pub mod error;
pub mod jwt;
pub mod messages;
pub mod utils;

pub use crate::config::*;
pub use error::*;
pub use messages::*;
pub use utils::*;
