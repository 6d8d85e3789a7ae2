pub mod account;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod mail;
pub mod middleware;
pub mod password;
pub mod provider;
pub mod server;
pub mod session;
pub mod store;
pub mod token;

pub use error::{AuthError, Result};
