//! Wash network management server library
//!
//! Exports the modules used by the server binary and by integration code
//! that needs the same configuration, persistence and service layers.

pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::AppSettings;
pub use error::{AppError, AppResult};
