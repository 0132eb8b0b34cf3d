//! Shared library for the VPN management console
//!
//! This library contains the pieces used by both the HTTP layer and the stores:
//! - Access-gating entities (settings, blocks, rules, counters, events, API keys)
//! - The application error taxonomy
//! - Environment configuration
//! - Common response types

pub mod config;
pub mod error;
pub mod models;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use models::*;
pub use types::*;
