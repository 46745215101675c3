//! Anomaly daemon library
//!
//! Composition root for the import anomaly store:
//! - configuration loading
//! - store construction (memory or Redis)
//! - REST API over the store operations
//! - optional expiry sweeper

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod sweeper;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::{build_store, Server};
pub use sweeper::Sweeper;
