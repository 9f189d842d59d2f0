//! Site Sync Library
//!
//! Mirrors per-tenant source folders from a delta feed, builds them, and
//! publishes the result to object stores by manifest diff.

pub mod build;
pub mod cache;
pub mod config;
pub mod deploy;
pub mod fs;
pub mod mirror;
pub mod publish;
pub mod reporter;
pub mod tenant;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use deploy::{DeployOrchestrator, DeployOutcome, DeployReport};
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
