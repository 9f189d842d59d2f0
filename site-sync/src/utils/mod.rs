//! Utility modules for site-sync.

pub mod errors;
pub mod limiter;
pub mod logger;

pub use errors::{Result, SyncError};
pub use limiter::Limiter;
