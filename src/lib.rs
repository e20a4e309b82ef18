//! Home Assistant time machine core.
//!
//! Browses timestamped backups of a Home Assistant configuration tree,
//! detects per-item changes against the live configuration and restores
//! individual YAML items or whole files without reformatting anything else.

pub mod config;
pub mod error;
pub mod fs;
pub mod models;
pub mod services;
pub mod yaml;

pub use config::AppConfig;
pub use error::TimeMachineError;
pub type Result<T> = std::result::Result<T, TimeMachineError>;
