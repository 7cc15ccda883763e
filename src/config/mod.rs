//! Configuration module for client settings and YAML loading
//!
//! This module provides:
//! - Configuration types (`ClientConfig`, `BookConfig`)
//! - YAML loading with env overrides (`load_config`)
//! - Logging setup (`init_logging`)

mod loader;
pub mod logging;
mod types;

// Re-export types
pub use types::{BookConfig, ClientConfig};

// Re-export loader functions
pub use loader::{load_config, load_config_from_str};

// Re-export logging functions
pub use logging::init_logging;
