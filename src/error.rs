//! # Error Types
//!
//! This module defines the error type for the fallible edges of the trainer.
//!
//! Question generation, session assembly and mastery tracking never fail: they fall back to
//! safe defaults instead. Errors only surface where text or files enter the crate.
//!
//! ## Error Types
//! - `ConfigError` - A generator configuration value is out of range or unrecognised
//! - `Yaml` - Configuration or authored content is not valid YAML
//! - `Json` - A persisted progress snapshot is not valid JSON
//! - `Io` - A file could not be read or written (CLI only)
//! - `UnknownConcept` - A concept key string is outside the recognised families
//!
//! ## Usage
//! ```rust
//! use eartrain::{GeneratorConfig, TrainerError};
//!
//! match GeneratorConfig::from_yaml("tempo: 0") {
//!     Ok(config) => println!("{} modes enabled", config.modes.len()),
//!     Err(TrainerError::ConfigError(message)) => eprintln!("bad config: {}", message),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    /// Invalid configuration value.
    ///
    /// # Example
    /// ```
    /// # use eartrain::TrainerError;
    /// let err = TrainerError::ConfigError("tempo must be positive".to_string());
    /// assert_eq!(err.to_string(), "Invalid configuration: tempo must be positive");
    /// ```
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// YAML that could not be deserialized (configuration or authored content).
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON that could not be deserialized (progress snapshot files).
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File access failure.
    #[error("Cannot access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Concept key outside the recognised prefix families.
    ///
    /// # Example
    /// ```
    /// # use eartrain::TrainerError;
    /// let err = TrainerError::UnknownConcept("tempo:fast".to_string());
    /// assert_eq!(err.to_string(), "Unknown concept key: tempo:fast");
    /// ```
    #[error("Unknown concept key: {0}")]
    UnknownConcept(String),
}
