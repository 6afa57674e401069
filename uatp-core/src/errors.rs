// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Errors specific to the transport core.

use thiserror::Error;

/// Error loading or saving transport configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("Cannot access configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// The file content is not valid configuration.
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// The configuration violates a transport constraint.
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
