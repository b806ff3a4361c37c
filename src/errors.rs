//! Error types for sandbox operations

use std::io;
use thiserror::Error;

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Host-side failures while preparing or supervising a run.
///
/// None of these ever reach a caller verbatim: the coordinator logs the
/// detail and answers with a generic diagnostic.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Seccomp error: {0}")]
    Seccomp(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn interpreter: {0}")]
    Spawn(String),

    #[error("Output capture failed: {0}")]
    Capture(String),
}
