//! playground-sandbox: run untrusted snippets in an isolated interpreter
//!
//! Every snippet goes through three layers: a textual policy check, a
//! throwaway interpreter process with its own scratch directory and resource
//! limits, and a coordinator that turns every outcome into a plain
//! `{stdout, stderr}` pair.
//!
//! # Modules
//!
//! - **policy**: Forbidden imports and call patterns
//! - **execution**: Scratch units, output capture and the process runner
//! - **isolation**: Namespaces + rlimits applied in the child before exec
//! - **config**: Runner configuration and validation
//! - **profiles**: Named limit presets
//! - **controller**: Execution orchestration
//!
//! # Example
//!
//! ```ignore
//! use playground_sandbox::ExecutorBuilder;
//! use std::time::Duration;
//!
//! let executor = ExecutorBuilder::new()
//!     .memory_limit_str("256M")?
//!     .deadline(Duration::from_secs(5))
//!     .build()?;
//!
//! let result = executor.execute_code("print('hello world')");
//! println!("{}", result.stdout);
//! ```

// Core modules
pub mod errors;
pub mod logging;
pub mod utils;

// Layered modules
pub mod config;
pub mod execution;
pub mod isolation;
pub mod policy;
pub mod profiles;

// Main controller
pub mod controller;

// Public API
pub use config::SandboxConfig;
pub use controller::{
    ExecutionRequest, ExecutionResult, Executor, ExecutorBuilder, INTERNAL_ERROR_MESSAGE,
};
pub use errors::{Result, SandboxError};
pub use execution::{ProcessRunner, RunOutcome, Runner};
pub use isolation::{NamespaceConfig, RlimitConfig};
pub use policy::{PolicyTable, ValidationVerdict};
pub use profiles::SecurityProfile;
