//! Execution layer: artifacts, child processes and output capture
//!
//! This module materializes a snippet on disk, launches the interpreter
//! against it under a deadline and hands back what it printed.

pub mod capture;
pub mod process;
pub mod runner;
pub mod unit;

pub use capture::{StreamCollector, TRUNCATION_MARKER};
pub use process::ProcessHandle;
pub use runner::{ProcessRunner, RunOutcome, Runner};
pub use unit::ExecutionUnit;
