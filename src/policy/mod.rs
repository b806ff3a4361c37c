//! Policy layer: textual deny-list screening of snippets
//!
//! The validator runs before anything is spawned and turns away snippets
//! that name forbidden modules or primitives (filesystem, process spawning,
//! network, dynamic evaluation, raw input).
//!
//! This is a heuristic. It cannot see through string concatenation,
//! `getattr` indirection or other obfuscation, so it is never the security
//! boundary on its own: the runner's process isolation (and whatever
//! host-level sandboxing the deployment adds underneath) has to contain
//! anything that slips past it.

pub mod table;
pub mod validator;

pub use table::{CallPattern, PatternKind, PolicyTable};
pub use validator::{Rejection, RejectionKind, ValidationVerdict, validate};
