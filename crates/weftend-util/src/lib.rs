//! Canonical JSON, digests, atomic writes, and error/exit-code plumbing
//! shared by every weftend crate.

pub mod atomic;
pub mod canon;
pub mod error;
pub mod paths;

pub use error::{ExitCode, WeftEndError};
