//! Shared JIT types: host tags and the error type

pub mod constants;
pub mod error;

pub use constants::*;
pub use error::{JitError, JitResult};
