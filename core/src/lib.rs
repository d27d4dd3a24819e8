//! # Vesta Core
//!
//! Backend-agnostic building blocks for the Vesta frame scheduler: the generic
//! object pool and the profiling macros.

pub mod pool;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
