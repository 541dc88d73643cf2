//! Statistical reductions over eager and chunked arrays
//!
//! This module provides whole-array reductions (sum, mean, std, min, max and
//! null count) behind one interface, whether the values live in memory or are
//! produced chunk by chunk while a deferred graph executes.
//!
//! # Organization
//!
//! This module is organized into submodules:
//! - [`operations`]: Reduction kinds, mergeable partials and the [`ArrayReduction`] adapter
//! - [`parallel`]: Rayon fold/reduce over in-memory arrays
//! - [`aggregate`]: Per-variable statistics for a whole dataset

pub mod aggregate;
pub mod operations;
pub mod parallel;

// Re-export the main types and functions for convenience
pub use aggregate::variable_profiles;
pub use operations::{ArrayReduction, Moments, ReduceKind, Reduction, Sample};
