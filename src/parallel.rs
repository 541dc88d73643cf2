//! Parallel processing configuration
//!
//! This module describes how the thread pools behind the schedulers are sized.
//! Pools are always built locally and owned by their scheduler; the global
//! Rayon pool is never reconfigured, so independent profilers cannot interfere.

use crate::errors::{Result, SkimError};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for parallel processing
///
/// Sizes the pool that runs chunk tasks and density evaluation. Eager
/// in-memory reductions fold on Rayon's global pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that lets the pool pick its own size
    pub fn new_default() -> Self {
        Self { num_threads: None }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Build a dedicated Rayon thread pool with this configuration
    pub fn build_pool(&self) -> Result<rayon::ThreadPool> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("raster-skim-{i}"));
        if let Some(num_threads) = self.num_threads {
            if num_threads == 0 {
                return Err(SkimError::ThreadPoolError(
                    "Thread count must be at least 1".to_string(),
                ));
            }
            builder = builder.num_threads(num_threads);
        }

        let pool = builder.build().map_err(|e| {
            SkimError::ThreadPoolError(format!(
                "Failed to initialize thread pool with {:?} threads: {}",
                self.num_threads, e
            ))
        })?;
        debug!(
            threads = pool.current_num_threads(),
            available_cores = num_cpus::get(),
            "built thread pool"
        );
        Ok(pool)
    }
}
