//! raster_skim: quick statistical profiles of labeled raster datasets
//!
//! A Rust library for skimming multi-dimensional geospatial datasets. For each
//! data variable it reports the element type, whether any value is missing,
//! and the mean, standard deviation, minimum and maximum over the whole array.
//! Alongside the statistics it resolves the grid resolution and coordinate
//! reference system from whichever attribute convention the producer used,
//! and it measures the per-column memory footprint of the dataset's tabular
//! projection.
//!
//! ## Key Features
//!
//! - **Eager or chunked**: Variables may be in-memory arrays or chunked arrays
//!   whose chunks are loaded only while a deferred graph executes
//! - **Parallel Processing**: Rayon thread pools or a Tokio runtime resolve
//!   chunked computations
//! - **Convention tolerant**: Ordered, configurable fallbacks for spatial metadata
//! - **One table**: The same profile and memory profile for eager and chunked
//!   representations of the same data
//!
//! ## Module Organization
//!
//! - [`dataset`]: The dataset handle, its variables and builder
//! - [`array`] / [`chunked`]: Eager and chunked array storage
//! - [`scheduler`]: Deferred graphs and the schedulers that execute them
//! - [`statistics`]: Reductions and per-variable statistics
//! - [`metadata`]: Schema enumeration and variable descriptions
//! - [`spatial`]: Resolution and coordinate reference resolution
//! - [`memory`]: Memory footprint of the row projection
//! - [`profile`]: The profiling engine and its output table
//! - [`presentation`]: Map and density-curve data for front ends
//! - [`config`] / [`parallel`]: Configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage
//!
//! ```rust
//! use ndarray::{ArrayD, IxDyn};
//! use raster_skim::prelude::*;
//!
//! let elevation = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0_f64, 2.0, 3.0, f64::NAN]).unwrap();
//! let dataset = Dataset::builder()
//!     .data_var("elevation", &["y", "x"], elevation)
//!     .coord("x", &["x"], ArrayD::from_shape_vec(IxDyn(&[2]), vec![500.0_f64, 510.0]).unwrap())
//!     .attr("CRS", "EPSG:32615")
//!     .build()
//!     .unwrap();
//!
//! let profile = raster_skim::profile(&dataset).unwrap();
//! assert!(profile.rows[0].has_missing);
//! assert_eq!(profile.resolution.value(), Some(&10.0));
//!
//! // The same answers from a chunked copy of the dataset
//! let lazy = dataset.chunk(&[("x", 1)]).unwrap();
//! assert_eq!(raster_skim::memory_profile(&lazy).unwrap(), raster_skim::memory_profile(&dataset).unwrap());
//! ```

// Core modules
pub mod array;
pub mod chunked;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod memory;
pub mod metadata;
pub mod parallel;
pub mod presentation;
pub mod profile;
pub mod scheduler;
pub mod spatial;
pub mod statistics;

// Direct re-exports for the public API
pub use array::{ArrayData, ElementType};
pub use chunked::{ChunkSpec, ChunkedArray};
pub use config::ProfilerConfig;
pub use dataset::{ArrayBackend, Attributes, Dataset, DatasetBuilder, Dimension, Variable};
pub use errors::{MetadataField, MissingMetadata, Result, SkimError};
pub use memory::{MemoryProfile, INDEX_COLUMN};
pub use metadata::{describe, schema, SchemaEntry};
pub use parallel::ParallelConfig;
pub use profile::{
    memory_profile, profile, DatasetProfile, ProfileRecord, ProfileTable, Profiler,
    VariableProfile,
};
pub use scheduler::{AsyncScheduler, Deferred, Pending, Scheduler, Task, ThreadPoolScheduler};
pub use spatial::{MetadataSource, Resolved, SpatialConfig, SpatialMetadata};
pub use statistics::{ArrayReduction, ReduceKind};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::array::{ArrayData, ElementType};
    pub use crate::chunked::ChunkedArray;
    pub use crate::config::ProfilerConfig;
    pub use crate::dataset::{Dataset, Variable};
    pub use crate::errors::{Result, SkimError};
    pub use crate::parallel::ParallelConfig;
    pub use crate::profile::{DatasetProfile, Profiler};
    pub use crate::scheduler::{AsyncScheduler, Scheduler, ThreadPoolScheduler};
    pub use crate::spatial::{Resolved, SpatialConfig};
    pub use crate::statistics::{ArrayReduction, ReduceKind};
}
