//! Profiler configuration
//!
//! Every field has a default, so partial JSON documents are accepted:
//!
//! ```
//! use raster_skim::config::ProfilerConfig;
//!
//! let config = ProfilerConfig::from_json_str(
//!     r#"{ "parallel": { "num_threads": 2 }, "spatial": { "crs_keys": ["epsg"] } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.parallel.num_threads, Some(2));
//! assert_eq!(config.spatial.resolution_keys, ["resolution", "res"]);
//! ```

use crate::errors::Result;
use crate::parallel::ParallelConfig;
use crate::spatial::SpatialConfig;
use serde::{Deserialize, Serialize};

/// Configuration of a [`Profiler`](crate::profile::Profiler)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilerConfig {
    /// Thread pool used to resolve chunked computations and density curves
    pub parallel: ParallelConfig,
    /// Candidate keys for spatial metadata
    pub spatial: SpatialConfig,
}

impl ProfilerConfig {
    /// Reads a configuration from a JSON value
    ///
    /// # Errors
    ///
    /// Returns [`SkimError::Config`](crate::errors::SkimError::Config) if the
    /// value does not describe a configuration.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Reads a configuration from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`SkimError::Config`](crate::errors::SkimError::Config) on
    /// malformed JSON or unknown fields.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_spatial(mut self, spatial: SpatialConfig) -> Self {
        self.spatial = spatial;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SkimError;
    use serde_json::json;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(ProfilerConfig::from_json(json!({})).unwrap(), ProfilerConfig::default());
    }

    #[test]
    fn type_mismatch_is_a_config_error() {
        let err = ProfilerConfig::from_json(json!({ "parallel": { "num_threads": "four" } })).unwrap_err();
        assert!(matches!(err, SkimError::Config(_)));
        assert!(ProfilerConfig::from_json(json!({ "threads": 4 })).is_err());
    }

    #[test]
    fn nested_typo_is_a_config_error() {
        for document in [
            json!({ "spatial": { "crs_key": ["epsg"] } }),
            json!({ "parallel": { "threads": 2 } }),
        ] {
            let err = ProfilerConfig::from_json(document).unwrap_err();
            assert!(matches!(err, SkimError::Config(_)));
        }
    }
}
