//! Centralized error handling for raster_skim
//!
//! Every fallible operation in the crate returns [`Result`]. Metadata that
//! cannot be resolved is not fatal to a profile, so it has its own
//! [`MissingMetadata`] type that travels inside the profile and converts into
//! [`SkimError`] when a caller requires the value.

use crate::array::ElementType;
use crate::statistics::ReduceKind;
use std::fmt;
use thiserror::Error;

/// Main error type for raster_skim operations
#[derive(Debug, Error)]
pub enum SkimError {
    /// The argument is not a well-formed dataset (or a helper received
    /// malformed arguments)
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A spatial metadata field could not be resolved by any policy
    #[error(transparent)]
    MissingMetadata(#[from] MissingMetadata),

    /// Statistics for a variable could not be computed
    #[error("Reduction failed for variable '{variable}': {source}")]
    ReductionFailure {
        variable: String,
        #[source]
        source: Box<SkimError>,
    },

    /// The backend cannot apply a reduction to this element type
    #[error("Cannot compute {kind} over elements of type {dtype}")]
    UnsupportedReduction { kind: ReduceKind, dtype: ElementType },

    /// A task of a deferred computation failed while executing
    #[error("Task '{task}' failed: {message}")]
    Execution { task: String, message: String },

    /// Thread pool or runtime configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Configuration could not be interpreted
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl SkimError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SkimError::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn execution(task: impl Into<String>, message: impl Into<String>) -> Self {
        SkimError::Execution {
            task: task.into(),
            message: message.into(),
        }
    }
}

/// Which dataset-scalar field could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Resolution,
    SpatialReference,
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataField::Resolution => write!(f, "resolution"),
            MetadataField::SpatialReference => write!(f, "spatial reference"),
        }
    }
}

/// A spatial metadata field that no resolution policy could produce
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Missing metadata: no {field} could be resolved (tried: {})", .tried.join(", "))]
pub struct MissingMetadata {
    pub field: MetadataField,
    /// Attribute keys and coordinates that were consulted, in order
    pub tried: Vec<String>,
}

/// Result type alias for raster_skim operations
pub type Result<T> = std::result::Result<T, SkimError>;
