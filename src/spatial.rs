//! Spatial metadata resolution
//!
//! Producers of raster datasets disagree on where the grid resolution and the
//! coordinate reference system are stored. Some write a `CRS` attribute, some a
//! `spatial_ref` attribute, rioxarray stores the WKT on a scalar `spatial_ref`
//! coordinate, and many write no resolution at all. Each field is therefore
//! resolved by walking an ordered list of candidates from [`SpatialConfig`];
//! the first usable candidate wins.

use crate::array::ElementType;
use crate::dataset::{Attributes, Dataset, Variable};
use crate::errors::{MetadataField, MissingMetadata, Result, SkimError};
use crate::scheduler::Scheduler;
use crate::statistics::ArrayReduction;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::{debug, warn};

/// Candidate keys and axes, each tried in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpatialConfig {
    /// Dataset attributes holding the grid resolution
    pub resolution_keys: Vec<String>,
    /// Dataset attributes holding the coordinate reference system
    pub crs_keys: Vec<String>,
    /// Coordinates that carry the coordinate reference system as attributes
    pub crs_coordinates: Vec<String>,
    /// Attributes looked up on those coordinates
    pub crs_coordinate_keys: Vec<String>,
    /// Coordinates whose spacing gives the resolution when no attribute does
    pub primary_axes: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            resolution_keys: strings(&["resolution", "res"]),
            crs_keys: strings(&["CRS", "crs", "spatial_ref"]),
            crs_coordinates: strings(&["spatial_ref"]),
            crs_coordinate_keys: strings(&["crs_wkt", "spatial_ref"]),
            primary_axes: strings(&["x", "lon", "longitude"]),
        }
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataSource {
    /// A dataset attribute
    Attribute { key: String },
    /// An attribute of a coordinate variable
    CoordinateAttribute { coordinate: String, key: String },
    /// Spacing of the first two values of a coordinate
    CoordinateSpacing { axis: String },
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSource::Attribute { key } => write!(f, "attribute '{key}'"),
            MetadataSource::CoordinateAttribute { coordinate, key } => {
                write!(f, "attribute '{key}' of coordinate '{coordinate}'")
            }
            MetadataSource::CoordinateSpacing { axis } => write!(f, "spacing of '{axis}'"),
        }
    }
}

/// Outcome of resolving one dataset-scalar field
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Found { value: T, source: MetadataSource },
    Absent(MissingMetadata),
}

impl<T> Resolved<T> {
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolved::Found { value, .. } => Some(value),
            Resolved::Absent(_) => None,
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&MetadataSource> {
        match self {
            Resolved::Found { source, .. } => Some(source),
            Resolved::Absent(_) => None,
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Resolved::Found { .. })
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        !self.is_found()
    }

    /// Converts absence into [`SkimError::MissingMetadata`]
    ///
    /// # Errors
    ///
    /// Returns the missing-metadata report when the field is absent.
    pub fn into_result(self) -> Result<T> {
        match self {
            Resolved::Found { value, .. } => Ok(value),
            Resolved::Absent(missing) => Err(SkimError::MissingMetadata(missing)),
        }
    }
}

/// Both dataset-scalar spatial fields
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialMetadata {
    pub resolution: Resolved<f64>,
    pub spatial_reference: Resolved<String>,
}

/// Resolves resolution and spatial reference
///
/// # Errors
///
/// Only execution errors while sampling a chunked coordinate are returned;
/// unresolved fields are reported as [`Resolved::Absent`].
pub fn resolve<S: Scheduler + ?Sized>(
    dataset: &Dataset,
    config: &SpatialConfig,
    scheduler: &S,
) -> Result<SpatialMetadata> {
    Ok(SpatialMetadata {
        resolution: resolve_resolution(dataset, config, scheduler)?,
        spatial_reference: resolve_spatial_reference(dataset, config),
    })
}

/// Resolves the nominal grid resolution
///
/// Attributes are tried first; numbers and numeric strings are accepted, and a
/// numeric list (such as rasterio's `(x, y)` resolution pair) yields its first
/// element. Otherwise the first primary axis with at least two values gives
/// `value[1] - value[0]`.
///
/// # Errors
///
/// Returns execution errors raised while sampling a chunked coordinate.
pub fn resolve_resolution<S: Scheduler + ?Sized>(
    dataset: &Dataset,
    config: &SpatialConfig,
    scheduler: &S,
) -> Result<Resolved<f64>> {
    let mut tried = Vec::new();

    for key in &config.resolution_keys {
        tried.push(format!("attribute '{key}'"));
        let Some(value) = dataset.attr(key) else {
            continue;
        };
        match numeric_value(value) {
            Some(resolution) => {
                debug!(key = %key, resolution, "resolution from attribute");
                return Ok(Resolved::Found {
                    value: resolution,
                    source: MetadataSource::Attribute { key: key.clone() },
                });
            }
            None => warn!(key = %key, %value, "ignoring non-numeric resolution attribute"),
        }
    }

    for axis in &config.primary_axes {
        tried.push(format!("spacing of '{axis}'"));
        let Some(coord) = dataset.coord(axis) else {
            continue;
        };
        if let Some(spacing) = coordinate_spacing(coord, scheduler)? {
            debug!(axis = %axis, resolution = spacing, "resolution from coordinate spacing");
            return Ok(Resolved::Found {
                value: spacing,
                source: MetadataSource::CoordinateSpacing { axis: axis.clone() },
            });
        }
    }

    warn!(tried = ?tried, "no resolution could be resolved");
    Ok(Resolved::Absent(MissingMetadata {
        field: MetadataField::Resolution,
        tried,
    }))
}

/// Resolves the coordinate reference system identifier, passed through opaquely
#[must_use]
pub fn resolve_spatial_reference(dataset: &Dataset, config: &SpatialConfig) -> Resolved<String> {
    let mut tried = Vec::new();

    if let Some((key, value)) = first_scalar(dataset.attrs(), &config.crs_keys, &mut tried, |key| {
        format!("attribute '{key}'")
    }) {
        debug!(key = %key, crs = %value, "spatial reference from attribute");
        return Resolved::Found {
            value,
            source: MetadataSource::Attribute { key },
        };
    }

    for name in &config.crs_coordinates {
        let Some(coord) = dataset.coord(name) else {
            tried.push(format!("coordinate '{name}'"));
            continue;
        };
        if let Some((key, value)) = first_scalar(
            coord.attrs(),
            &config.crs_coordinate_keys,
            &mut tried,
            |key| format!("attribute '{key}' of coordinate '{name}'"),
        ) {
            debug!(coordinate = %name, key = %key, "spatial reference from coordinate");
            return Resolved::Found {
                value,
                source: MetadataSource::CoordinateAttribute {
                    coordinate: name.clone(),
                    key,
                },
            };
        }
    }

    warn!(tried = ?tried, "no spatial reference could be resolved");
    Resolved::Absent(MissingMetadata {
        field: MetadataField::SpatialReference,
        tried,
    })
}

fn first_scalar(
    attrs: &Attributes,
    keys: &[String],
    tried: &mut Vec<String>,
    describe: impl Fn(&str) -> String,
) -> Option<(String, String)> {
    for key in keys {
        tried.push(describe(key));
        let Some(value) = attrs.get(key) else {
            continue;
        };
        match scalar_text(value) {
            Some(text) => return Some((key.clone(), text)),
            None => warn!(key = %key, "ignoring non-scalar spatial reference attribute"),
        }
    }
    None
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn numeric_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        JsonValue::Array(items) => items.first().and_then(|first| match first {
            JsonValue::Array(_) => None,
            other => numeric_value(other),
        }),
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Object(_) => None,
    }
}

/// `value[1] - value[0]` in C order, if the coordinate is numeric with two values
fn coordinate_spacing<S: Scheduler + ?Sized>(
    coord: &Variable,
    scheduler: &S,
) -> Result<Option<f64>> {
    if coord.element_type() == ElementType::DateTime || coord.data().len() < 2 {
        return Ok(None);
    }
    let values = coord.data().sample(&[0, 1])?.resolve(scheduler)?;
    Ok(Some(values[1] - values[0]))
}
