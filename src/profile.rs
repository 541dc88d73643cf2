//! The profiling engine and its tabular output
//!
//! [`Profiler::profile`] computes the per-variable rows and the two
//! dataset-scalar spatial fields independently, and [`DatasetProfile::to_table`]
//! joins them into the flat table callers consume: one record per data
//! variable with the scalars repeated on every record.

use crate::array::ElementType;
use crate::config::ProfilerConfig;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::memory::{self, MemoryProfile};
use crate::scheduler::{Scheduler, ThreadPoolScheduler};
use crate::spatial::{self, Resolved, SpatialConfig, SpatialMetadata};
use crate::statistics::variable_profiles;
use serde::Serialize;
use std::fmt;
use tracing::{info, instrument};

/// Summary of one data variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableProfile {
    pub name: String,
    pub element_type: ElementType,
    /// At least one element is missing
    pub has_missing: bool,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-variable rows plus the dataset-scalar spatial fields
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfile {
    /// One row per data variable, in schema order
    pub rows: Vec<VariableProfile>,
    pub resolution: Resolved<f64>,
    pub spatial_reference: Resolved<String>,
}

impl DatasetProfile {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row(&self, variable: &str) -> Option<&VariableProfile> {
        self.rows.iter().find(|r| r.name == variable)
    }

    /// Joins the dataset-scalar fields onto every row
    #[must_use]
    pub fn to_table(&self) -> ProfileTable {
        let resolution = self.resolution.value().copied();
        let crs = self.spatial_reference.value().cloned();
        let records = self
            .rows
            .iter()
            .map(|row| ProfileRecord {
                variable: row.name.clone(),
                data_type: row.element_type.as_str().to_string(),
                nans: row.has_missing,
                mean: row.mean,
                std: row.std,
                maximum: row.max,
                minimum: row.min,
                resolution,
                crs: crs.clone(),
            })
            .collect();
        ProfileTable { records }
    }
}

impl fmt::Display for DatasetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_table().fmt(f)
    }
}

/// One record of the profile table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRecord {
    #[serde(rename = "variables")]
    pub variable: String,
    #[serde(rename = "data_types")]
    pub data_type: String,
    #[serde(rename = "NaNs")]
    pub nans: bool,
    pub mean: f64,
    pub std: f64,
    #[serde(rename = "maximums")]
    pub maximum: f64,
    #[serde(rename = "minimums")]
    pub minimum: f64,
    /// `None` when no resolution could be resolved
    pub resolution: Option<f64>,
    /// `None` when no spatial reference could be resolved
    #[serde(rename = "CRS")]
    pub crs: Option<String>,
}

/// The flat profile table
///
/// Serializes as a list of records keyed by column name; missing statistics
/// (NaN) become JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProfileTable {
    records: Vec<ProfileRecord>,
}

impl ProfileTable {
    pub const COLUMNS: [&'static str; 9] = [
        "variables",
        "data_types",
        "NaNs",
        "mean",
        "std",
        "maximums",
        "minimums",
        "resolution",
        "CRS",
    ];

    #[must_use]
    pub fn records(&self) -> &[ProfileRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The `variables` column
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.variable.as_str()).collect()
    }

    /// The `NaNs` column
    #[must_use]
    pub fn nans(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.nans).collect()
    }

    fn cells(record: &ProfileRecord) -> [String; 9] {
        let optional = |v: Option<String>| v.unwrap_or_else(|| "<absent>".to_string());
        [
            record.variable.clone(),
            record.data_type.clone(),
            record.nans.to_string(),
            format!("{:.6}", record.mean),
            format!("{:.6}", record.std),
            format!("{:.6}", record.maximum),
            format!("{:.6}", record.minimum),
            optional(record.resolution.map(|r| r.to_string())),
            optional(record.crs.clone()),
        ]
    }
}

impl fmt::Display for ProfileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<[String; 9]> = self.records.iter().map(Self::cells).collect();
        let mut widths = Self::COLUMNS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let header: Vec<String> = Self::COLUMNS
            .iter()
            .zip(&widths)
            .map(|(name, &w)| format!("{name:>w$}"))
            .collect();
        write!(f, "{}", header.join("  "))?;
        for row in &rows {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:>w$}"))
                .collect();
            write!(f, "\n{}", line.join("  "))?;
        }
        Ok(())
    }
}

/// Profiling engine bound to a scheduler and spatial key configuration
///
/// The engine holds no per-dataset state; one profiler may serve any number of
/// concurrent calls.
pub struct Profiler<S = ThreadPoolScheduler> {
    scheduler: S,
    spatial: SpatialConfig,
}

impl Profiler<ThreadPoolScheduler> {
    /// A profiler on a default-sized thread pool with default spatial keys
    ///
    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be built.
    pub fn new() -> Result<Self> {
        Self::from_config(ProfilerConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be built.
    pub fn from_config(config: ProfilerConfig) -> Result<Self> {
        Ok(Self {
            scheduler: ThreadPoolScheduler::new(&config.parallel)?,
            spatial: config.spatial,
        })
    }
}

impl<S: Scheduler> Profiler<S> {
    pub fn with_scheduler(scheduler: S, spatial: SpatialConfig) -> Self {
        Self { scheduler, spatial }
    }

    #[must_use]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    #[must_use]
    pub fn spatial_config(&self) -> &SpatialConfig {
        &self.spatial
    }

    /// Profiles every data variable and resolves the spatial fields
    ///
    /// # Errors
    ///
    /// - [`SkimError::InvalidInput`](crate::errors::SkimError::InvalidInput)
    ///   for malformed datasets
    /// - [`SkimError::ReductionFailure`](crate::errors::SkimError::ReductionFailure)
    ///   if any variable cannot be reduced; no partial profile is returned
    /// - execution errors of chunked variables, unchanged
    #[instrument(skip_all, fields(variables = dataset.data_vars().len(), chunked = dataset.is_chunked()))]
    pub fn profile(&self, dataset: &Dataset) -> Result<DatasetProfile> {
        let rows = variable_profiles(dataset, &self.scheduler)?;
        let SpatialMetadata {
            resolution,
            spatial_reference,
        } = self.spatial_metadata(dataset)?;

        info!(
            rows = rows.len(),
            resolution = ?resolution.value(),
            crs = ?spatial_reference.value(),
            "dataset profiled"
        );
        Ok(DatasetProfile {
            rows,
            resolution,
            spatial_reference,
        })
    }

    /// Per-column byte usage of the row-oriented projection
    ///
    /// # Errors
    ///
    /// Returns an error for malformed datasets or failed chunk execution.
    #[instrument(skip_all, fields(chunked = dataset.is_chunked()))]
    pub fn memory_profile(&self, dataset: &Dataset) -> Result<MemoryProfile> {
        memory::memory_profile(dataset, &self.scheduler)
    }

    /// Resolution and spatial reference alone
    ///
    /// # Errors
    ///
    /// Returns an error for malformed datasets or failed chunk execution.
    pub fn spatial_metadata(&self, dataset: &Dataset) -> Result<SpatialMetadata> {
        dataset.validate()?;
        spatial::resolve(dataset, &self.spatial, &self.scheduler)
    }
}

/// Profiles `dataset` with a default [`Profiler`]
///
/// # Errors
///
/// See [`Profiler::profile`].
pub fn profile(dataset: &Dataset) -> Result<DatasetProfile> {
    Profiler::new()?.profile(dataset)
}

/// Measures `dataset` with a default [`Profiler`]
///
/// # Errors
///
/// See [`Profiler::memory_profile`].
pub fn memory_profile(dataset: &Dataset) -> Result<MemoryProfile> {
    Profiler::new()?.memory_profile(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{MetadataField, MissingMetadata};
    use crate::spatial::MetadataSource;

    fn row(name: &str, has_missing: bool) -> VariableProfile {
        VariableProfile {
            name: name.to_string(),
            element_type: ElementType::Float64,
            has_missing,
            mean: 1.0,
            std: 0.5,
            min: 0.0,
            max: 2.0,
        }
    }

    fn absent_profile() -> DatasetProfile {
        DatasetProfile {
            rows: vec![row("a", false), row("b", true)],
            resolution: Resolved::Absent(MissingMetadata {
                field: MetadataField::Resolution,
                tried: vec![],
            }),
            spatial_reference: Resolved::Found {
                value: "EPSG:4326".to_string(),
                source: MetadataSource::Attribute { key: "crs".into() },
            },
        }
    }

    #[test]
    fn table_broadcasts_scalars() {
        let table = absent_profile().to_table();
        assert_eq!(table.variables(), ["a", "b"]);
        assert_eq!(table.nans(), [false, true]);
        assert!(table.records().iter().all(|r| r.resolution.is_none()));
        assert!(table
            .records()
            .iter()
            .all(|r| r.crs.as_deref() == Some("EPSG:4326")));
    }

    #[test]
    fn table_serializes_with_column_names() {
        let mut profile = absent_profile();
        profile.rows[1].mean = f64::NAN;
        let json = serde_json::to_value(profile.to_table()).unwrap();
        let first = json[0].as_object().unwrap();
        let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected = ProfileTable::COLUMNS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert!(json[1]["mean"].is_null());
        assert!(json[0]["resolution"].is_null());
    }

    #[test]
    fn display_marks_absent_fields() {
        let text = absent_profile().to_string();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().trim_start().starts_with("variables"));
        assert!(text.contains("<absent>"));
        assert_eq!(text.lines().count(), 3);
    }
}
