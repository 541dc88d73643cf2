//! Dataset schema enumeration and variable description
//!
//! This module lists the variables of a dataset in their native insertion
//! order and describes their structure (dimensions, shape, storage).

use crate::array::ElementType;
use crate::dataset::{ArrayBackend, Attributes, Dataset, Variable};
use crate::errors::{Result, SkimError};
use serde::Serialize;
use std::fmt;

/// Name and element type of one data variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaEntry {
    pub name: String,
    pub element_type: ElementType,
}

/// Whether a described variable holds data or labels an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableRole {
    Data,
    Coordinate,
}

/// Information about a dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
}

/// Structured metadata for a variable
#[derive(Debug, Clone, Serialize)]
pub struct VariableMetadata {
    pub name: String,
    pub role: VariableRole,
    pub element_type: ElementType,
    pub dimensions: Vec<DimensionInfo>,
    pub attributes: Attributes,
    pub total_elements: usize,
    pub estimated_size_bytes: usize,
    /// Chunk extent along each axis, for chunked variables
    pub chunk_shape: Option<Vec<usize>>,
}

impl VariableMetadata {
    fn of(variable: &Variable, role: VariableRole) -> Self {
        let dimensions = variable
            .dims()
            .iter()
            .zip(variable.shape())
            .map(|(name, &length)| DimensionInfo {
                name: name.clone(),
                length,
            })
            .collect();
        let total_elements = variable.data().len();
        let chunk_shape = match variable.data() {
            ArrayBackend::Chunked(chunked) => Some(chunked.chunk_shape().to_vec()),
            ArrayBackend::Eager(_) => None,
        };

        Self {
            name: variable.name().to_string(),
            role,
            element_type: variable.element_type(),
            dimensions,
            attributes: variable.attrs().clone(),
            total_elements,
            estimated_size_bytes: total_elements * variable.element_type().itemsize(),
            chunk_shape,
        }
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.chunk_shape.is_some()
    }
}

impl fmt::Display for VariableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<&str> = self.dimensions.iter().map(|d| d.name.as_str()).collect();
        let shape: Vec<String> = self
            .dimensions
            .iter()
            .map(|d| d.length.to_string())
            .collect();

        if dims.is_empty() {
            write!(f, "{} ({}): scalar", self.name, self.element_type)?;
        } else {
            write!(
                f,
                "{} ({}): [{}] = ({})",
                self.name,
                self.element_type,
                dims.join(", "),
                shape.join(" x ")
            )?;
        }
        write!(f, ", {}", human_size(self.estimated_size_bytes))?;
        if let Some(chunks) = &self.chunk_shape {
            write!(f, ", chunks {chunks:?}")?;
        }
        Ok(())
    }
}

fn human_size(bytes: usize) -> String {
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", b / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", b / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", b / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Lists the data variables with their element types, in insertion order
///
/// # Errors
///
/// Returns [`SkimError::InvalidInput`] if the dataset is malformed.
pub fn schema(dataset: &Dataset) -> Result<Vec<SchemaEntry>> {
    dataset.validate()?;
    Ok(dataset
        .data_vars()
        .iter()
        .map(|v| SchemaEntry {
            name: v.name().to_string(),
            element_type: v.element_type(),
        })
        .collect())
}

/// Describes every data variable, then every coordinate
///
/// # Errors
///
/// Returns [`SkimError::InvalidInput`] if the dataset is malformed.
pub fn describe(dataset: &Dataset) -> Result<Vec<VariableMetadata>> {
    dataset.validate()?;
    let data = dataset
        .data_vars()
        .iter()
        .map(|v| VariableMetadata::of(v, VariableRole::Data));
    let coords = dataset
        .coords()
        .iter()
        .map(|v| VariableMetadata::of(v, VariableRole::Coordinate));
    Ok(data.chain(coords).collect())
}

/// Get structured metadata for one data variable or coordinate
///
/// # Errors
///
/// Returns [`SkimError::InvalidInput`] if no variable has that name.
pub fn describe_variable(dataset: &Dataset, name: &str) -> Result<VariableMetadata> {
    if let Some(v) = dataset.data_var(name) {
        return Ok(VariableMetadata::of(v, VariableRole::Data));
    }
    dataset
        .coord(name)
        .map(|v| VariableMetadata::of(v, VariableRole::Coordinate))
        .ok_or_else(|| SkimError::invalid(format!("no variable named '{name}'")))
}
