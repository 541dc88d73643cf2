//! Labeled multi-dimensional datasets
//!
//! A [`Dataset`] is an immutable collection of named [`Variable`]s sharing
//! named dimensions, split into data variables (the values being profiled) and
//! coordinates (labels along the axes). Each variable is backed either by an
//! eager array or by a chunked, lazily evaluated one. Free-form attributes
//! carry metadata such as spatial reference identifiers.

use crate::array::{ArrayData, ElementType};
use crate::chunked::ChunkedArray;
use crate::errors::{Result, SkimError};
use crate::scheduler::Scheduler;
use crate::statistics::{ArrayReduction, ReduceKind, Reduction, Sample};
use ndarray::ArrayD;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Free-form metadata attached to datasets and variables
pub type Attributes = HashMap<String, JsonValue>;

/// Storage behind a variable
#[derive(Debug, Clone)]
pub enum ArrayBackend {
    Eager(ArrayData),
    Chunked(ChunkedArray),
}

impl From<ArrayData> for ArrayBackend {
    fn from(data: ArrayData) -> Self {
        ArrayBackend::Eager(data)
    }
}

impl From<ChunkedArray> for ArrayBackend {
    fn from(data: ChunkedArray) -> Self {
        ArrayBackend::Chunked(data)
    }
}

impl<T> From<ArrayD<T>> for ArrayBackend
where
    ArrayData: From<ArrayD<T>>,
{
    fn from(array: ArrayD<T>) -> Self {
        ArrayBackend::Eager(ArrayData::from(array))
    }
}

impl ArrayBackend {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ArrayBackend::Eager(data) => data.len(),
            ArrayBackend::Chunked(data) => data.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the values as an eager array, computing chunks on `scheduler`
    ///
    /// # Errors
    ///
    /// Propagates chunk loading and execution errors.
    pub fn materialize<S: Scheduler + ?Sized>(&self, scheduler: &S) -> Result<ArrayData> {
        match self {
            ArrayBackend::Eager(data) => Ok(data.clone()),
            ArrayBackend::Chunked(data) => data.compute(scheduler),
        }
    }
}

impl ArrayReduction for ArrayBackend {
    fn element_type(&self) -> ElementType {
        match self {
            ArrayBackend::Eager(data) => data.element_type(),
            ArrayBackend::Chunked(data) => data.element_type(),
        }
    }

    fn shape(&self) -> &[usize] {
        match self {
            ArrayBackend::Eager(data) => data.shape(),
            ArrayBackend::Chunked(data) => data.shape(),
        }
    }

    fn is_chunked(&self) -> bool {
        matches!(self, ArrayBackend::Chunked(_))
    }

    fn reduce(&self, kind: ReduceKind) -> Result<Reduction> {
        match self {
            ArrayBackend::Eager(data) => ArrayReduction::reduce(data, kind),
            ArrayBackend::Chunked(data) => ArrayReduction::reduce(data, kind),
        }
    }

    fn sample(&self, flat_indices: &[usize]) -> Result<Sample> {
        match self {
            ArrayBackend::Eager(data) => data.sample(flat_indices),
            ArrayBackend::Chunked(data) => data.sample(flat_indices),
        }
    }
}

/// A named array addressed by named dimensions
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    dims: Vec<String>,
    data: ArrayBackend,
    attrs: Attributes,
}

impl Variable {
    pub fn new(name: impl Into<String>, dims: &[&str], data: impl Into<ArrayBackend>) -> Self {
        Self {
            name: name.into(),
            dims: dims.iter().map(|d| (*d).to_string()).collect(),
            data: data.into(),
            attrs: Attributes::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    #[must_use]
    pub fn data(&self) -> &ArrayBackend {
        &self.data
    }

    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.data.is_chunked()
    }
}

/// A named axis and its length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// An immutable, validated collection of variables
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dimensions: Vec<Dimension>,
    data_vars: Vec<Variable>,
    coords: Vec<Variable>,
    attrs: Attributes,
}

impl Dataset {
    #[must_use]
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Dimensions in order of first appearance (data variables, then coordinates)
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Data variables in insertion order
    #[must_use]
    pub fn data_vars(&self) -> &[Variable] {
        &self.data_vars
    }

    /// Coordinates in insertion order
    #[must_use]
    pub fn coords(&self) -> &[Variable] {
        &self.coords
    }

    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&JsonValue> {
        self.attrs.get(key)
    }

    #[must_use]
    pub fn data_var(&self, name: &str) -> Option<&Variable> {
        self.data_vars.iter().find(|v| v.name == name)
    }

    #[must_use]
    pub fn coord(&self, name: &str) -> Option<&Variable> {
        self.coords.iter().find(|v| v.name == name)
    }

    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// The coordinate that labels `dim` directly: named like it and 1-D along it
    #[must_use]
    pub fn dimension_coordinate(&self, dim: &str) -> Option<&Variable> {
        self.coord(dim)
            .filter(|c| c.dims.len() == 1 && c.dims[0] == dim)
    }

    /// Whether any data variable or coordinate is chunked
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.data_vars
            .iter()
            .chain(&self.coords)
            .any(Variable::is_chunked)
    }

    /// Checks the structural invariants of the dataset
    ///
    /// # Errors
    ///
    /// Returns [`SkimError::InvalidInput`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let mut dim_names = HashSet::new();
        for dim in &self.dimensions {
            if !dim_names.insert(dim.name.as_str()) {
                return Err(SkimError::invalid(format!(
                    "dimension '{}' is declared twice",
                    dim.name
                )));
            }
        }

        let mut names = HashSet::new();
        for var in self.data_vars.iter().chain(&self.coords) {
            if var.name.is_empty() {
                return Err(SkimError::invalid("variable names must not be empty"));
            }
            if !names.insert(var.name.as_str()) {
                return Err(SkimError::invalid(format!(
                    "variable name '{}' is used more than once",
                    var.name
                )));
            }
            check_variable_dims(var)?;
            for (dim, &len) in var.dims.iter().zip(var.shape()) {
                match self.dimension(dim) {
                    Some(d) if d.len == len => {}
                    Some(d) => {
                        return Err(SkimError::invalid(format!(
                            "variable '{}' has length {len} along '{dim}' but the dataset has {}",
                            var.name, d.len
                        )))
                    }
                    None => {
                        return Err(SkimError::invalid(format!(
                            "variable '{}' uses undeclared dimension '{dim}'",
                            var.name
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies `kind` to every data variable, in data-variable order
    ///
    /// # Errors
    ///
    /// Returns [`SkimError::ReductionFailure`] naming the first variable whose
    /// element type does not support `kind`.
    pub fn reduce(&self, kind: ReduceKind) -> Result<Vec<(String, Reduction)>> {
        self.data_vars
            .iter()
            .map(|var| {
                let reduction = var
                    .data
                    .reduce(kind)
                    .map_err(|e| SkimError::ReductionFailure {
                        variable: var.name.clone(),
                        source: Box::new(e),
                    })?;
                Ok((var.name.clone(), reduction))
            })
            .collect()
    }

    /// Returns a copy whose eager data variables are chunked
    ///
    /// `chunks` maps dimension names to chunk sizes; dimensions not listed
    /// form a single chunk. Coordinates and already chunked variables are
    /// kept as they are.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown dimensions or zero chunk sizes.
    pub fn chunk(&self, chunks: &[(&str, usize)]) -> Result<Dataset> {
        for (dim, size) in chunks {
            if self.dimension(dim).is_none() {
                return Err(SkimError::invalid(format!(
                    "cannot chunk along unknown dimension '{dim}'"
                )));
            }
            if *size == 0 {
                return Err(SkimError::invalid(format!(
                    "chunk size along '{dim}' must be positive"
                )));
            }
        }

        let data_vars = self
            .data_vars
            .iter()
            .map(|var| {
                let ArrayBackend::Eager(array) = &var.data else {
                    return Ok(var.clone());
                };
                let chunk_shape: Vec<usize> = var
                    .dims
                    .iter()
                    .zip(array.shape())
                    .map(|(dim, &len)| {
                        chunks
                            .iter()
                            .find(|(name, _)| name == dim)
                            .map_or(len.max(1), |&(_, size)| size)
                    })
                    .collect();
                debug!(variable = %var.name, ?chunk_shape, "chunking variable");
                Ok(Variable {
                    data: ChunkedArray::from_array(array.clone(), &chunk_shape)?.into(),
                    ..var.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Dataset {
            data_vars,
            ..self.clone()
        })
    }
}

fn check_variable_dims(var: &Variable) -> Result<()> {
    if var.dims.len() != var.shape().len() {
        return Err(SkimError::invalid(format!(
            "variable '{}' has {} dimension names for an array of rank {}",
            var.name,
            var.dims.len(),
            var.shape().len()
        )));
    }
    let mut seen = HashSet::new();
    for dim in &var.dims {
        if !seen.insert(dim.as_str()) {
            return Err(SkimError::invalid(format!(
                "variable '{}' repeats dimension '{dim}'",
                var.name
            )));
        }
    }
    Ok(())
}

/// Incremental construction of a [`Dataset`]
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    data_vars: Vec<Variable>,
    coords: Vec<Variable>,
    attrs: Attributes,
}

impl DatasetBuilder {
    #[must_use]
    pub fn data_var(self, name: &str, dims: &[&str], data: impl Into<ArrayBackend>) -> Self {
        self.variable(Variable::new(name, dims, data))
    }

    #[must_use]
    pub fn variable(mut self, variable: Variable) -> Self {
        self.data_vars.push(variable);
        self
    }

    #[must_use]
    pub fn coord(self, name: &str, dims: &[&str], data: impl Into<ArrayBackend>) -> Self {
        self.coordinate(Variable::new(name, dims, data))
    }

    #[must_use]
    pub fn coordinate(mut self, coordinate: Variable) -> Self {
        self.coords.push(coordinate);
        self
    }

    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Infers the dimensions and validates the dataset
    ///
    /// # Errors
    ///
    /// Returns [`SkimError::InvalidInput`] if variables disagree on dimension
    /// lengths, repeat names, or do not match their dimension lists.
    pub fn build(self) -> Result<Dataset> {
        let mut dimensions: Vec<Dimension> = Vec::new();
        for var in self.data_vars.iter().chain(&self.coords) {
            check_variable_dims(var)?;
            for (dim, &len) in var.dims.iter().zip(var.shape()) {
                match dimensions.iter().find(|d| &d.name == dim) {
                    Some(existing) if existing.len != len => {
                        return Err(SkimError::invalid(format!(
                            "conflicting sizes for dimension '{dim}': {} and {len} (variable '{}')",
                            existing.len, var.name
                        )));
                    }
                    Some(_) => {}
                    None => dimensions.push(Dimension {
                        name: dim.clone(),
                        len,
                    }),
                }
            }
        }

        let dataset = Dataset {
            dimensions,
            data_vars: self.data_vars,
            coords: self.coords,
            attrs: self.attrs,
        };
        dataset.validate()?;
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn zeros(shape: &[usize]) -> ArrayD<f64> {
        ArrayD::zeros(IxDyn(shape))
    }

    #[test]
    fn dimensions_follow_first_appearance() {
        let ds = Dataset::builder()
            .data_var("a", &["y", "x"], zeros(&[2, 3]))
            .data_var("b", &["time", "x"], zeros(&[4, 3]))
            .coord("x", &["x"], zeros(&[3]))
            .build()
            .unwrap();
        let names: Vec<&str> = ds.dimensions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["y", "x", "time"]);
        assert!(ds.dimension_coordinate("x").is_some());
        assert!(ds.dimension_coordinate("y").is_none());
    }

    #[test]
    fn conflicting_lengths_are_invalid() {
        let err = Dataset::builder()
            .data_var("a", &["x"], zeros(&[2]))
            .data_var("b", &["x"], zeros(&[3]))
            .build()
            .unwrap_err();
        assert!(matches!(err, SkimError::InvalidInput { .. }));
    }

    #[test]
    fn rank_mismatch_is_invalid() {
        let err = Dataset::builder()
            .data_var("a", &["x"], zeros(&[2, 2]))
            .build()
            .unwrap_err();
        assert!(matches!(err, SkimError::InvalidInput { .. }));
    }

    #[test]
    fn duplicate_names_across_coords_are_invalid() {
        let err = Dataset::builder()
            .data_var("lat", &["x"], zeros(&[2]))
            .coord("lat", &["x"], zeros(&[2]))
            .build()
            .unwrap_err();
        assert!(matches!(err, SkimError::InvalidInput { .. }));
    }

    #[test]
    fn chunk_converts_only_data_variables() {
        let ds = Dataset::builder()
            .data_var("a", &["x", "y"], zeros(&[4, 6]))
            .coord("x", &["x"], zeros(&[4]))
            .build()
            .unwrap();
        let chunked = ds.chunk(&[("y", 4)]).unwrap();

        assert!(chunked.is_chunked());
        let ArrayBackend::Chunked(a) = chunked.data_vars()[0].data() else {
            panic!("expected a chunked variable");
        };
        assert_eq!(a.chunk_shape(), &[4, 4]);
        assert!(!chunked.coords()[0].is_chunked());

        assert!(ds.chunk(&[("band", 2)]).is_err());
    }
}
