//! Core statistical operations and the array reduction adapter
//!
//! Every backend reduces through [`Moments`], a partial aggregate that can be
//! built from any subset of the values and merged with any other subset. The
//! eager backend folds the whole array in parallel; the chunked backend builds
//! one partial per chunk and merges them when the deferred graph runs. Both
//! paths therefore agree up to floating point rounding.

use super::parallel::array_moments;
use crate::array::{ArrayData, ElementType};
use crate::chunked::{ravel, unravel, ChunkedArray};
use crate::errors::{Result, SkimError};
use crate::scheduler::{Deferred, Pending, Task};
use std::collections::BTreeMap;
use std::fmt;

/// Supported whole-array reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceKind {
    /// Sum of the non-missing values
    Sum,
    /// Arithmetic mean of the non-missing values
    Mean,
    /// Population standard deviation of the non-missing values
    Std,
    /// Minimum non-missing value
    Min,
    /// Maximum non-missing value
    Max,
    /// Number of missing values
    NullCount,
}

impl ReduceKind {
    pub const ALL: [ReduceKind; 6] = [
        Self::Sum,
        Self::Mean,
        Self::Std,
        Self::Min,
        Self::Max,
        Self::NullCount,
    ];

    /// Get the string representation of the operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Std => "std",
            Self::Min => "minimum",
            Self::Max => "maximum",
            Self::NullCount => "null count",
        }
    }

    /// Whether the reduction is defined for `dtype`
    #[must_use]
    pub const fn supports(self, dtype: ElementType) -> bool {
        dtype.is_numeric() || matches!(self, Self::NullCount)
    }
}

impl fmt::Display for ReduceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mergeable partial aggregate over a set of values
///
/// `mean` and `m2` follow Welford's online update; partials are combined with
/// Chan's pairwise formula. The reported mean is `sum / count`, so infinite
/// values propagate to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: u64,
    pub nulls: u64,
    pub mean: f64,
    pub m2: f64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            count: 0,
            nulls: 0,
            mean: 0.0,
            m2: 0.0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Moments {
    /// Adds one value; NaN counts as missing
    #[must_use]
    pub fn push(mut self, x: f64) -> Self {
        if x.is_nan() {
            self.nulls += 1;
            return self;
        }
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        self.sum += x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self
    }

    /// Combines two partials computed over disjoint sets of values
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        let nulls = self.nulls + other.nulls;
        if other.count == 0 {
            return Self { nulls, ..self };
        }
        if self.count == 0 {
            return Self { nulls, ..other };
        }

        let count = self.count + other.count;
        let (na, nb, n) = (self.count as f64, other.count as f64, count as f64);
        let delta = other.mean - self.mean;
        Self {
            count,
            nulls,
            mean: self.mean + delta * (nb / n),
            m2: self.m2 + other.m2 + delta * delta * (na * nb / n),
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Final value of `kind`
    ///
    /// With no non-missing values, mean, std, min and max are NaN and the sum
    /// is zero.
    #[must_use]
    pub fn finish(&self, kind: ReduceKind) -> f64 {
        match kind {
            ReduceKind::NullCount => self.nulls as f64,
            ReduceKind::Sum => self.sum,
            _ if self.count == 0 => f64::NAN,
            ReduceKind::Mean => self.sum / self.count as f64,
            ReduceKind::Std => {
                let variance = self.m2 / self.count as f64;
                if variance < 0.0 {
                    0.0
                } else {
                    variance.sqrt()
                }
            }
            ReduceKind::Min => self.min,
            ReduceKind::Max => self.max,
        }
    }
}

/// A scalar reduction, immediate (eager) or deferred (chunked)
pub type Reduction = Pending<Moments, f64>;

/// Values at requested flat positions, immediate or deferred
pub type Sample = Pending<Vec<(usize, f64)>, Vec<f64>>;

/// Uniform reduction interface over eager and chunked array backends
pub trait ArrayReduction {
    fn element_type(&self) -> ElementType;

    fn shape(&self) -> &[usize];

    /// Whether reductions on this array are deferred
    fn is_chunked(&self) -> bool;

    /// Reduces over all dimensions jointly
    ///
    /// # Errors
    ///
    /// Returns [`SkimError::UnsupportedReduction`] if `kind` is not defined
    /// for the element type.
    fn reduce(&self, kind: ReduceKind) -> Result<Reduction>;

    /// Values at the given flat C-order positions, widened to f64
    ///
    /// # Errors
    ///
    /// Returns an error for non-numeric arrays or out-of-range positions.
    fn sample(&self, flat_indices: &[usize]) -> Result<Sample>;
}

fn check_supported(kind: ReduceKind, dtype: ElementType) -> Result<()> {
    if kind.supports(dtype) {
        Ok(())
    } else {
        Err(SkimError::UnsupportedReduction { kind, dtype })
    }
}

fn check_sample(dtype: ElementType, len: usize, flat_indices: &[usize]) -> Result<()> {
    if !dtype.is_numeric() {
        return Err(SkimError::invalid(format!(
            "cannot sample numeric values from a {dtype} array"
        )));
    }
    if let Some(&bad) = flat_indices.iter().find(|&&i| i >= len) {
        return Err(SkimError::invalid(format!(
            "position {bad} is out of range for an array of {len} elements"
        )));
    }
    Ok(())
}

impl ArrayReduction for ArrayData {
    fn element_type(&self) -> ElementType {
        ArrayData::element_type(self)
    }

    fn shape(&self) -> &[usize] {
        ArrayData::shape(self)
    }

    fn is_chunked(&self) -> bool {
        false
    }

    fn reduce(&self, kind: ReduceKind) -> Result<Reduction> {
        check_supported(kind, ArrayData::element_type(self))?;
        if !ArrayData::element_type(self).is_numeric() {
            return Ok(Pending::Ready(0.0));
        }
        Ok(Pending::Ready(array_moments(self)?.finish(kind)))
    }

    fn sample(&self, flat_indices: &[usize]) -> Result<Sample> {
        check_sample(ArrayData::element_type(self), self.len(), flat_indices)?;
        let values = flat_indices
            .iter()
            .map(|&i| {
                self.value_f64_at(i)
                    .ok_or_else(|| SkimError::invalid("array has no numeric values"))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Pending::Ready(values))
    }
}

impl ArrayReduction for ChunkedArray {
    fn element_type(&self) -> ElementType {
        ChunkedArray::element_type(self)
    }

    fn shape(&self) -> &[usize] {
        ChunkedArray::shape(self)
    }

    fn is_chunked(&self) -> bool {
        true
    }

    fn reduce(&self, kind: ReduceKind) -> Result<Reduction> {
        let dtype = ChunkedArray::element_type(self);
        check_supported(kind, dtype)?;
        if !dtype.is_numeric() {
            return Ok(Pending::Ready(0.0));
        }

        let tasks = self.chunk_tasks(|_, data| array_moments(&data));
        Ok(Pending::Deferred(Deferred::new(
            format!("{kind} of {dtype}{:?}", ChunkedArray::shape(self)),
            tasks,
            move |partials| {
                let total = partials
                    .into_iter()
                    .fold(Moments::default(), Moments::merge);
                Ok(total.finish(kind))
            },
        )))
    }

    fn sample(&self, flat_indices: &[usize]) -> Result<Sample> {
        let dtype = ChunkedArray::element_type(self);
        check_sample(dtype, self.len(), flat_indices)?;

        let shape = ChunkedArray::shape(self).to_vec();
        let chunks = self.chunks();

        // request position -> (chunk, local flat index), grouped per chunk
        let mut wanted: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
        for (position, &flat) in flat_indices.iter().enumerate() {
            let coords = unravel(flat, &shape);
            let chunk = chunks
                .iter()
                .position(|c| c.contains(&coords))
                .ok_or_else(|| SkimError::invalid(format!("no chunk holds position {flat}")))?;
            let spec = &chunks[chunk];
            let local: Vec<usize> = coords
                .iter()
                .zip(&spec.offset)
                .map(|(&c, &start)| c - start)
                .collect();
            wanted
                .entry(chunk)
                .or_default()
                .push((position, ravel(&local, &spec.shape)));
        }

        let tasks: Vec<Task<Vec<(usize, f64)>>> = wanted
            .into_iter()
            .map(|(chunk, picks)| {
                let array = self.clone();
                let spec = chunks[chunk].clone();
                Box::new(move || -> Result<Vec<(usize, f64)>> {
                    let data = array.load(&spec)?;
                    let values = data
                        .values_f64()
                        .ok_or_else(|| SkimError::execution(spec.to_string(), "chunk is not numeric"))?;
                    Ok(picks
                        .into_iter()
                        .map(|(position, local)| (position, values[local]))
                        .collect())
                }) as Task<Vec<(usize, f64)>>
            })
            .collect();

        let n = flat_indices.len();
        Ok(Pending::Deferred(Deferred::new(
            format!("sample {n} values of {dtype}{shape:?}"),
            tasks,
            move |parts| {
                let mut values = vec![f64::NAN; n];
                for (position, value) in parts.into_iter().flatten() {
                    values[position] = value;
                }
                Ok(values)
            },
        )))
    }
}
