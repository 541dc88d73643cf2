//! Memory footprint of the row-oriented projection of a dataset
//!
//! The projection is the table obtained by flattening every dimension into a
//! row index: one row per point of the full dimension grid, one column per
//! data variable and non-dimension coordinate, each broadcast over the dimensions
//! it lacks. Dimension coordinates become the levels of the row index.
//!
//! In-memory datasets are measured directly. Chunked datasets are measured by
//! a deferred graph with one task per chunk, executed on a [`Scheduler`]; both
//! paths produce the same [`MemoryProfile`].

use crate::array::ElementType;
use crate::dataset::{ArrayBackend, Dataset, Variable};
use crate::errors::{Result, SkimError};
use crate::scheduler::{Deferred, Scheduler, Task};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, info, instrument};

/// Name of the implicit row index column
pub const INDEX_COLUMN: &str = "Index";

/// Bytes per column, in column order with the row index first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryProfile {
    entries: Vec<(String, usize)>,
}

impl MemoryProfile {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, bytes)| *bytes)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, bytes)| (name.as_str(), *bytes))
    }

    /// Sum over all columns, row index included
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, bytes)| bytes).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MemoryProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, bytes) in &self.entries {
            map.serialize_entry(name, bytes)?;
        }
        map.end()
    }
}

/// Width in bytes of the integer codes of a multi-level index level
///
/// The smallest signed integer type whose maximum exceeds the level length.
#[must_use]
pub fn index_code_width(level_len: usize) -> usize {
    let len = level_len as u64;
    if len < i8::MAX as u64 {
        1
    } else if len < i16::MAX as u64 {
        2
    } else if len < i32::MAX as u64 {
        4
    } else {
        8
    }
}

/// Dimension frame of the projection, with the resulting row count
struct Frame {
    dims: Vec<(String, usize)>,
    rows: usize,
}

impl Frame {
    fn of(dataset: &Dataset) -> Self {
        let dims: Vec<(String, usize)> = dataset
            .dimensions()
            .iter()
            .map(|d| (d.name.clone(), d.len))
            .collect();
        let rows = dims.iter().map(|(_, len)| len).product();
        Self { dims, rows }
    }

    /// Rows each element of a variable is repeated over
    fn broadcast_factor(&self, variable: &Variable) -> usize {
        self.dims
            .iter()
            .filter(|(name, _)| !variable.dims().contains(name))
            .map(|(_, len)| len)
            .product()
    }

    fn index_bytes(&self, dataset: &Dataset) -> usize {
        let level_bytes = |name: &str, len: usize| {
            let itemsize = dataset
                .dimension_coordinate(name)
                .map_or(ElementType::Int64.itemsize(), |c| c.element_type().itemsize());
            len * itemsize
        };

        match self.dims.as_slice() {
            [] => ElementType::Int64.itemsize(),
            [(name, len)] => level_bytes(name.as_str(), *len),
            dims => dims
                .iter()
                .map(|(name, len)| level_bytes(name.as_str(), *len) + self.rows * index_code_width(*len))
                .sum(),
        }
    }
}

/// Columns of the projection: data variables, then non-dimension coordinates
fn columns(dataset: &Dataset) -> Vec<&Variable> {
    let non_dimension = dataset
        .coords()
        .iter()
        .filter(|c| dataset.dimension_coordinate(c.name()).is_none());
    dataset.data_vars().iter().chain(non_dimension).collect()
}

/// Measures the row-oriented projection of `dataset`
///
/// # Errors
///
/// Returns [`SkimError::InvalidInput`] for malformed datasets and propagates
/// execution errors of the chunked path unchanged.
#[instrument(level = "debug", skip_all, fields(chunked = dataset.is_chunked()))]
pub fn memory_profile<S: Scheduler + ?Sized>(
    dataset: &Dataset,
    scheduler: &S,
) -> Result<MemoryProfile> {
    dataset.validate()?;
    let frame = Frame::of(dataset);
    let columns = columns(dataset);

    let elements = if dataset.is_chunked() {
        info!(columns = columns.len(), "measuring chunked dataset through the scheduler");
        lazy_elements(&frame, &columns).compute(scheduler)?
    } else {
        eager_elements(&frame, &columns)?
    };

    let mut entries = Vec::with_capacity(columns.len() + 1);
    entries.push((INDEX_COLUMN.to_string(), frame.index_bytes(dataset)));
    for (variable, count) in columns.iter().zip(elements) {
        let bytes = count * variable.element_type().itemsize();
        debug!(column = %variable.name(), bytes, "measured column");
        entries.push((variable.name().to_string(), bytes));
    }
    Ok(MemoryProfile { entries })
}

/// Broadcast element count of every column
fn eager_elements(frame: &Frame, columns: &[&Variable]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|variable| match variable.data() {
            ArrayBackend::Eager(data) => data.projected_len(variable.dims(), &frame.dims),
            ArrayBackend::Chunked(_) => Err(SkimError::invalid(format!(
                "variable '{}' is chunked",
                variable.name()
            ))),
        })
        .collect()
}

/// Graph computing the broadcast element count of every column
///
/// Chunked columns contribute one task per chunk: the chunk is loaded and its
/// element count is scaled by the column's broadcast factor. In-memory columns
/// contribute a single task.
fn lazy_elements(frame: &Frame, columns: &[&Variable]) -> Deferred<(usize, usize), Vec<usize>> {
    let mut tasks: Vec<Task<(usize, usize)>> = Vec::new();
    for (column, variable) in columns.iter().enumerate() {
        let factor = frame.broadcast_factor(variable);
        match variable.data() {
            ArrayBackend::Chunked(chunked) => {
                tasks.extend(chunked.chunk_tasks(move |_, data| Ok((column, data.len() * factor))));
            }
            ArrayBackend::Eager(data) => {
                let count = data.len() * factor;
                tasks.push(Box::new(move || -> Result<(usize, usize)> { Ok((column, count)) }));
            }
        }
    }

    let n = columns.len();
    Deferred::new(format!("memory footprint of {n} columns"), tasks, move |parts| {
        let mut counts = vec![0; n];
        for (column, count) in parts {
            counts[column] += count;
        }
        Ok(counts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::ParallelConfig;
    use crate::scheduler::ThreadPoolScheduler;
    use ndarray::{ArrayD, IxDyn};

    fn scheduler() -> ThreadPoolScheduler {
        ThreadPoolScheduler::new(&ParallelConfig::with_threads(2)).unwrap()
    }

    #[test]
    fn code_width_follows_level_length() {
        assert_eq!(index_code_width(3), 1);
        assert_eq!(index_code_width(126), 1);
        assert_eq!(index_code_width(127), 2);
        assert_eq!(index_code_width(40_000), 4);
    }

    #[test]
    fn single_dimension_index_uses_coordinate_type() {
        let ds = Dataset::builder()
            .data_var("v", &["x"], ArrayD::<f32>::zeros(IxDyn(&[5])))
            .coord("x", &["x"], ArrayD::<i16>::zeros(IxDyn(&[5])))
            .build()
            .unwrap();
        let profile = memory_profile(&ds, &scheduler()).unwrap();
        assert_eq!(profile.columns().collect::<Vec<_>>(), ["Index", "v"]);
        assert_eq!(profile.get(INDEX_COLUMN), Some(10));
        assert_eq!(profile.get("v"), Some(20));
    }

    #[test]
    fn dataset_without_dimensions_has_one_row() {
        let ds = Dataset::builder()
            .data_var("scalar", &[], ArrayD::from_elem(IxDyn(&[]), 1.5_f64))
            .build()
            .unwrap();
        let profile = memory_profile(&ds, &scheduler()).unwrap();
        assert_eq!(profile.get(INDEX_COLUMN), Some(8));
        assert_eq!(profile.get("scalar"), Some(8));
        assert_eq!(profile.total(), 16);
    }

    #[test]
    fn chunked_and_eager_paths_agree() {
        let ds = Dataset::builder()
            .data_var("a", &["y", "x"], ArrayD::<f64>::zeros(IxDyn(&[3, 4])))
            .data_var("b", &["t"], ArrayD::<u8>::zeros(IxDyn(&[2])))
            .coord("lon", &["x", "y"], ArrayD::<f32>::zeros(IxDyn(&[4, 3])))
            .coord("t", &["t"], ArrayD::<i32>::zeros(IxDyn(&[2])))
            .build()
            .unwrap();
        let eager = memory_profile(&ds, &scheduler()).unwrap();
        let lazy = memory_profile(&ds.chunk(&[("x", 3), ("t", 1)]).unwrap(), &scheduler()).unwrap();

        assert_eq!(eager, lazy);
        assert_eq!(eager.get("a"), Some(24 * 8));
        assert_eq!(eager.get("b"), Some(24));
        assert_eq!(eager.get("lon"), Some(24 * 4));
        // y, x without coordinates (int64 levels), t with int32 levels
        assert_eq!(eager.get(INDEX_COLUMN), Some(3 * 8 + 4 * 8 + 2 * 4 + 24 * 3));
    }
}
