//! Lazily evaluated, chunked arrays
//!
//! A [`ChunkedArray`] knows its element type, shape and a regular chunk grid,
//! but holds no values. Values are produced by a loader, one chunk at a time,
//! only while a [`Deferred`] graph built from the array is being executed by a
//! [`Scheduler`].

use crate::array::{ArrayData, ElementType};
use crate::errors::{Result, SkimError};
use crate::scheduler::{Deferred, Scheduler, Task};
use ndarray::{Dimension, IxDyn};
use std::fmt;
use std::sync::Arc;

/// Produces the values of one chunk on demand
pub type ChunkLoader = Arc<dyn Fn(&ChunkSpec) -> Result<ArrayData> + Send + Sync>;

/// Position and extent of one chunk in the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    /// Position in the chunk grid
    pub index: Vec<usize>,
    /// Offset of the first element along each axis
    pub offset: Vec<usize>,
    /// Extent along each axis (edge chunks may be smaller)
    pub shape: Vec<usize>,
}

impl ChunkSpec {
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a multi-index of the full array lies in this chunk
    pub(crate) fn contains(&self, coords: &[usize]) -> bool {
        coords
            .iter()
            .zip(self.offset.iter().zip(&self.shape))
            .all(|(&c, (&start, &extent))| c >= start && c < start + extent)
    }
}

impl fmt::Display for ChunkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index: Vec<String> = self.index.iter().map(ToString::to_string).collect();
        write!(f, "chunk ({})", index.join(", "))
    }
}

/// An array whose chunks are loaded only when a deferred graph runs
#[derive(Clone)]
pub struct ChunkedArray {
    dtype: ElementType,
    shape: Vec<usize>,
    chunk_shape: Vec<usize>,
    loader: ChunkLoader,
}

impl fmt::Debug for ChunkedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedArray")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("chunk_shape", &self.chunk_shape)
            .finish_non_exhaustive()
    }
}

impl ChunkedArray {
    /// Creates a chunked array backed by an arbitrary loader
    ///
    /// Chunk sizes larger than an axis are clamped to the axis length.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_shape` has the wrong rank or a zero size.
    pub fn from_loader(
        dtype: ElementType,
        shape: &[usize],
        chunk_shape: &[usize],
        loader: impl Fn(&ChunkSpec) -> Result<ArrayData> + Send + Sync + 'static,
    ) -> Result<Self> {
        if chunk_shape.len() != shape.len() {
            return Err(SkimError::invalid(format!(
                "chunk shape {chunk_shape:?} does not match array rank {}",
                shape.len()
            )));
        }
        if chunk_shape.contains(&0) {
            return Err(SkimError::invalid(format!(
                "chunk shape {chunk_shape:?} contains a zero-sized axis"
            )));
        }

        let chunk_shape = chunk_shape
            .iter()
            .zip(shape)
            .map(|(&c, &len)| if len > 0 { c.min(len) } else { c })
            .collect();

        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            chunk_shape,
            loader: Arc::new(loader),
        })
    }

    /// Splits an in-memory array into chunks that are sliced out on demand
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_shape` is invalid for the array.
    pub fn from_array(data: ArrayData, chunk_shape: &[usize]) -> Result<Self> {
        let dtype = data.element_type();
        let shape = data.shape().to_vec();
        let source = Arc::new(data);
        Self::from_loader(dtype, &shape, chunk_shape, move |spec| {
            source.slice_chunk(&spec.offset, &spec.shape)
        })
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks along each axis
    #[must_use]
    pub fn grid(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&len, &c)| len.div_ceil(c))
            .collect()
    }

    /// All chunks of the grid in C order
    #[must_use]
    pub fn chunks(&self) -> Vec<ChunkSpec> {
        ndarray::indices(IxDyn(&self.grid()))
            .into_iter()
            .map(|ix| {
                let index: Vec<usize> = ix.slice().to_vec();
                let offset: Vec<usize> = index
                    .iter()
                    .zip(&self.chunk_shape)
                    .map(|(&i, &c)| i * c)
                    .collect();
                let shape = offset
                    .iter()
                    .zip(self.shape.iter().zip(&self.chunk_shape))
                    .map(|(&start, (&len, &c))| c.min(len - start))
                    .collect();
                ChunkSpec {
                    index,
                    offset,
                    shape,
                }
            })
            .collect()
    }

    /// Loads one chunk and checks it against its spec
    ///
    /// # Errors
    ///
    /// Loader errors are returned unchanged; a chunk of the wrong element type
    /// or shape is an execution error.
    pub fn load(&self, spec: &ChunkSpec) -> Result<ArrayData> {
        let data = (self.loader)(spec)?;
        if data.element_type() != self.dtype {
            return Err(SkimError::execution(
                spec.to_string(),
                format!(
                    "loaded {} values for a {} array",
                    data.element_type(),
                    self.dtype
                ),
            ));
        }
        if data.shape() != spec.shape.as_slice() {
            return Err(SkimError::execution(
                spec.to_string(),
                format!(
                    "loaded shape {:?} but the chunk grid expects {:?}",
                    data.shape(),
                    spec.shape
                ),
            ));
        }
        Ok(data)
    }

    /// One task per chunk: load the chunk and apply `f` to it
    pub(crate) fn chunk_tasks<P, F>(&self, f: F) -> Vec<Task<P>>
    where
        P: Send + 'static,
        F: Fn(&ChunkSpec, ArrayData) -> Result<P> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.chunks()
            .into_iter()
            .map(|spec| {
                let array = self.clone();
                let f = Arc::clone(&f);
                Box::new(move || {
                    let data = array.load(&spec)?;
                    f(&spec, data)
                }) as Task<P>
            })
            .collect()
    }

    /// Graph that materializes the whole array
    #[must_use]
    pub fn materialize(&self) -> Deferred<(Vec<usize>, ArrayData), ArrayData> {
        let tasks = self.chunk_tasks(|spec, data| Ok((spec.offset.clone(), data)));
        let dtype = self.dtype;
        let shape = self.shape.clone();
        Deferred::new(format!("materialize {dtype}{shape:?}"), tasks, move |parts| {
            ArrayData::assemble(dtype, &shape, parts)
        })
    }

    /// Materializes the whole array on `scheduler`
    ///
    /// # Errors
    ///
    /// Propagates loader and execution errors.
    pub fn compute<S: Scheduler + ?Sized>(&self, scheduler: &S) -> Result<ArrayData> {
        self.materialize().compute(scheduler)
    }
}

/// Multi-index (C order) of a flat element index
pub(crate) fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; shape.len()];
    for (axis, &len) in shape.iter().enumerate().rev() {
        if len > 0 {
            coords[axis] = flat % len;
            flat /= len;
        }
    }
    coords
}

/// Flat C-order index of a multi-index within `shape`
pub(crate) fn ravel(coords: &[usize], shape: &[usize]) -> usize {
    coords
        .iter()
        .zip(shape)
        .fold(0, |flat, (&c, &len)| flat * len + c)
}
