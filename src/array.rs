//! Element types and eagerly materialized array storage
//!
//! [`ArrayData`] is the in-memory representation of one variable: a dynamic
//! dimensional `ndarray` of a single element type. Floating point arrays use
//! NaN to mark missing values; integer and datetime arrays have no missing
//! representation.

use crate::errors::{Result, SkimError};
use chrono::{DateTime, Utc};
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Float64,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    DateTime,
}

impl ElementType {
    /// Numpy-style name, as reported in the `data_types` column
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::DateTime => "datetime64[ns]",
        }
    }

    /// Bytes per element
    #[must_use]
    pub const fn itemsize(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::Float64 | Self::Int64 | Self::DateTime => 8,
        }
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::DateTime)
    }

    /// Whether the type can hold missing (NaN) values
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lossy widening to f64 for the numeric element types
pub(crate) trait AsF64: Copy + Send + Sync {
    fn as_f64(self) -> f64;
}

macro_rules! impl_as_f64 {
    ($($t:ty),*) => {
        $(
            impl AsF64 for $t {
                #[inline]
                fn as_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_as_f64!(f32, f64, i16, i32, i64, u8, u16, u32);

/// An eagerly materialized n-dimensional array
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    DateTime(ArrayD<DateTime<Utc>>),
}

/// Evaluates `$body` with `$arr` bound to the inner array of any variant.
macro_rules! each_variant {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::Float32($arr) => $body,
            ArrayData::Float64($arr) => $body,
            ArrayData::Int16($arr) => $body,
            ArrayData::Int32($arr) => $body,
            ArrayData::Int64($arr) => $body,
            ArrayData::UInt8($arr) => $body,
            ArrayData::UInt16($arr) => $body,
            ArrayData::UInt32($arr) => $body,
            ArrayData::DateTime($arr) => $body,
        }
    };
}

/// Like `each_variant!` but rewraps the result in the same variant.
macro_rules! map_variant {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::Float32($arr) => ArrayData::Float32($body),
            ArrayData::Float64($arr) => ArrayData::Float64($body),
            ArrayData::Int16($arr) => ArrayData::Int16($body),
            ArrayData::Int32($arr) => ArrayData::Int32($body),
            ArrayData::Int64($arr) => ArrayData::Int64($body),
            ArrayData::UInt8($arr) => ArrayData::UInt8($body),
            ArrayData::UInt16($arr) => ArrayData::UInt16($body),
            ArrayData::UInt32($arr) => ArrayData::UInt32($body),
            ArrayData::DateTime($arr) => ArrayData::DateTime($body),
        }
    };
}

/// Numeric variants evaluate `$body` (where `$arr: &ArrayD<T: AsF64>`),
/// datetime evaluates `$other`.
macro_rules! with_numeric {
    ($data:expr, $arr:ident => $body:expr, else $other:expr) => {
        match $data {
            ArrayData::Float32($arr) => $body,
            ArrayData::Float64($arr) => $body,
            ArrayData::Int16($arr) => $body,
            ArrayData::Int32($arr) => $body,
            ArrayData::Int64($arr) => $body,
            ArrayData::UInt8($arr) => $body,
            ArrayData::UInt16($arr) => $body,
            ArrayData::UInt32($arr) => $body,
            ArrayData::DateTime(_) => $other,
        }
    };
}

pub(crate) use with_numeric;

macro_rules! impl_from_array {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl From<ArrayD<$t>> for ArrayData {
                fn from(array: ArrayD<$t>) -> Self {
                    ArrayData::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(
    f32 => Float32,
    f64 => Float64,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    DateTime<Utc> => DateTime
);

impl ArrayData {
    /// Array of `dtype` filled with the element type's default value
    #[must_use]
    pub fn default_of(dtype: ElementType, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match dtype {
            ElementType::Float32 => ArrayData::Float32(ArrayD::default(dim)),
            ElementType::Float64 => ArrayData::Float64(ArrayD::default(dim)),
            ElementType::Int16 => ArrayData::Int16(ArrayD::default(dim)),
            ElementType::Int32 => ArrayData::Int32(ArrayD::default(dim)),
            ElementType::Int64 => ArrayData::Int64(ArrayD::default(dim)),
            ElementType::UInt8 => ArrayData::UInt8(ArrayD::default(dim)),
            ElementType::UInt16 => ArrayData::UInt16(ArrayD::default(dim)),
            ElementType::UInt32 => ArrayData::UInt32(ArrayD::default(dim)),
            ElementType::DateTime => ArrayData::DateTime(ArrayD::default(dim)),
        }
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayData::Float32(_) => ElementType::Float32,
            ArrayData::Float64(_) => ElementType::Float64,
            ArrayData::Int16(_) => ElementType::Int16,
            ArrayData::Int32(_) => ElementType::Int32,
            ArrayData::Int64(_) => ElementType::Int64,
            ArrayData::UInt8(_) => ElementType::UInt8,
            ArrayData::UInt16(_) => ElementType::UInt16,
            ArrayData::UInt32(_) => ElementType::UInt32,
            ArrayData::DateTime(_) => ElementType::DateTime,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        each_variant!(self, a => a.shape())
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        each_variant!(self, a => a.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out the hyper-rectangle starting at `offset` with extent `shape`
    ///
    /// # Errors
    ///
    /// Returns an error if the region does not fit inside the array.
    pub fn slice_chunk(&self, offset: &[usize], shape: &[usize]) -> Result<ArrayData> {
        check_region(self.shape(), offset, shape)?;
        Ok(map_variant!(self, a => a
            .slice_each_axis(|ax| region_slice(offset, shape, ax.axis))
            .to_owned()))
    }

    /// Rebuilds a full array from non-overlapping chunks
    ///
    /// Regions not covered by any part keep the element type's default value.
    ///
    /// # Errors
    ///
    /// Returns an error if a part has the wrong element type or does not fit.
    pub fn assemble(
        dtype: ElementType,
        shape: &[usize],
        parts: Vec<(Vec<usize>, ArrayData)>,
    ) -> Result<ArrayData> {
        let mut out = ArrayData::default_of(dtype, shape);
        for (offset, part) in parts {
            out.assign_region(&offset, &part)?;
        }
        Ok(out)
    }

    fn assign_region(&mut self, offset: &[usize], part: &ArrayData) -> Result<()> {
        check_region(self.shape(), offset, part.shape())?;
        let extent = part.shape().to_vec();

        macro_rules! assign {
            ($dst:expr, $src:expr, $offset:expr, $extent:expr; $($variant:ident),*) => {
                match ($dst, $src) {
                    $(
                        (ArrayData::$variant(dst), ArrayData::$variant(src)) => {
                            dst.slice_each_axis_mut(|ax| region_slice($offset, $extent, ax.axis))
                                .assign(src);
                            Ok(())
                        }
                    )*
                    (dst, src) => Err(SkimError::invalid(format!(
                        "cannot place {} values into a {} array",
                        src.element_type(),
                        dst.element_type()
                    ))),
                }
            };
        }

        assign!(self, part, offset, &extent; Float32, Float64, Int16, Int32, Int64, UInt8, UInt16, UInt32, DateTime)
    }

    /// All values widened to f64 in logical (C) order; `None` for datetimes
    #[must_use]
    pub fn values_f64(&self) -> Option<Vec<f64>> {
        with_numeric!(self, a => Some(a.iter().map(|&x| x.as_f64()).collect()), else None)
    }

    /// Value at a flat logical (C order) index, widened to f64
    #[must_use]
    pub fn value_f64_at(&self, flat_index: usize) -> Option<f64> {
        with_numeric!(self, a => a.iter().nth(flat_index).map(|&x| x.as_f64()), else None)
    }

    /// Number of elements this array occupies once broadcast over a frame
    ///
    /// `dims` names this array's axes; `frame` lists every frame dimension in
    /// order with its length. Axes are reordered to frame order, missing frame
    /// dimensions are inserted, and the resulting view is broadcast to the
    /// full frame shape.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is not part of the frame or the
    /// lengths do not broadcast.
    pub fn projected_len(&self, dims: &[String], frame: &[(String, usize)]) -> Result<usize> {
        each_variant!(self, a => projected_len(a, dims, frame))
    }
}

fn projected_len<T>(array: &ArrayD<T>, dims: &[String], frame: &[(String, usize)]) -> Result<usize> {
    let positions = dims
        .iter()
        .map(|d| {
            frame
                .iter()
                .position(|(name, _)| name == d)
                .ok_or_else(|| SkimError::invalid(format!("dimension '{d}' is not part of the frame")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut order: Vec<usize> = (0..dims.len()).collect();
    order.sort_by_key(|&i| positions[i]);

    let mut view = array.view().permuted_axes(IxDyn(&order));
    for (frame_axis, (name, _)) in frame.iter().enumerate() {
        if !dims.contains(name) {
            view = view.insert_axis(Axis(frame_axis));
        }
    }

    let frame_shape: Vec<usize> = frame.iter().map(|(_, len)| *len).collect();
    let projected = view.broadcast(IxDyn(&frame_shape)).ok_or_else(|| {
        SkimError::invalid(format!(
            "array of shape {:?} does not broadcast to frame {:?}",
            array.shape(),
            frame_shape
        ))
    })?;
    Ok(projected.len())
}

fn region_slice(offset: &[usize], shape: &[usize], axis: Axis) -> Slice {
    let i = axis.index();
    Slice::from(offset[i]..offset[i] + shape[i])
}

fn check_region(full: &[usize], offset: &[usize], shape: &[usize]) -> Result<()> {
    if offset.len() != full.len() || shape.len() != full.len() {
        return Err(SkimError::invalid(format!(
            "region rank {} does not match array rank {}",
            shape.len(),
            full.len()
        )));
    }
    let fits = full
        .iter()
        .zip(offset.iter().zip(shape))
        .all(|(&len, (&start, &extent))| start + extent <= len);
    if !fits {
        return Err(SkimError::invalid(format!(
            "region at {offset:?} with extent {shape:?} exceeds array shape {full:?}"
        )));
    }
    Ok(())
}
