//! Parallel computation of whole-array partial aggregates
//!
//! This module contains the eager reduction path: a Rayon fold over every
//! element followed by a pairwise merge of the per-thread partials.

use super::operations::{Moments, ReduceKind};
use crate::array::{with_numeric, ArrayData, AsF64};
use crate::errors::{Result, SkimError};
use ndarray::parallel::prelude::*;
use ndarray::ArrayD;

/// Computes the partial aggregate of an array using parallel processing
///
/// Values are widened to f64 before accumulation to avoid precision loss.
pub(crate) fn parallel_moments<T: AsF64>(data: &ArrayD<T>) -> Moments {
    data.par_iter()
        .fold(Moments::default, |acc, &x| acc.push(x.as_f64()))
        .reduce(Moments::default, Moments::merge)
}

/// Partial aggregate of any numeric [`ArrayData`]
///
/// # Errors
///
/// Returns [`SkimError::UnsupportedReduction`] for datetime arrays.
pub(crate) fn array_moments(data: &ArrayData) -> Result<Moments> {
    with_numeric!(data, a => Ok(parallel_moments(a)), else Err(SkimError::UnsupportedReduction {
        kind: ReduceKind::Mean,
        dtype: data.element_type(),
    }))
}
