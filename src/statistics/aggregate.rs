//! Per-variable summary statistics

use super::operations::{ArrayReduction, ReduceKind};
use crate::dataset::{Dataset, Variable};
use crate::errors::{Result, SkimError};
use crate::metadata::schema;
use crate::profile::VariableProfile;
use crate::scheduler::Scheduler;
use tracing::{debug, instrument};

/// Computes one [`VariableProfile`] per data variable, in schema order
///
/// Every statistic reduces over all dimensions of the variable jointly.
/// Deferred reductions are resolved on `scheduler` before the next variable
/// is visited, so a failure never leaves partially populated rows behind.
///
/// # Errors
///
/// - [`SkimError::InvalidInput`] if the dataset is malformed
/// - [`SkimError::ReductionFailure`] if a variable's element type does not
///   support a statistic
/// - execution errors from chunked variables, unchanged
#[instrument(level = "debug", skip_all, fields(variables = dataset.data_vars().len()))]
pub fn variable_profiles<S: Scheduler + ?Sized>(
    dataset: &Dataset,
    scheduler: &S,
) -> Result<Vec<VariableProfile>> {
    schema(dataset)?
        .into_iter()
        .map(|entry| {
            let variable = dataset.data_var(&entry.name).ok_or_else(|| {
                SkimError::invalid(format!("data variable '{}' disappeared", entry.name))
            })?;
            variable_profile(variable, scheduler)
        })
        .collect()
}

fn variable_profile<S: Scheduler + ?Sized>(
    variable: &Variable,
    scheduler: &S,
) -> Result<VariableProfile> {
    let statistic = |kind: ReduceKind| -> Result<f64> {
        variable
            .data()
            .reduce(kind)
            .map_err(|e| SkimError::ReductionFailure {
                variable: variable.name().to_string(),
                source: Box::new(e),
            })?
            .resolve(scheduler)
    };

    let nulls = statistic(ReduceKind::NullCount)?;
    let profile = VariableProfile {
        name: variable.name().to_string(),
        element_type: variable.element_type(),
        has_missing: nulls > 0.0,
        mean: statistic(ReduceKind::Mean)?,
        std: statistic(ReduceKind::Std)?,
        max: statistic(ReduceKind::Max)?,
        min: statistic(ReduceKind::Min)?,
    };
    debug!(
        variable = %profile.name,
        chunked = variable.is_chunked(),
        nulls,
        mean = profile.mean,
        "profiled variable"
    );
    Ok(profile)
}
