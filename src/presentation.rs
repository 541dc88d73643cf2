//! Data behind the map and distribution views of a profile
//!
//! Nothing here renders. [`map_view`] lays out bounding boxes for a web map and
//! [`density_curves`] estimates one density curve per profiled variable; a
//! plotting front end only has to draw the returned points.

use crate::dataset::Dataset;
use crate::errors::{Result, SkimError};
use crate::profile::DatasetProfile;
use crate::scheduler::{Scheduler, Task};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::debug;

/// Geographic box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// # Errors
    ///
    /// Returns an error if a bound is not finite or the box is inverted.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        let bbox = Self {
            west,
            south,
            east,
            north,
        };
        bbox.check()?;
        Ok(bbox)
    }

    fn check(&self) -> Result<()> {
        let finite = [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.west > self.east || self.south > self.north {
            return Err(SkimError::invalid(format!("malformed bounding box {self:?}")));
        }
        Ok(())
    }

    /// Centre as (latitude, longitude)
    #[must_use]
    pub fn centre(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }

    /// Smallest box containing both
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Closed outline ring as (latitude, longitude) pairs, counter-clockwise
    #[must_use]
    pub fn outline(&self) -> Vec<(f64, f64)> {
        vec![
            (self.south, self.east),
            (self.north, self.east),
            (self.north, self.west),
            (self.south, self.west),
            (self.south, self.east),
        ]
    }

    /// South-west and north-east corners as (latitude, longitude)
    #[must_use]
    pub fn corners(&self) -> [(f64, f64); 2] {
        [(self.south, self.west), (self.north, self.east)]
    }
}

/// One labelled box on the map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFeature {
    pub label: String,
    pub color: String,
    pub outline: Vec<(f64, f64)>,
    /// Marker at the box centre, (latitude, longitude)
    pub marker: (f64, f64),
}

/// Features plus the bounds the view is fitted to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub features: Vec<MapFeature>,
    pub bounds: BoundingBox,
}

/// Lays out labelled boxes and fits the view to their union
///
/// # Errors
///
/// Returns [`SkimError::InvalidInput`] when no box is given, the three inputs
/// differ in length, or a box is malformed.
pub fn map_view(boxes: &[BoundingBox], labels: &[&str], colors: &[&str]) -> Result<MapView> {
    if boxes.len() != labels.len() || boxes.len() != colors.len() {
        return Err(SkimError::invalid(format!(
            "got {} boxes, {} labels and {} colors",
            boxes.len(),
            labels.len(),
            colors.len()
        )));
    }
    let Some(first) = boxes.first() else {
        return Err(SkimError::invalid("a map view needs at least one box"));
    };

    let mut bounds = *first;
    let mut features = Vec::with_capacity(boxes.len());
    for ((bbox, label), color) in boxes.iter().zip(labels).zip(colors) {
        bbox.check()?;
        bounds = bounds.union(bbox);
        features.push(MapFeature {
            label: (*label).to_string(),
            color: (*color).to_string(),
            outline: bbox.outline(),
            marker: bbox.centre(),
        });
    }
    Ok(MapView { features, bounds })
}

/// Estimated density of one variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityCurve {
    pub variable: String,
    /// Evaluation points
    pub x: Vec<f64>,
    /// Density at each point, normalized to sum to 1
    pub y: Vec<f64>,
    /// Kernel bandwidth; `None` when the curve is empty
    pub bandwidth: Option<f64>,
    /// Suggested horizontal view range
    pub view_range: (f64, f64),
}

/// Lower and upper padding of the sampling range around `[min, max]`
const RANGE_PAD: (f64, f64) = (5.0, 20.0);
/// Upper padding of the suggested view range
const VIEW_PAD: f64 = 10.0;
/// Evaluation points per scheduled task
const KDE_BLOCK: usize = 256;

/// Gaussian kernel density estimate for every row of `profile`
///
/// Each curve is sampled at `sample_size` evenly spaced points over
/// `[min - 5, max + 20]`. The bandwidth follows Scott's rule using the sample
/// standard deviation of the non-missing values. Rows with no values give an
/// empty curve. Kernel evaluation runs on `scheduler`.
///
/// # Errors
///
/// - [`SkimError::InvalidInput`] for a zero `sample_size` or a row naming no
///   data variable
/// - [`SkimError::ReductionFailure`] when the values have zero spread
pub fn density_curves<S: Scheduler + ?Sized>(
    dataset: &Dataset,
    profile: &DatasetProfile,
    sample_size: usize,
    scheduler: &S,
) -> Result<Vec<DensityCurve>> {
    if sample_size == 0 {
        return Err(SkimError::invalid("sample size must be at least 1"));
    }

    profile
        .rows
        .iter()
        .map(|row| {
            let variable = dataset.data_var(&row.name).ok_or_else(|| {
                SkimError::invalid(format!("profile row '{}' is not a data variable", row.name))
            })?;
            let view_range = (row.min - RANGE_PAD.0, row.max + VIEW_PAD);
            if row.min.is_nan() || row.max.is_nan() {
                return Ok(DensityCurve {
                    variable: row.name.clone(),
                    x: Vec::new(),
                    y: Vec::new(),
                    bandwidth: None,
                    view_range,
                });
            }

            let data = variable.data().materialize(scheduler)?;
            let values: Vec<f64> = data
                .values_f64()
                .ok_or_else(|| SkimError::ReductionFailure {
                    variable: row.name.clone(),
                    source: Box::new(SkimError::invalid("values are not numeric")),
                })?
                .into_iter()
                .filter(|v| !v.is_nan())
                .collect();

            let bandwidth = scott_bandwidth(&values).ok_or_else(|| SkimError::ReductionFailure {
                variable: row.name.clone(),
                source: Box::new(SkimError::invalid(
                    "density needs at least two distinct values",
                )),
            })?;
            let x = linspace(row.min - RANGE_PAD.0, row.max + RANGE_PAD.1, sample_size);
            let y = normalized(gaussian_kde(values, bandwidth, &x, scheduler)?);
            debug!(variable = %row.name, bandwidth, points = x.len(), "estimated density");

            Ok(DensityCurve {
                variable: row.name.clone(),
                x,
                y,
                bandwidth: Some(bandwidth),
                view_range,
            })
        })
        .collect()
}

/// Scott's rule: sample standard deviation times n^(-1/5)
fn scott_bandwidth(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let bandwidth = variance.sqrt() * (n as f64).powf(-0.2);
    (bandwidth.is_finite() && bandwidth > 0.0).then_some(bandwidth)
}

fn gaussian_kde<S: Scheduler + ?Sized>(
    values: Vec<f64>,
    bandwidth: f64,
    points: &[f64],
    scheduler: &S,
) -> Result<Vec<f64>> {
    let values = Arc::new(values);
    let tasks: Vec<Task<Vec<f64>>> = points
        .chunks(KDE_BLOCK)
        .map(|block| {
            let values = Arc::clone(&values);
            let block = block.to_vec();
            Box::new(move || Ok(kernel_sums(&values, bandwidth, &block))) as Task<Vec<f64>>
        })
        .collect();
    Ok(scheduler.execute(tasks)?.concat())
}

fn kernel_sums(values: &[f64], bandwidth: f64, points: &[f64]) -> Vec<f64> {
    let norm = 1.0 / (values.len() as f64 * bandwidth * (2.0 * PI).sqrt());
    points
        .iter()
        .map(|&x| {
            let total: f64 = values
                .iter()
                .map(|&v| {
                    let z = (x - v) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum();
            total * norm
        })
        .collect()
}

fn normalized(mut y: Vec<f64>) -> Vec<f64> {
    let total: f64 = y.iter().sum();
    if total > 0.0 {
        y.iter_mut().for_each(|v| *v /= total);
    }
    y
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::ParallelConfig;
    use crate::scheduler::ThreadPoolScheduler;
    use ndarray::{ArrayD, IxDyn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts the batches handed to the wrapped scheduler
    struct CountingScheduler {
        inner: ThreadPoolScheduler,
        batches: AtomicUsize,
    }

    impl Scheduler for CountingScheduler {
        fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(tasks)
        }
    }

    fn single_thread() -> ThreadPoolScheduler {
        ThreadPoolScheduler::new(&ParallelConfig::with_threads(1)).unwrap()
    }

    #[test]
    fn map_view_fits_the_union() {
        let boxes = [
            BoundingBox::new(-93.0, 44.0, -92.0, 45.0).unwrap(),
            BoundingBox::new(-95.0, 43.5, -94.0, 44.5).unwrap(),
        ];
        let view = map_view(&boxes, &["farm", "lake"], &["red", "blue"]).unwrap();
        assert_eq!(view.bounds, BoundingBox::new(-95.0, 43.5, -92.0, 45.0).unwrap());
        assert_eq!(view.features[0].marker, (44.5, -92.5));
        assert_eq!(view.features[1].outline.len(), 5);
        assert_eq!(view.features[1].outline.first(), view.features[1].outline.last());
    }

    #[test]
    fn map_view_rejects_mismatched_inputs() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(map_view(&[bbox], &["a", "b"], &["red"]).is_err());
        assert!(map_view(&[], &[], &[]).is_err());
        assert!(BoundingBox::new(2.0, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn kde_sums_to_one() {
        let values: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
        let bandwidth = scott_bandwidth(&values).unwrap();
        let x = linspace(-5.0, 26.0, 600);
        let y = normalized(gaussian_kde(values, bandwidth, &x, &single_thread()).unwrap());
        assert_eq!(y.len(), 600);
        assert!((y.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(y.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn density_is_evaluated_on_the_given_scheduler() {
        let ramp = ArrayD::from_shape_fn(IxDyn(&[4, 5]), |ix| (ix[0] * 5 + ix[1]) as f64);
        let dataset = Dataset::builder()
            .data_var("ramp", &["y", "x"], ramp)
            .build()
            .unwrap();
        let profile = crate::profile::profile(&dataset).unwrap();
        let scheduler = CountingScheduler {
            inner: single_thread(),
            batches: AtomicUsize::new(0),
        };

        let curves = density_curves(&dataset, &profile, 64, &scheduler).unwrap();
        assert_eq!(curves[0].y.len(), 64);
        // eager data is not rescheduled, only the kernel evaluation
        assert_eq!(scheduler.batches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn constant_values_have_no_bandwidth() {
        assert!(scott_bandwidth(&[3.0; 10]).is_none());
        assert!(scott_bandwidth(&[1.0]).is_none());
    }

    #[test]
    fn linspace_includes_both_ends() {
        let x = linspace(-5.0, 20.0, 6);
        assert_eq!(x, vec![-5.0, 0.0, 5.0, 10.0, 15.0, 20.0]);
    }
}
