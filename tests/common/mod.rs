//! Shared fixtures for the integration tests
//!
//! Every fixture takes its random generator as an argument; tests seed their
//! own `StdRng` so they stay reproducible and independent of each other.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use raster_skim::parallel::ParallelConfig;
use raster_skim::scheduler::{AsyncScheduler, ThreadPoolScheduler};
use raster_skim::Dataset;

pub const SEED: u64 = 27;

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Installs a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn thread_pool() -> ThreadPoolScheduler {
    ThreadPoolScheduler::new(&ParallelConfig::with_threads(4)).expect("thread pool")
}

pub fn async_runtime() -> AsyncScheduler {
    AsyncScheduler::new(&ParallelConfig::with_threads(2)).expect("tokio runtime")
}

fn normal(rng: &mut StdRng, shape: &[usize], mean: f64, std: f64) -> ArrayD<f64> {
    let dist = Normal::new(mean, std).expect("valid normal distribution");
    ArrayD::from_shape_simple_fn(IxDyn(shape), || dist.sample(rng))
}

fn uniform(rng: &mut StdRng, shape: &[usize], low: f64, width: f64) -> ArrayD<f64> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || low + width * rng.gen::<f64>())
}

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid date")
}

/// Weather-like dataset over dims `(x, y, time)`
///
/// - `elevation`: normal, mean 10, std 5
/// - `temperature`: uniform on [30, 35)
/// - `precipitation`: uniform on [3, 3.03), missing along `x = 0, y = 1`
///
/// Coordinates are 2-D `lon`/`lat` grids over `(x, y)`, a daily `time` axis and
/// a scalar `reference_time`. Attributes use the `spatial_ref` key for the CRS
/// and carry an explicit resolution of 10.
pub fn weather_dataset(rng: &mut StdRng, shape: [usize; 3]) -> Dataset {
    weather_builder(rng, shape, true)
        .attr("spatial_ref", "EPSG:32615")
        .attr("resolution", 10.0)
        .build()
        .expect("valid weather dataset")
}

/// The weather variables and coordinates without any dataset attributes
pub fn weather_builder(
    rng: &mut StdRng,
    [nx, ny, nt]: [usize; 3],
    with_precipitation: bool,
) -> raster_skim::DatasetBuilder {
    let shape = [nx, ny, nt];
    let elevation = normal(rng, &shape, 10.0, 5.0);
    let mut precipitation = uniform(rng, &shape, 3.0, 0.03);
    let temperature = uniform(rng, &shape, 30.0, 5.0);
    if ny > 1 {
        for t in 0..nt {
            precipitation[[0, 1, t].as_slice()] = f64::NAN;
        }
    }

    let grid = ArrayD::from_shape_fn(IxDyn(&[nx, ny]), |ix| (ix[0] * ny + ix[1]) as f64 * 100.0);
    let time = ArrayD::from_shape_fn(IxDyn(&[nt]), |ix| {
        date(2022, 8, 1) + Duration::days(ix[0] as i64)
    });
    let reference_time = ArrayD::from_elem(IxDyn(&[]), date(2022, 10, 10));

    let mut builder = Dataset::builder()
        .data_var("elevation", &["x", "y", "time"], elevation)
        .data_var("temperature", &["x", "y", "time"], temperature);
    if with_precipitation {
        builder = builder.data_var("precipitation", &["x", "y", "time"], precipitation);
    }
    builder
        .coord("lon", &["x", "y"], grid.clone())
        .coord("lat", &["x", "y"], grid)
        .coord("time", &["time"], time)
        .coord("reference_time", &[], reference_time)
        .attr("description", "Weather related data.")
}

/// Non-missing values of a data variable, flattened
pub fn finite_values(dataset: &Dataset, name: &str) -> Vec<f64> {
    let scheduler = thread_pool();
    dataset
        .data_var(name)
        .expect("variable exists")
        .data()
        .materialize(&scheduler)
        .expect("materialized")
        .values_f64()
        .expect("numeric")
        .into_iter()
        .filter(|v| !v.is_nan())
        .collect()
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

pub fn assert_close(actual: f64, expected: f64, rel: f64) {
    if expected.is_nan() {
        assert!(actual.is_nan(), "expected NaN, got {actual}");
        return;
    }
    let tol = rel * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tol,
        "{actual} differs from {expected} by more than {tol}"
    );
}
