mod common;

use common::{assert_close, async_runtime, rng, thread_pool, weather_dataset, SEED};
use ndarray::{ArrayD, IxDyn};
use raster_skim::{
    ArrayBackend, ArrayData, ArrayReduction, ChunkedArray, Dataset, ElementType, Profiler,
    ReduceKind, Scheduler, SkimError, SpatialConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn assert_same_profile<S: Scheduler>(scheduler: S) {
    let eager = weather_dataset(&mut rng(SEED), [6, 5, 4]);
    let lazy = eager.chunk(&[("x", 4), ("time", 3)]).expect("chunked");
    assert!(!eager.is_chunked());
    assert!(lazy.is_chunked());

    let profiler = Profiler::with_scheduler(scheduler, SpatialConfig::default());
    let expected = profiler.profile(&eager).expect("eager profile");
    let actual = profiler.profile(&lazy).expect("lazy profile");

    assert_eq!(expected.resolution, actual.resolution);
    assert_eq!(expected.spatial_reference, actual.spatial_reference);
    for (e, a) in expected.rows.iter().zip(&actual.rows) {
        assert_eq!(e.name, a.name);
        assert_eq!(e.element_type, a.element_type);
        assert_eq!(e.has_missing, a.has_missing);
        assert_close(a.mean, e.mean, 1e-9);
        assert_close(a.std, e.std, 1e-9);
        assert_eq!(a.min, e.min);
        assert_eq!(a.max, e.max);
    }

    assert_eq!(
        profiler.memory_profile(&eager).expect("eager memory"),
        profiler.memory_profile(&lazy).expect("lazy memory")
    );
}

#[test]
fn test_thread_pool_lazy_matches_eager() {
    common::init_tracing();
    assert_same_profile(thread_pool());
}

#[test]
fn test_async_lazy_matches_eager() {
    assert_same_profile(async_runtime());
}

/// A chunked ramp whose loader counts its invocations
fn counted_ramp(shape: &[usize], chunks: &[usize]) -> (ChunkedArray, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let full = shape.to_vec();
    let array = ChunkedArray::from_loader(ElementType::Float64, shape, chunks, move |spec| {
        counter.fetch_add(1, Ordering::SeqCst);
        let values = ArrayD::from_shape_fn(IxDyn(&spec.shape), |ix| {
            let flat = (0..spec.shape.len()).fold(0, |acc, axis| acc * full[axis] + spec.offset[axis] + ix[axis]);
            flat as f64
        });
        Ok(ArrayData::from(values))
    })
    .expect("chunked array");
    (array, calls)
}

#[test]
fn test_reduction_is_deferred_until_resolved() {
    let (array, calls) = counted_ramp(&[10, 7], &[4, 3]);
    let reduction = array.reduce(ReduceKind::Mean).expect("reduction");
    assert!(reduction.is_deferred());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let mean = reduction.resolve(&thread_pool()).expect("mean");
    assert_close(mean, 34.5, 1e-12);
    // 3 x 3 chunk grid, each chunk loaded once
    assert_eq!(calls.load(Ordering::SeqCst), 9);
}

#[test]
fn test_dataset_reduce_returns_handles_in_schema_order() {
    let (a, _) = counted_ramp(&[4, 4], &[2, 2]);
    let dataset = Dataset::builder()
        .data_var("ramp", &["y", "x"], a)
        .data_var("ones", &["y", "x"], ArrayD::<f32>::ones(IxDyn(&[4, 4])))
        .build()
        .expect("dataset");

    let reductions = dataset.reduce(ReduceKind::Sum).expect("reductions");
    let names: Vec<&str> = reductions.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["ramp", "ones"]);

    let scheduler = async_runtime();
    let sums: Vec<f64> = reductions
        .into_iter()
        .map(|(_, r)| r.resolve(&scheduler).expect("sum"))
        .collect();
    assert_eq!(sums, [120.0, 16.0]);
}

#[test]
fn test_execution_errors_propagate_unchanged() {
    let failing = ChunkedArray::from_loader(ElementType::Float32, &[6], &[2], |spec| {
        if spec.index == [2] {
            return Err(SkimError::Execution {
                task: spec.to_string(),
                message: "object store unavailable".into(),
            });
        }
        Ok(ArrayData::from(ArrayD::<f32>::zeros(IxDyn(&spec.shape))))
    })
    .expect("chunked array");
    let dataset = Dataset::builder()
        .data_var("flaky", &["x"], failing)
        .build()
        .expect("dataset");

    for err in [
        raster_skim::profile(&dataset).unwrap_err(),
        Profiler::with_scheduler(async_runtime(), SpatialConfig::default())
            .profile(&dataset)
            .unwrap_err(),
    ] {
        match err {
            SkimError::Execution { task, message } => {
                assert_eq!(task, "chunk (2)");
                assert_eq!(message, "object store unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn test_chunk_with_wrong_shape_is_reported() {
    let broken = ChunkedArray::from_loader(ElementType::Int32, &[5], &[2], |_| {
        Ok(ArrayData::from(ArrayD::<i32>::zeros(IxDyn(&[2]))))
    })
    .expect("chunked array");
    let err = broken.compute(&thread_pool()).unwrap_err();
    assert!(matches!(err, SkimError::Execution { ref task, .. } if task == "chunk (2)"));
}

#[test]
fn test_chunked_coordinate_gives_resolution() {
    let x = ChunkedArray::from_array(
        ArrayData::from(ArrayD::from_shape_fn(IxDyn(&[8]), |ix| 1000.0 + 30.0 * ix[0] as f64)),
        &[1],
    )
    .expect("chunked coordinate");
    let dataset = Dataset::builder()
        .data_var("band", &["x"], ArrayD::<u8>::zeros(IxDyn(&[8])))
        .coord("x", &["x"], x)
        .build()
        .expect("dataset");
    assert!(matches!(dataset.coord("x").map(|c| c.data()), Some(ArrayBackend::Chunked(_))));

    let profile = raster_skim::profile(&dataset).expect("profile");
    assert_eq!(profile.resolution.value(), Some(&30.0));
}
