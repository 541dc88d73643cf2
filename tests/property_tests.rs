mod common;

use common::{assert_close, mean_std, thread_pool};
use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;
use raster_skim::{Dataset, Profiler, SpatialConfig};

/// Shape plus values, some of which may be missing
fn grid() -> impl Strategy<Value = (Vec<usize>, Vec<f64>)> {
    prop::collection::vec(1usize..5, 1..4).prop_flat_map(|shape| {
        let len: usize = shape.iter().product();
        let value = prop_oneof![
            4 => -1.0e3..1.0e3_f64,
            1 => Just(f64::NAN),
        ];
        (Just(shape), prop::collection::vec(value, len))
    })
}

fn dims(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("d{i}")).collect()
}

fn dataset(shape: &[usize], values: Vec<f64>) -> Dataset {
    let names = dims(shape.len());
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let data = ArrayD::from_shape_vec(IxDyn(shape), values).expect("shape matches");
    Dataset::builder()
        .data_var("v", &names, data)
        .build()
        .expect("dataset")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn has_missing_iff_any_value_is_nan((shape, values) in grid()) {
        let expected = values.iter().any(|v| v.is_nan());
        let profile = raster_skim::profile(&dataset(&shape, values)).unwrap();
        prop_assert_eq!(profile.rows[0].has_missing, expected);
    }

    #[test]
    fn statistics_match_flattened_values((shape, values) in grid()) {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let profile = raster_skim::profile(&dataset(&shape, values)).unwrap();
        let row = &profile.rows[0];

        if present.is_empty() {
            prop_assert!(row.mean.is_nan() && row.std.is_nan());
            prop_assert!(row.min.is_nan() && row.max.is_nan());
        } else {
            let (mean, std) = mean_std(&present);
            assert_close(row.mean, mean, 1e-6);
            assert_close(row.std, std, 1e-6);
            prop_assert_eq!(row.min, present.iter().copied().fold(f64::INFINITY, f64::min));
            prop_assert_eq!(row.max, present.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        }
    }

    #[test]
    fn chunked_copy_profiles_identically(
        (shape, values) in grid(),
        chunk in 1usize..4,
    ) {
        let eager = dataset(&shape, values);
        let lazy = eager.chunk(&[("d0", chunk)]).unwrap();
        let profiler = Profiler::with_scheduler(thread_pool(), SpatialConfig::default());

        let e = profiler.profile(&eager).unwrap();
        let l = profiler.profile(&lazy).unwrap();
        prop_assert_eq!(e.rows[0].has_missing, l.rows[0].has_missing);
        assert_close(l.rows[0].mean, e.rows[0].mean, 1e-9);
        assert_close(l.rows[0].std, e.rows[0].std, 1e-9);
        prop_assert_eq!(
            profiler.memory_profile(&eager).unwrap(),
            profiler.memory_profile(&lazy).unwrap()
        );
    }
}
