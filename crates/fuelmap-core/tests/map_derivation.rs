//! Tests for open-loop and closed-loop map derivation

use fuelmap_core::prelude::*;
use pretty_assertions::assert_eq;

fn load_axis() -> AxisSeries {
    AxisSeries::new("load", vec![-0.6, -0.3, 0.0, 0.5, 1.0, 1.5]).unwrap()
}

fn speed_axis() -> AxisSeries {
    AxisSeries::new(
        "rpm",
        vec![1000.0, 2000.0, 3000.0, 4000.0, 5000.0, 6000.0, 7000.0],
    )
    .unwrap()
}

fn ve_value(li: usize, si: usize) -> f64 {
    let (l, s) = (li as f64, si as f64);
    0.55 + 0.05 * l + 0.06 * s - 0.007 * s * s
}

fn ve_grid() -> EfficiencyGrid {
    let values = (0..6)
        .map(|li| (0..7).map(|si| ve_value(li, si)).collect())
        .collect();
    EfficiencyGrid::from_values(load_axis(), speed_axis(), values).unwrap()
}

fn request() -> CalculationRequest {
    let mut request = CalculationRequest::new(
        FuelType::Gasoline,
        2000.0,
        4,
        InjectorSpec::from_lb_per_hour(42.0),
        load_axis(),
        speed_axis(),
    );
    request.compensations = vec![
        CompensationCurve::warmup(vec![(-20.0, 1.5), (20.0, 1.2), (80.0, 1.0)]).unwrap(),
        CompensationCurve::air_temp_correction(vec![(0.0, 1.04), (50.0, 0.96)]).unwrap(),
    ];
    request.conditions.coolant_temp_c = 60.0;
    request.global_scale = 1.1;
    request
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_close(a: f64, b: f64, rel: f64) {
    let scale = a.abs().max(b.abs()).max(1e-12);
    assert!((a - b).abs() / scale < rel, "{a} vs {b}");
}

#[test]
fn test_default_reference_speed_is_axis_median() {
    init_tracing();
    let engine = MapDerivationEngine::default();
    let result = engine.derive(&request(), &ve_grid(), None).unwrap();
    assert_eq!(result.curve.reference_speed, 4000.0);
    assert_eq!(result.mode, DerivationMode::OpenLoop);
}

#[test]
fn test_open_loop_scales_curve_by_efficiency_ratio() {
    let engine = MapDerivationEngine::default();
    let request = request();
    let result = engine.derive(&request, &ve_grid(), None).unwrap();

    // 4000 rpm is speed index 3
    for li in 0..6 {
        for si in 0..7 {
            let expected =
                result.curve.values[li] * ve_value(li, si) / ve_value(li, 3) * request.global_scale;
            assert_close(result.table[li][si], expected, 1e-12);
        }
    }
}

#[test]
fn test_global_scale_only_touches_table() {
    let engine = MapDerivationEngine::default();
    let mut one = request();
    one.global_scale = 1.0;
    let mut two = request();
    two.global_scale = 2.0;

    let a = engine.derive(&one, &ve_grid(), None).unwrap();
    let b = engine.derive(&two, &ve_grid(), None).unwrap();

    assert_eq!(a.curve, b.curve);
    for (row_a, row_b) in a.table.iter().zip(&b.table) {
        for (x, y) in row_a.iter().zip(row_b) {
            assert_close(*y, x * 2.0, 1e-12);
        }
    }
}

#[test]
fn test_open_and_closed_loop_agree_without_speed_shaping() {
    let engine = MapDerivationEngine::default();
    let mut open = request();
    open.lambda.user_speed_factor = Some(Curve::constant(1.0));
    let mut closed = open.clone();
    closed.mode = DerivationMode::ClosedLoop;

    let a = engine.derive(&open, &ve_grid(), None).unwrap();
    let b = engine.derive(&closed, &ve_grid(), None).unwrap();

    assert_eq!(b.mode, DerivationMode::ClosedLoop);
    assert_eq!(a.valid, b.valid);
    for (x, y) in a.curve.values.iter().zip(&b.curve.values) {
        assert_close(*x, *y, 1e-6);
    }
    for (row_a, row_b) in a.table.iter().zip(&b.table) {
        for (x, y) in row_a.iter().zip(row_b) {
            assert_close(*x, *y, 1e-6);
        }
    }
}

#[test]
fn test_closed_loop_follows_speed_shape() {
    let engine = MapDerivationEngine::default();
    let open = request();
    let mut closed = request();
    closed.mode = DerivationMode::ClosedLoop;
    closed.lambda.speed_shape =
        Some(Curve::new("shape", vec![(1000.0, 1.0), (7000.0, 0.9)]).unwrap());

    let a = engine.derive(&open, &ve_grid(), None).unwrap();
    let b = engine.derive(&closed, &ve_grid(), None).unwrap();

    assert_eq!(b.lambda_clipped, 0);
    for li in 0..6 {
        // Unchanged at 1000 rpm, 10% richer target at 7000 rpm
        assert_close(b.table[li][0], a.table[li][0], 1e-9);
        assert_close(b.table[li][6], a.table[li][6] / 0.9, 1e-9);
    }
}

#[test]
fn test_closed_loop_uses_supplied_surface() {
    let engine = MapDerivationEngine::default();

    let coarse_load = AxisSeries::new("load", vec![-1.0, 2.0]).unwrap();
    let coarse_rpm = AxisSeries::new("rpm", vec![500.0, 8000.0]).unwrap();
    let surface =
        LambdaTargetSurface::new(coarse_load, coarse_rpm, vec![vec![0.9, 0.9], vec![0.9, 0.9]])
            .unwrap();

    let mut supplied = request();
    supplied.mode = DerivationMode::ClosedLoop;
    let mut manual = supplied.clone();
    manual.lambda.strategy = LambdaStrategy::Manual(Curve::constant(0.9));

    let a = engine.derive(&supplied, &ve_grid(), Some(&surface)).unwrap();
    let b = engine.derive(&manual, &ve_grid(), None).unwrap();

    for (row_a, row_b) in a.table.iter().zip(&b.table) {
        for (x, y) in row_a.iter().zip(row_b) {
            assert_close(*x, *y, 1e-12);
        }
    }
    for (x, y) in a.curve.values.iter().zip(&b.curve.values) {
        assert_close(*x, *y, 1e-12);
    }
}

#[test]
fn test_supplied_surface_is_clipped() {
    let engine = MapDerivationEngine::default();
    let surface = LambdaTargetSurface::new(
        load_axis(),
        speed_axis(),
        vec![vec![0.1; 7]; 6],
    )
    .unwrap();

    let mut clipped = request();
    clipped.mode = DerivationMode::ClosedLoop;
    let mut floor = clipped.clone();
    floor.lambda.strategy = LambdaStrategy::Manual(Curve::constant(0.6));

    let a = engine.derive(&clipped, &ve_grid(), Some(&surface)).unwrap();
    let b = engine.derive(&floor, &ve_grid(), None).unwrap();

    assert_eq!(a.lambda_clipped, 42);
    assert_eq!(a.table, b.table);
}

#[test]
fn test_derivation_is_idempotent() {
    let engine = MapDerivationEngine::default();
    for mode in [DerivationMode::OpenLoop, DerivationMode::ClosedLoop] {
        let mut request = request();
        request.mode = mode;
        request.lambda.speed_shape =
            Some(Curve::new("shape", vec![(1000.0, 1.02), (7000.0, 0.92)]).unwrap());

        let first = engine.derive(&request, &ve_grid(), None).unwrap();
        let second = engine.derive(&request, &ve_grid(), None).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_reference_speed_is_a_parameter() {
    let engine = MapDerivationEngine::default();
    let mut low = request();
    low.reference_speed = Some(2000.0);
    let mut high = request();
    high.reference_speed = Some(6000.0);

    let a = engine.derive(&low, &ve_grid(), None).unwrap();
    let b = engine.derive(&high, &ve_grid(), None).unwrap();

    assert_eq!(a.curve.reference_speed, 2000.0);
    assert_eq!(b.curve.reference_speed, 6000.0);
    // VE differs between 2000 and 6000 rpm, so the curves differ
    assert!(a.curve.values.iter().zip(&b.curve.values).all(|(x, y)| x != y));
}

#[test]
fn test_fixed_regulator_saturates_high_load_rows() {
    init_tracing();
    let engine = MapDerivationEngine::default();
    for mode in [DerivationMode::OpenLoop, DerivationMode::ClosedLoop] {
        let mut request = request();
        request.mode = mode;
        request.min_time_ms = 0.3;
        request.injector = InjectorSpec::from_lb_per_hour(42.0).with_regulation(RegulationMode::Fixed, 1.0);

        let result = engine.derive(&request, &ve_grid(), None).unwrap();

        // Loads 1.0 and 1.5 leave no differential
        assert_eq!(result.saturated_cells(), 2 * 7);
        assert_eq!(result.curve.valid, vec![true, true, true, true, false, false]);
        for li in 4..6 {
            assert!(result.valid[li].iter().all(|v| !v));
            assert!(result.table[li].iter().all(|&t| t == 0.3));
            assert_eq!(result.curve.values[li], 0.3);
        }
        assert!(result.valid[3].iter().all(|v| *v));
        assert!(result.table[3].iter().all(|&t| t > 0.3));
    }
}

#[test]
fn test_min_time_applies_after_global_scale() {
    let engine = MapDerivationEngine::default();
    let mut request = request();
    request.global_scale = 0.001;
    request.min_time_ms = 1.0;

    let result = engine.derive(&request, &ve_grid(), None).unwrap();
    assert!(result.table.iter().flatten().all(|&t| t == 1.0));
    assert!(result.curve.values.iter().all(|&t| t >= 1.0));
}

#[test]
fn test_zero_reference_efficiency_falls_back_to_direct_cells() {
    let values: Vec<Vec<f64>> = (0..6)
        .map(|li| {
            (0..7)
                .map(|si| if si == 3 { 0.0 } else { ve_value(li, si) })
                .collect()
        })
        .collect();
    let grid = EfficiencyGrid::from_values(load_axis(), speed_axis(), values).unwrap();
    let engine = MapDerivationEngine::default();

    let open = request();
    let mut closed = request();
    closed.mode = DerivationMode::ClosedLoop;

    let a = engine.derive(&open, &grid, None).unwrap();
    let b = engine.derive(&closed, &grid, None).unwrap();

    assert!(a.table.iter().flatten().all(|t| t.is_finite()));
    for (row_a, row_b) in a.table.iter().zip(&b.table) {
        for (x, y) in row_a.iter().zip(row_b) {
            assert_close(*x, *y, 1e-9);
        }
    }
}

#[test]
fn test_efficiency_grid_on_other_axes_is_resampled() {
    // VE linear in load and rpm is reproduced exactly by bilinear resampling
    let linear = |load: f64, rpm: f64| 0.7 + 0.1 * load + 0.00002 * rpm;

    let coarse_load = AxisSeries::new("load", vec![-1.0, 2.0]).unwrap();
    let coarse_rpm = AxisSeries::new("rpm", vec![0.0, 8000.0]).unwrap();
    let coarse_values = coarse_load
        .values()
        .iter()
        .map(|&l| coarse_rpm.values().iter().map(|&s| linear(l, s)).collect())
        .collect();
    let coarse = EfficiencyGrid::from_values(coarse_load, coarse_rpm, coarse_values).unwrap();

    let native_values = load_axis()
        .values()
        .iter()
        .map(|&l| speed_axis().values().iter().map(|&s| linear(l, s)).collect())
        .collect();
    let native = EfficiencyGrid::from_values(load_axis(), speed_axis(), native_values).unwrap();

    let engine = MapDerivationEngine::default();
    let a = engine.derive(&request(), &coarse, None).unwrap();
    let b = engine.derive(&request(), &native, None).unwrap();

    for (row_a, row_b) in a.table.iter().zip(&b.table) {
        for (x, y) in row_a.iter().zip(row_b) {
            assert_close(*x, *y, 1e-9);
        }
    }
}

#[test]
fn test_derive_curve_matches_open_loop_curve() {
    let engine = MapDerivationEngine::default();
    let request = request();
    let curve = engine.derive_curve(&request, &ve_grid()).unwrap();
    let result = engine.derive(&request, &ve_grid(), None).unwrap();
    assert_eq!(curve, result.curve);
}

#[test]
fn test_invalid_request_is_rejected() {
    let engine = MapDerivationEngine::default();

    let mut bad = request();
    bad.stoich_ratio = 0.0;
    assert!(matches!(
        engine.derive(&bad, &ve_grid(), None),
        Err(CalcError::InvalidParameter { .. })
    ));

    let mut bad = request();
    bad.cylinders = 0;
    assert!(engine.derive(&bad, &ve_grid(), None).is_err());

    let mut bad = request();
    bad.global_scale = f64::NAN;
    assert!(engine.derive(&bad, &ve_grid(), None).is_err());
}

#[test]
fn test_grid_shape_mismatch_is_rejected() {
    let err = EfficiencyGrid::from_values(load_axis(), speed_axis(), vec![vec![0.9; 7]; 5])
        .unwrap_err();
    assert!(matches!(err, CalcError::ShapeMismatch { .. }));
}

#[test]
fn test_missing_efficiency_entries_take_default() {
    let config = EngineConfig {
        default_efficiency: 0.75,
        ..EngineConfig::default()
    };
    let load = AxisSeries::new("load", vec![0.0, 1.0]).unwrap();
    let rpm = AxisSeries::new("rpm", vec![1000.0, 2000.0]).unwrap();
    let grid = config
        .efficiency_grid(load, rpm, vec![vec![Some(0.9), None], vec![Some(f64::NAN), Some(1.0)]])
        .unwrap();

    assert_eq!(grid.missing_count(), 2);
    assert_eq!(grid.get(0, 1), 0.75);
    assert_eq!(grid.get(1, 0), 0.75);
    assert_eq!(grid.get(1, 1), 1.0);
}

#[test]
fn test_request_from_json() {
    let json = r#"{
        "stoich_ratio": 9.0,
        "displacement_cc": 1900.0,
        "cylinders": 4,
        "injector": { "nominal_flow_mg_per_ms": 14.112 },
        "conditions": { "intake_air_temp_c": 40.0 },
        "mode": "closed_loop",
        "reference_speed": 3000.0,
        "load_axis": [-0.5, 0.0, 1.0],
        "speed_axis": [1000.0, 3000.0, 6000.0],
        "lambda": { "strategy": "economy", "user_speed_factor": [[1000.0, 1.0], [6000.0, 0.95]] }
    }"#;

    let request = CalculationRequest::from_json(json).unwrap();
    assert_eq!(request.mode, DerivationMode::ClosedLoop);
    assert_eq!(request.injector.reference_differential, 3.0);
    assert_eq!(request.injector.regulation, RegulationMode::Referenced);
    assert_eq!(request.global_scale, 1.0);
    assert_eq!(request.conditions.coolant_temp_c, 85.0);
    assert_eq!(request.lambda.strategy, LambdaStrategy::Economy);
    assert_eq!(request.effective_reference_speed(), 3000.0);

    let grid = EfficiencyGrid::uniform(request.load_axis.clone(), request.speed_axis.clone(), 0.9)
        .unwrap();
    let result = MapDerivationEngine::default()
        .derive(&request, &grid, None)
        .unwrap();
    assert_eq!(result.table.len(), 3);
    assert_eq!(result.saturated_cells(), 0);
}

#[test]
fn test_request_json_with_bad_axis_is_rejected() {
    let json = r#"{
        "stoich_ratio": 14.7,
        "displacement_cc": 2000.0,
        "cylinders": 4,
        "injector": { "nominal_flow_mg_per_ms": 5.0 },
        "load_axis": [0.0, 0.0],
        "speed_axis": [1000.0, 3000.0]
    }"#;
    assert!(CalculationRequest::from_json(json).is_err());
}

fn square_request() -> (CalculationRequest, EfficiencyGrid) {
    let load = AxisSeries::new("load", vec![-0.5, 0.0, 0.5, 1.0]).unwrap();
    let rpm = AxisSeries::new("rpm", vec![1000.0, 3000.0, 5000.0, 7000.0]).unwrap();
    let shape = [0.5, 0.8, 0.9, 0.7];
    let values = (0..4)
        .map(|li| shape.iter().map(|ve| ve * (1.0 + 0.05 * li as f64)).collect())
        .collect();
    let grid = EfficiencyGrid::from_values(load.clone(), rpm.clone(), values).unwrap();
    let request = CalculationRequest::new(
        FuelType::Gasoline,
        2000.0,
        4,
        InjectorSpec::from_lb_per_hour(42.0),
        load,
        rpm,
    );
    (request, grid)
}

fn assert_modes_agree(open: &CalculationRequest, grid: &EfficiencyGrid) {
    let engine = MapDerivationEngine::default();
    let mut closed = open.clone();
    closed.mode = DerivationMode::ClosedLoop;

    let a = engine.derive(open, grid, None).unwrap();
    let b = engine.derive(&closed, grid, None).unwrap();

    assert_eq!(a.valid, b.valid);
    for (x, y) in a.curve.values.iter().zip(&b.curve.values) {
        assert_close(*x, *y, 1e-6);
    }
    for (row_a, row_b) in a.table.iter().zip(&b.table) {
        for (x, y) in row_a.iter().zip(row_b) {
            assert_close(*x, *y, 1e-6);
        }
    }
}

#[test]
fn test_dead_time_is_not_scaled_by_efficiency_ratio() {
    let (mut request, grid) = square_request();
    request.compensations =
        vec![CompensationCurve::dead_time(vec![(8.0, 1.5), (14.0, 1.0)]).unwrap()];
    request.global_scale = 1.05;
    assert_modes_agree(&request, &grid);

    // At the reference speed the table is the curve scaled, nothing else
    let engine = MapDerivationEngine::default();
    let result = engine.derive(&request, &grid, None).unwrap();
    let reference = result.curve.reference_speed;
    assert_eq!(reference, 4000.0);
    let dead_time = 1.5 - 0.5 * (13.8 - 8.0) / 6.0;
    for li in 0..4 {
        // 1000 rpm has VE 0.5 against 0.85 at the 4000 rpm midpoint
        let base = result.curve.values[li] - dead_time;
        let expected = (base * 0.5 / 0.85 + dead_time) * 1.05;
        assert_close(result.table[li][0], expected, 1e-9);
    }
}

#[test]
fn test_time_floor_matches_between_modes() {
    let (mut request, grid) = square_request();
    request.min_time_ms = 3.0;
    assert_modes_agree(&request, &grid);

    let result = MapDerivationEngine::default()
        .derive(&request, &grid, None)
        .unwrap();
    assert!(result.table.iter().flatten().any(|&t| t == 3.0));
    assert!(result.table.iter().flatten().any(|&t| t > 3.0));
}

#[test]
fn test_dead_time_and_floor_together_match_between_modes() {
    let (mut request, grid) = square_request();
    request.compensations = vec![
        CompensationCurve::warmup(vec![(-20.0, 1.5), (80.0, 1.0)]).unwrap(),
        CompensationCurve::dead_time(vec![(8.0, 1.5), (14.0, 1.0)]).unwrap(),
    ];
    request.conditions.coolant_temp_c = 30.0;
    request.min_time_ms = 4.0;
    request.global_scale = 0.9;
    assert_modes_agree(&request, &grid);
}

#[test]
fn test_open_loop_counts_clipped_lambda() {
    let load = AxisSeries::new("load", vec![0.0, 1.0]).unwrap();
    let rpm = AxisSeries::new("rpm", vec![1000.0, 4000.0]).unwrap();
    let grid = EfficiencyGrid::uniform(load.clone(), rpm.clone(), 0.9).unwrap();
    let mut open = CalculationRequest::new(
        FuelType::Gasoline,
        1600.0,
        4,
        InjectorSpec::from_lb_per_hour(42.0),
        load,
        rpm,
    );
    open.lambda.strategy = LambdaStrategy::Manual(Curve::constant(0.1));
    let mut closed = open.clone();
    closed.mode = DerivationMode::ClosedLoop;

    let engine = MapDerivationEngine::default();
    let a = engine.derive(&open, &grid, None).unwrap();
    let b = engine.derive(&closed, &grid, None).unwrap();

    assert_eq!(a.lambda_clipped, 4);
    assert_eq!(b.lambda_clipped, 4);
    assert_eq!(engine.derive(&request(), &ve_grid(), None).unwrap().lambda_clipped, 0);
}
