use proptest::prelude::*;
use task_production::core::demand;
use task_production::core::special::{regularized_incomplete_gamma, GammaKind};
use task_production::BlueprintParameters;

fn params_strategy() -> impl Strategy<Value = BlueprintParameters> {
    (0.5_f64..3.0, 0.3_f64..4.0, 0.5_f64..2.0, -0.2_f64..0.5, 0.05_f64..0.5).prop_map(
        |(theta, kappa, z, base, gap)| {
            BlueprintParameters::new(theta, kappa, z, vec![base, base + gap, base + 2.0 * gap]).unwrap()
        },
    )
}

fn sorted_thresholds(theta: f64, a: f64, b: f64) -> Vec<f64> {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    vec![lo * theta, (hi + 0.2) * theta]
}

proptest! {
    #[test]
    fn raising_a_threshold_moves_demand_between_neighbors(
        params in params_strategy(),
        a in 0.1_f64..3.0,
        b in 0.1_f64..3.0,
        delta in 0.01_f64..0.1,
    ) {
        let x = sorted_thresholds(params.theta, a, b);
        let base = demand::unit_input_demand(&params, &x).unwrap();

        let mut raised = x.clone();
        raised[0] += delta * (x[1] - x[0]);
        let moved = demand::unit_input_demand(&params, &raised).unwrap();

        prop_assert!(moved[0] > base[0]);
        prop_assert!(moved[1] < base[1]);
        prop_assert_eq!(moved[2], base[2]);
    }

    #[test]
    fn equal_adjacent_thresholds_give_exactly_zero(
        params in params_strategy(),
        a in 0.1_f64..3.0,
    ) {
        let x = params.theta * a;
        let d = demand::unit_input_demand(&params, &[x, x]).unwrap();
        prop_assert_eq!(d[1], 0.0);
        prop_assert!(d[0] > 0.0);
        prop_assert!(d[2] > 0.0);
    }

    #[test]
    fn equal_efficiencies_conserve_total_demand(
        theta in 0.5_f64..3.0,
        kappa in 0.3_f64..4.0,
        z in 0.5_f64..2.0,
        alpha in -0.2_f64..0.5,
        a in 0.1_f64..3.0,
        b in 0.1_f64..3.0,
    ) {
        // Repeated alpha is not a valid blueprint, so skip the checks.
        let params = BlueprintParameters::new_unchecked(theta, kappa, z, vec![alpha; 3]);
        let x = sorted_thresholds(theta, a, b);
        let total: f64 = demand::unit_input_demand(&params, &x).unwrap().iter().sum();
        let expected = (1.0 + alpha * theta).powf(-kappa) / z;
        prop_assert!((total - expected).abs() < 1e-10 * expected, "{} vs {}", total, expected);
    }

    #[test]
    fn regularized_gamma_is_a_probability(
        shape in 0.01_f64..50.0,
        x in 0.0_f64..100.0,
    ) {
        let p = regularized_incomplete_gamma(GammaKind::Lower, shape, x).unwrap();
        let q = regularized_incomplete_gamma(GammaKind::Upper, shape, x).unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert!((0.0..=1.0).contains(&q));
        prop_assert!((p + q - 1.0).abs() < 1e-12);
    }
}
