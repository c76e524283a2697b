use statrs::distribution::{Continuous, Gamma};
use task_production::{
    find_initial_guess, find_initial_guess_gen, marg_prod_labor, marg_prod_labor_general, prod_fun,
    prod_fun_general, unit_input_demand, unit_input_demand_general, BlueprintParameters, GeneralModel,
    GuessOptions, SolverOptions,
};

const THETA: f64 = 1.5;
const KAPPA: f64 = 2.0;
const Z: f64 = 0.9;
const ALPHA: [f64; 3] = [0.0, 0.3, 0.7];

fn blueprint() -> BlueprintParameters {
    BlueprintParameters::new(THETA, KAPPA, Z, ALPHA.to_vec()).unwrap()
}

/// The blueprint rebuilt from a reference gamma density and closures.
fn general() -> GeneralModel {
    let gamma = Gamma::new(KAPPA, 1.0 / THETA).unwrap();
    ALPHA
        .iter()
        .fold(
            GeneralModel::builder(Z, move |x: f64| gamma.pdf(x)).support(0.0, f64::INFINITY),
            |builder, &a| builder.efficiency(move |x: f64| (a * x).exp()),
        )
        .build()
        .unwrap()
}

#[test]
fn test_demand_matches_closed_form() {
    let thresholds = [1.2, 3.4];
    let closed = unit_input_demand(&thresholds, &blueprint()).unwrap();
    let numeric = unit_input_demand_general(&thresholds, &general()).unwrap();
    for (a, b) in closed.iter().zip(&numeric) {
        assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
    }
}

#[test]
fn test_solution_and_mpl_match_closed_form() {
    let labor = [0.7, 0.4, 0.2];
    let options = SolverOptions::default();

    let closed = prod_fun(&labor, &blueprint(), &options).unwrap();
    let model = general();
    let numeric = prod_fun_general(&labor, &model, &options).unwrap();

    assert!(closed.converged && numeric.converged);
    assert!((closed.q - numeric.q).abs() < 1e-6);
    for (a, b) in closed.thresholds.iter().zip(&numeric.thresholds) {
        assert!((a - b).abs() < 1e-6);
    }

    let mpl_closed = marg_prod_labor(&labor, &blueprint(), Some(&closed), &options).unwrap();
    let mpl_numeric = marg_prod_labor_general(&labor, &model, numeric.q, &numeric.thresholds).unwrap();
    for (a, b) in mpl_closed.iter().zip(&mpl_numeric) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_initial_guesses_agree() {
    let labor = [0.7, 0.4, 0.2];
    let options = GuessOptions::default();
    let closed = find_initial_guess(&labor, &blueprint(), &options).unwrap();
    let numeric = find_initial_guess_gen(&labor, &general(), &options).unwrap();
    assert!(closed.satisfied && numeric.satisfied);
    assert_eq!(closed.thresholds.len(), numeric.thresholds.len());
    assert!((closed.log_q - numeric.log_q).abs() < 1e-3);
}

#[test]
fn test_bounded_support_model() {
    // Uniform tasks on [0, 1], efficiencies 1 and 1 + 2x, z = 1.
    let model = GeneralModel::builder(1.0, |x: f64| if (0.0..=1.0).contains(&x) { 1.0 } else { 0.0 })
        .support(0.0, 1.0)
        .efficiency(|_: f64| 1.0)
        .efficiency(|x: f64| 1.0 + 2.0 * x)
        .build()
        .unwrap();

    // d_0 = t, d_1 = ln(3 / (1 + 2t)) / 2 at threshold t = 0.4.
    let t: f64 = 0.4;
    let q = 2.0;
    let labor = [q * t, q * (3.0 / (1.0 + 2.0 * t)).ln() / 2.0];

    let solution = prod_fun_general(&labor, &model, &SolverOptions::default()).unwrap();
    assert!(solution.converged);
    assert!((solution.q - q).abs() < 1e-6);
    assert!((solution.thresholds[0] - t).abs() < 1e-6);
}
