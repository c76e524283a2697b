//! Fully general task model: an arbitrary task density `b_g` and one
//! efficiency schedule `e_h` per worker type, integrated numerically.

use crate::domain::model::BlueprintParameters;
use crate::domain::ports::{TaskFunction, TaskModel};
use crate::numerics::{integrate, QuadratureOptions};
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::{validate_positive, Validate};
use std::fmt;
use std::sync::Arc;

const WINDOW_PROBES: usize = 9;

#[derive(Clone)]
pub struct GeneralModel {
    z: f64,
    density: Arc<dyn TaskFunction>,
    efficiencies: Vec<Arc<dyn TaskFunction>>,
    support: (f64, f64),
    window: (f64, f64),
    quadrature: QuadratureOptions,
}

impl fmt::Debug for GeneralModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneralModel")
            .field("z", &self.z)
            .field("types", &self.efficiencies.len())
            .field("support", &self.support)
            .field("window", &self.window)
            .field("quadrature", &self.quadrature)
            .finish()
    }
}

pub struct GeneralModelBuilder {
    z: f64,
    density: Arc<dyn TaskFunction>,
    efficiencies: Vec<Arc<dyn TaskFunction>>,
    support: (f64, f64),
    window: Option<(f64, f64)>,
    quadrature: QuadratureOptions,
    mass_tolerance: f64,
    skip_param_checks: bool,
}

impl GeneralModel {
    pub fn builder<D>(z: f64, density: D) -> GeneralModelBuilder
    where
        D: TaskFunction + 'static,
    {
        GeneralModelBuilder {
            z,
            density: Arc::new(density),
            efficiencies: Vec::new(),
            support: (f64::NEG_INFINITY, f64::INFINITY),
            window: None,
            quadrature: QuadratureOptions::default(),
            mass_tolerance: 1e-6,
            skip_param_checks: false,
        }
    }

    /// The general-form twin of a blueprint: gamma density with the
    /// blueprint's shape and scale, efficiencies `exp(alpha_h x)`.
    pub fn from_blueprint(params: &BlueprintParameters) -> Result<Self> {
        params.validate()?;
        let blueprint = params.clone();
        let window = params.task_window();
        let builder = GeneralModel::builder(params.z, move |x: f64| blueprint.task_density(x))
            .support(0.0, f64::INFINITY)
            .window(window.0, window.1);
        params
            .alpha
            .iter()
            .fold(builder, |b, &a| b.efficiency(move |x: f64| (a * x).exp()))
            .build()
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn quadrature(&self) -> &QuadratureOptions {
        &self.quadrature
    }

    /// `∫ b_g` over the support.
    pub fn density_mass(&self) -> Result<f64> {
        let density = Arc::clone(&self.density);
        Ok(integrate(move |x| density.evaluate(x), self.support.0, self.support.1, &self.quadrature)?.value)
    }

    fn moment_window(&self) -> Result<(f64, f64)> {
        let (lo, hi) = self.support;
        let mean = integrate(|x| x * self.density.evaluate(x), lo, hi, &self.quadrature)?.value;
        let second = integrate(|x| x * x * self.density.evaluate(x), lo, hi, &self.quadrature)?.value;
        let sd = (second - mean * mean).max(0.0).sqrt();
        let window = ((mean - 4.0 * sd).max(lo), (mean + 4.0 * sd).min(hi));
        if !(window.0 < window.1) || !window.0.is_finite() || !window.1.is_finite() {
            return Err(ProductionError::ConfigError {
                message: "Could not derive a finite task window from the density; set one explicitly"
                    .to_string(),
            });
        }
        Ok(window)
    }
}

impl GeneralModelBuilder {
    pub fn efficiency<E>(mut self, efficiency: E) -> Self
    where
        E: TaskFunction + 'static,
    {
        self.efficiencies.push(Arc::new(efficiency));
        self
    }

    pub fn support(mut self, lower: f64, upper: f64) -> Self {
        self.support = (lower, upper);
        self
    }

    /// Finite window for the initial-guess heuristic. Defaults to the
    /// support when finite, else mean ± 4 standard deviations.
    pub fn window(mut self, lower: f64, upper: f64) -> Self {
        self.window = Some((lower, upper));
        self
    }

    pub fn quadrature(mut self, options: QuadratureOptions) -> Self {
        self.quadrature = options;
        self
    }

    pub fn mass_tolerance(mut self, tolerance: f64) -> Self {
        self.mass_tolerance = tolerance;
        self
    }

    pub fn skip_param_checks(mut self, skip: bool) -> Self {
        self.skip_param_checks = skip;
        self
    }

    pub fn build(self) -> Result<GeneralModel> {
        let (lo, hi) = self.support;
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(ProductionError::invalid(
                "support",
                format!("({}, {})", lo, hi),
                "Support must be a non-empty interval",
            ));
        }

        let mut model = GeneralModel {
            z: self.z,
            density: self.density,
            efficiencies: self.efficiencies,
            support: self.support,
            window: self.window.unwrap_or(self.support),
            quadrature: self.quadrature,
        };

        if self.window.is_none() && !(lo.is_finite() && hi.is_finite()) {
            model.window = model.moment_window()?;
        }

        if !self.skip_param_checks {
            model.validate()?;
            let mass = model.density_mass()?;
            if (mass - 1.0).abs() > self.mass_tolerance {
                return Err(ProductionError::invalid(
                    "density",
                    mass,
                    format!("Task density must integrate to 1 (tolerance {})", self.mass_tolerance),
                ));
            }
        }

        Ok(model)
    }
}

impl Validate for GeneralModel {
    fn validate(&self) -> Result<()> {
        validate_positive("z", self.z)?;
        if self.efficiencies.is_empty() {
            return Err(ProductionError::invalid(
                "efficiencies",
                0,
                "At least one efficiency function is required",
            ));
        }

        let (wl, wh) = self.window;
        if !(wl.is_finite() && wh.is_finite() && wl < wh) {
            return Err(ProductionError::invalid(
                "window",
                format!("({}, {})", wl, wh),
                "Window must be a finite, non-empty interval",
            ));
        }

        for probe in 0..WINDOW_PROBES {
            let x = wl + (wh - wl) * (probe as f64 + 0.5) / WINDOW_PROBES as f64;
            for (h, e) in self.efficiencies.iter().enumerate() {
                let value = e.evaluate(x);
                if !(value.is_finite() && value > 0.0) {
                    return Err(ProductionError::invalid(
                        &format!("efficiencies[{}]", h),
                        value,
                        format!("Efficiency must be positive on the support (x = {})", x),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl TaskModel for GeneralModel {
    fn type_count(&self) -> usize {
        self.efficiencies.len()
    }

    fn support(&self) -> (f64, f64) {
        self.support
    }

    fn task_window(&self) -> (f64, f64) {
        self.window
    }

    fn interval_demand(&self, h: usize, lo: f64, hi: f64) -> Result<f64> {
        let quadrature = integrate(|x| self.labor_density(h, x), lo, hi, &self.quadrature)?;
        Ok(quadrature.value)
    }

    fn labor_density(&self, h: usize, x: f64) -> f64 {
        let density = self.density.evaluate(x);
        if density == 0.0 {
            return 0.0;
        }
        density / (self.z * self.efficiencies[h].evaluate(x))
    }

    fn efficiency_ratio(&self, h: usize, x: f64) -> f64 {
        self.efficiencies[h + 1].evaluate(x) / self.efficiencies[h].evaluate(x)
    }
}
