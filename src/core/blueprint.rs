use crate::core::special::gamma_interval_integral;
use crate::domain::model::BlueprintParameters;
use crate::domain::ports::TaskModel;
use crate::utils::error::{ProductionError, Result};
use crate::utils::validation::{validate_positive, validate_strictly_increasing, Validate};
use statrs::function::gamma::ln_gamma;

impl BlueprintParameters {
    /// Validated constructor.
    pub fn new(theta: f64, kappa: f64, z: f64, alpha: Vec<f64>) -> Result<Self> {
        let params = Self::new_unchecked(theta, kappa, z, alpha);
        params.validate()?;
        Ok(params)
    }

    /// Skips parameter checks; for repeated calls on parameters that were
    /// already validated.
    pub fn new_unchecked(theta: f64, kappa: f64, z: f64, alpha: Vec<f64>) -> Self {
        Self {
            theta,
            kappa,
            z,
            alpha,
        }
    }

    /// Gamma density of task complexity.
    pub fn task_density(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        if x == 0.0 {
            return match self.kappa {
                k if k < 1.0 => f64::INFINITY,
                k if k == 1.0 => 1.0 / self.theta,
                _ => 0.0,
            };
        }
        ((self.kappa - 1.0) * x.ln() - x / self.theta
            - ln_gamma(self.kappa)
            - self.kappa * self.theta.ln())
        .exp()
    }

    /// Decay rate, in units of `1/theta`, of type `h`'s labor density.
    fn scaled_rate(&self, h: usize) -> f64 {
        1.0 + self.alpha[h] * self.theta
    }
}

impl Validate for BlueprintParameters {
    fn validate(&self) -> Result<()> {
        validate_positive("theta", self.theta)?;
        validate_positive("kappa", self.kappa)?;
        validate_positive("z", self.z)?;

        if self.alpha.is_empty() {
            return Err(ProductionError::invalid("alpha", "[]", "At least one worker type is required"));
        }
        if self.alpha.iter().any(|a| !a.is_finite()) {
            return Err(ProductionError::invalid(
                "alpha",
                format!("{:?}", self.alpha),
                "Comparative advantage entries must be finite",
            ));
        }
        validate_strictly_increasing("alpha", &self.alpha)?;

        let top = self.alpha.len() - 1;
        if self.scaled_rate(top) <= 0.0 {
            return Err(ProductionError::invalid(
                "alpha",
                format!("{:?}", self.alpha),
                format!(
                    "1 + alpha[{}] * theta must be positive for the top type's demand to be finite",
                    top
                ),
            ));
        }
        Ok(())
    }
}

impl TaskModel for BlueprintParameters {
    fn type_count(&self) -> usize {
        self.alpha.len()
    }

    fn support(&self) -> (f64, f64) {
        (0.0, f64::INFINITY)
    }

    fn task_window(&self) -> (f64, f64) {
        (0.0, self.theta * (self.kappa + 4.0 * self.kappa.sqrt()))
    }

    fn interval_demand(&self, h: usize, lo: f64, hi: f64) -> Result<f64> {
        let mass = gamma_interval_integral(self.kappa, self.scaled_rate(h), lo / self.theta, hi / self.theta)?;
        Ok(mass / self.z)
    }

    fn labor_density(&self, h: usize, x: f64) -> f64 {
        self.task_density(x) * (-self.alpha[h] * x).exp() / self.z
    }

    fn efficiency_ratio(&self, h: usize, x: f64) -> f64 {
        ((self.alpha[h + 1] - self.alpha[h]) * x).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BlueprintParameters {
        BlueprintParameters::new(1.0, 0.5, 1.2, vec![0.1, 0.2, 0.3]).unwrap()
    }

    #[test]
    fn test_constructor_rejects_bad_parameters() {
        assert!(BlueprintParameters::new(0.0, 0.5, 1.2, vec![0.1]).is_err());
        assert!(BlueprintParameters::new(1.0, -0.5, 1.2, vec![0.1]).is_err());
        assert!(BlueprintParameters::new(1.0, 0.5, 0.0, vec![0.1]).is_err());
        assert!(BlueprintParameters::new(1.0, 0.5, 1.2, vec![]).is_err());
        assert!(BlueprintParameters::new(1.0, 0.5, 1.2, vec![0.3, 0.2]).is_err());
        // Top type's demand diverges.
        assert!(BlueprintParameters::new(1.0, 0.5, 1.2, vec![-3.0, -1.5]).is_err());
        // Lower types may have negative rates; their intervals are finite.
        assert!(BlueprintParameters::new(1.0, 0.5, 1.2, vec![-3.0, 0.0]).is_ok());
    }

    #[test]
    fn test_unchecked_constructor_skips_validation() {
        let p = BlueprintParameters::new_unchecked(1.0, 0.5, 1.2, vec![0.3, 0.2]);
        assert!(p.validate().is_err());
        assert_eq!(p.type_count(), 2);
    }

    #[test]
    fn test_full_support_demand_closed_form() {
        // ∫ b_g e^{-αx} / z = (1 + αθ)^{-κ} / z
        let p = params();
        let d = p.interval_demand(1, 0.0, f64::INFINITY).unwrap();
        let expected = (1.0_f64 + 0.2).powf(-0.5) / 1.2;
        assert!((d - expected).abs() < 1e-14);
    }

    #[test]
    fn test_task_density_integrates_to_one() {
        let p = BlueprintParameters::new(2.0, 3.0, 1.0, vec![0.0]).unwrap();
        let q = crate::numerics::integrate(
            |x| p.task_density(x),
            0.0,
            f64::INFINITY,
            &Default::default(),
        )
        .unwrap();
        assert!((q.value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_ratio() {
        let p = params();
        let r = p.efficiency_ratio(0, 2.0);
        assert!((r - (0.1_f64 * 2.0).exp()).abs() < 1e-15);
    }
}
