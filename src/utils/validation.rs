use crate::utils::error::{ProductionError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn format_values(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

pub fn validate_positive(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ProductionError::invalid(
            field_name,
            value,
            "Value must be finite and strictly positive",
        ));
    }
    Ok(())
}

pub fn validate_length(field_name: &str, values: &[f64], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(ProductionError::invalid(
            field_name,
            format_values(values),
            format!("Expected {} entries, got {}", expected, values.len()),
        ));
    }
    Ok(())
}

pub fn validate_strictly_increasing(field_name: &str, values: &[f64]) -> Result<()> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(ProductionError::invalid(
            field_name,
            format_values(values),
            "Values must not be NaN",
        ));
    }

    if let Some(pos) = values.windows(2).position(|w| w[0] >= w[1]) {
        return Err(ProductionError::invalid(
            field_name,
            format_values(values),
            format!(
                "Values must be strictly increasing (entry {} >= entry {})",
                pos,
                pos + 1
            ),
        ));
    }
    Ok(())
}

/// Labor inputs: finite, non-negative, with a positive total.
pub fn validate_labor_input(field_name: &str, values: &[f64], expected: usize) -> Result<()> {
    validate_length(field_name, values, expected)?;

    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ProductionError::invalid(
            field_name,
            format_values(values),
            "Labor inputs must be finite and non-negative",
        ));
    }

    if values.iter().sum::<f64>() <= 0.0 {
        return Err(ProductionError::invalid(
            field_name,
            format_values(values),
            "Total labor input must be positive",
        ));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(ProductionError::invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ProductionError::invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("theta", 1.0).is_ok());
        assert!(validate_positive("theta", 0.0).is_err());
        assert!(validate_positive("theta", f64::NAN).is_err());
        assert!(validate_positive("theta", f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_strictly_increasing() {
        assert!(validate_strictly_increasing("alpha", &[0.1, 0.2, 0.3]).is_ok());
        assert!(validate_strictly_increasing("alpha", &[]).is_ok());
        assert!(validate_strictly_increasing("alpha", &[0.1, 0.1]).is_err());
        assert!(validate_strictly_increasing("alpha", &[0.3, 0.2]).is_err());
        assert!(validate_strictly_increasing("alpha", &[0.1, f64::NAN]).is_err());
    }

    #[test]
    fn test_validate_labor_input() {
        assert!(validate_labor_input("labor_input", &[0.5, 0.0, 0.2], 3).is_ok());
        assert!(validate_labor_input("labor_input", &[0.5, 0.2], 3).is_err());
        assert!(validate_labor_input("labor_input", &[0.5, -0.1, 0.2], 3).is_err());
        assert!(validate_labor_input("labor_input", &[0.0, 0.0], 2).is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("workers", 4, 1).is_ok());
        assert!(validate_positive_number("workers", 0, 1).is_err());
    }
}
