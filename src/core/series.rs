//! Values that hold for a year and step by a fixed annual rate at each
//! year boundary (rent, home value, tenant income).

use super::error::{SimulationError, SimulationResult};

pub const MONTHS_PER_YEAR: u32 = 12;

/// Converts an annual compound rate to the equivalent monthly rate.
pub fn monthly_rate(annual_rate: f64) -> SimulationResult<f64> {
    if !annual_rate.is_finite() || annual_rate <= -1.0 {
        return Err(SimulationError::invalid(
            "annual_rate",
            format!("must be finite and > -1, got {annual_rate}"),
        ));
    }
    Ok((1.0 + annual_rate).powf(1.0 / MONTHS_PER_YEAR as f64) - 1.0)
}

pub fn value_at_year(initial_value: f64, annual_rate: f64, year: i32) -> SimulationResult<f64> {
    if year < 0 {
        return Err(SimulationError::invalid(
            "year",
            format!("must be >= 0, got {year}"),
        ));
    }
    Ok(escalate(initial_value, annual_rate, year as u32))
}

pub fn value_at_month(initial_value: f64, annual_rate: f64, month: u32) -> f64 {
    escalate(initial_value, annual_rate, month / MONTHS_PER_YEAR)
}

pub fn generate(initial_value: f64, annual_rate: f64, length_months: u32) -> Vec<f64> {
    (0..length_months)
        .map(|month| value_at_month(initial_value, annual_rate, month))
        .collect()
}

// Both the full series and the single-year lookup go through here so the
// simulator and the point-in-time path see bit-identical values.
fn escalate(initial_value: f64, annual_rate: f64, years: u32) -> f64 {
    initial_value * (1.0 + annual_rate).powi(years as i32)
}
