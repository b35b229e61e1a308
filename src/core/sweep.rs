//! Exhaustive sweep of the buying advantage over the Cartesian product of
//! one or more parameter ranges.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{SimulationError, SimulationResult};
use super::point_in_time::buying_advantage;
use super::series::MONTHS_PER_YEAR;
use super::types::{ModelOptions, SimulationParameters};

// Tolerance on the element count so a stop value reached only through
// floating-point drift (0.03 + 4 * 0.01) stays excluded.
const RANGE_COUNT_EPSILON: f64 = 1e-9;
const MAX_AXIS_LENGTH: f64 = 1_000_000.0;
const MAX_GRID_CELLS: usize = 1_000_000;
const INTEGRAL_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterName {
    TargetYear,
    InitialRent,
    HomePrice,
    DownPaymentFraction,
    LoanTermYears,
    AnnualLoanRate,
    AnnualPropertyTaxRate,
    AnnualStockReturn,
    AnnualHomeAppreciation,
    AnnualUpkeepRate,
    InitialTenantIncome,
    CapitalGainsTaxRate,
    RealtorFeeRate,
}

impl ParameterName {
    pub const ALL: [ParameterName; 13] = [
        ParameterName::TargetYear,
        ParameterName::InitialRent,
        ParameterName::HomePrice,
        ParameterName::DownPaymentFraction,
        ParameterName::LoanTermYears,
        ParameterName::AnnualLoanRate,
        ParameterName::AnnualPropertyTaxRate,
        ParameterName::AnnualStockReturn,
        ParameterName::AnnualHomeAppreciation,
        ParameterName::AnnualUpkeepRate,
        ParameterName::InitialTenantIncome,
        ParameterName::CapitalGainsTaxRate,
        ParameterName::RealtorFeeRate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterName::TargetYear => "target_year",
            ParameterName::InitialRent => "initial_rent",
            ParameterName::HomePrice => "home_price",
            ParameterName::DownPaymentFraction => "down_payment_fraction",
            ParameterName::LoanTermYears => "loan_term_years",
            ParameterName::AnnualLoanRate => "annual_loan_rate",
            ParameterName::AnnualPropertyTaxRate => "annual_property_tax_rate",
            ParameterName::AnnualStockReturn => "annual_stock_return",
            ParameterName::AnnualHomeAppreciation => "annual_home_appreciation",
            ParameterName::AnnualUpkeepRate => "annual_upkeep_rate",
            ParameterName::InitialTenantIncome => "initial_tenant_income",
            ParameterName::CapitalGainsTaxRate => "capital_gains_tax_rate",
            ParameterName::RealtorFeeRate => "realtor_fee_rate",
        }
    }

    /// Liquidation rates fall back to their defaults when left out.
    pub fn is_required(self) -> bool {
        !matches!(
            self,
            ParameterName::CapitalGainsTaxRate | ParameterName::RealtorFeeRate
        )
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown parameter `{s}`"))
    }
}

/// Half-open `[start, stop)` range advanced by `step`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    /// Axis values in ascending order.
    pub fn values(&self, name: ParameterName) -> SimulationResult<Vec<f64>> {
        let Self { start, stop, step } = *self;
        if !start.is_finite() || !stop.is_finite() || !step.is_finite() {
            return Err(SimulationError::invalid(
                "sweep_range",
                format!("{name} range must be finite, got ({start}, {stop}, {step})"),
            ));
        }
        if step == 0.0 {
            return Err(SimulationError::invalid(
                "sweep_range",
                format!("{name} step must be non-zero"),
            ));
        }

        let raw_count = ((stop - start) / step - RANGE_COUNT_EPSILON).ceil();
        if raw_count <= 0.0 {
            return Err(SimulationError::EmptyRange {
                name,
                start,
                stop,
                step,
            });
        }
        if raw_count > MAX_AXIS_LENGTH {
            return Err(SimulationError::invalid(
                "sweep_range",
                format!("{name} range has {raw_count} values, more than {MAX_AXIS_LENGTH}"),
            ));
        }

        let mut values: Vec<f64> = (0..raw_count as usize)
            .map(|i| start + i as f64 * step)
            .collect();
        if step < 0.0 {
            values.reverse();
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridAxis {
    pub name: ParameterName,
    pub values: Vec<f64>,
}

impl GridAxis {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the axis value nearest to `value`.
    pub fn position_of(&self, value: f64) -> usize {
        let upper = self.values.partition_point(|v| *v < value);
        if upper == 0 {
            return 0;
        }
        if upper >= self.values.len() {
            return self.values.len() - 1;
        }
        if (self.values[upper] - value).abs() < (value - self.values[upper - 1]).abs() {
            upper
        } else {
            upper - 1
        }
    }
}

/// Dense row-major array of buying advantages, one cell per combination of
/// swept values. The last declared axis varies fastest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSearchResult {
    axes: Vec<GridAxis>,
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl GridSearchResult {
    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    pub fn axis(&self, name: ParameterName) -> Option<&GridAxis> {
        self.axes.iter().find(|axis| axis.name == name)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, indices: &[usize]) -> Option<f64> {
        self.flat_index(indices).map(|idx| self.values[idx])
    }

    /// Cell for the combination nearest to `coordinates`, one per axis.
    pub fn value_at(&self, coordinates: &[f64]) -> Option<f64> {
        if coordinates.len() != self.axes.len() {
            return None;
        }
        let indices: Vec<usize> = self
            .axes
            .iter()
            .zip(coordinates)
            .map(|(axis, &value)| axis.position_of(value))
            .collect();
        self.get(&indices)
    }

    fn flat_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&idx, &len) in indices.iter().zip(&self.shape) {
            if idx >= len {
                return None;
            }
            flat = flat * len + idx;
        }
        Some(flat)
    }
}

#[derive(Debug, Clone)]
struct GridCell {
    coordinates: Vec<f64>,
    params: SimulationParameters,
    target_year: i32,
}

pub fn grid_search(
    fixed: &[(ParameterName, f64)],
    swept: &[(ParameterName, SweepRange)],
) -> SimulationResult<GridSearchResult> {
    grid_search_with_options(ModelOptions::default(), fixed, swept)
}

/// Evaluates the buying advantage for every combination of swept values.
///
/// Each parameter is either fixed or swept, never both; every required
/// parameter must appear. All configuration errors surface before any cell
/// is evaluated.
pub fn grid_search_with_options(
    options: ModelOptions,
    fixed: &[(ParameterName, f64)],
    swept: &[(ParameterName, SweepRange)],
) -> SimulationResult<GridSearchResult> {
    validate_assignment(fixed, swept)?;

    let axes = swept
        .iter()
        .map(|&(name, range)| {
            Ok(GridAxis {
                name,
                values: range.values(name)?,
            })
        })
        .collect::<SimulationResult<Vec<_>>>()?;
    let shape: Vec<usize> = axes.iter().map(GridAxis::len).collect();
    let total = cell_count(&shape)?;

    let mut base = SimulationParameters {
        options,
        ..SimulationParameters::default()
    };
    let mut base_year = 0;
    for &(name, value) in fixed {
        assign(&mut base, &mut base_year, name, value)?;
    }

    let cells = build_cells(&axes, total, &base, base_year)?;
    tracing::info!(
        cells = cells.len(),
        axes = axes.len(),
        "evaluating buying advantage grid"
    );

    #[cfg(feature = "parallel")]
    let outcomes: Vec<f64> = cells
        .par_iter()
        .map(|cell| buying_advantage(&cell.params, cell.target_year))
        .collect::<SimulationResult<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<f64> = cells
        .iter()
        .map(|cell| buying_advantage(&cell.params, cell.target_year))
        .collect::<SimulationResult<_>>()?;

    let mut result = GridSearchResult {
        axes,
        shape,
        values: vec![0.0; cells.len()],
    };
    for (cell, outcome) in cells.iter().zip(outcomes) {
        let indices: Vec<usize> = result
            .axes
            .iter()
            .zip(&cell.coordinates)
            .map(|(axis, &value)| axis.position_of(value))
            .collect();
        if let Some(slot) = result.flat_index(&indices) {
            result.values[slot] = outcome;
        }
    }
    Ok(result)
}

fn validate_assignment(
    fixed: &[(ParameterName, f64)],
    swept: &[(ParameterName, SweepRange)],
) -> SimulationResult<()> {
    let occurrences = |name: ParameterName| {
        fixed.iter().filter(|(n, _)| *n == name).count()
            + swept.iter().filter(|(n, _)| *n == name).count()
    };
    // Conflicts are reported ahead of omissions.
    if let Some(name) = ParameterName::ALL.into_iter().find(|&n| occurrences(n) > 1) {
        return Err(SimulationError::ParameterConflict(name));
    }
    if let Some(name) = ParameterName::ALL
        .into_iter()
        .find(|&n| n.is_required() && occurrences(n) == 0)
    {
        return Err(SimulationError::MissingParameter(name));
    }
    Ok(())
}

fn cell_count(shape: &[usize]) -> SimulationResult<usize> {
    let total = shape
        .iter()
        .try_fold(1usize, |acc, &len| acc.checked_mul(len))
        .ok_or_else(|| {
            SimulationError::invalid("grid", format!("cell count for shape {shape:?} overflows"))
        })?;
    if total > MAX_GRID_CELLS {
        return Err(SimulationError::invalid(
            "grid",
            format!("{total} cells exceeds the limit of {MAX_GRID_CELLS}"),
        ));
    }
    Ok(total)
}

/// Every combination in row-major order, each fully validated.
fn build_cells(
    axes: &[GridAxis],
    total: usize,
    base: &SimulationParameters,
    base_year: i32,
) -> SimulationResult<Vec<GridCell>> {
    let mut cells = Vec::with_capacity(total);
    let mut indices = vec![0usize; axes.len()];

    for _ in 0..total {
        let mut params = base.clone();
        let mut target_year = base_year;
        let mut coordinates = Vec::with_capacity(axes.len());
        for (axis, &idx) in axes.iter().zip(&indices) {
            let value = axis.values[idx];
            assign(&mut params, &mut target_year, axis.name, value)?;
            coordinates.push(value);
        }
        params.validate()?;
        cells.push(GridCell {
            coordinates,
            params,
            target_year,
        });

        for (idx, axis) in indices.iter_mut().zip(axes).rev() {
            *idx += 1;
            if *idx < axis.len() {
                break;
            }
            *idx = 0;
        }
    }
    Ok(cells)
}

fn assign(
    params: &mut SimulationParameters,
    target_year: &mut i32,
    name: ParameterName,
    value: f64,
) -> SimulationResult<()> {
    match name {
        ParameterName::TargetYear => *target_year = whole_years(name, value)? as i32,
        ParameterName::LoanTermYears => {
            params.loan_term_months = whole_years(name, value)? * MONTHS_PER_YEAR
        }
        ParameterName::InitialRent => params.initial_rent = value,
        ParameterName::HomePrice => params.home_price = value,
        ParameterName::DownPaymentFraction => params.down_payment_fraction = value,
        ParameterName::AnnualLoanRate => params.annual_loan_rate = value,
        ParameterName::AnnualPropertyTaxRate => params.annual_property_tax_rate = value,
        ParameterName::AnnualStockReturn => params.annual_stock_return = value,
        ParameterName::AnnualHomeAppreciation => params.annual_home_appreciation = value,
        ParameterName::AnnualUpkeepRate => params.annual_upkeep_rate = value,
        ParameterName::InitialTenantIncome => params.initial_tenant_income = value,
        ParameterName::CapitalGainsTaxRate => params.capital_gains_tax_rate = value,
        ParameterName::RealtorFeeRate => params.realtor_fee_rate = value,
    }
    Ok(())
}

fn whole_years(name: ParameterName, value: f64) -> SimulationResult<u32> {
    let rounded = value.round();
    if !value.is_finite()
        || rounded < 0.0
        || (value - rounded).abs() > INTEGRAL_TOLERANCE
        || rounded > 1_000.0
    {
        return Err(SimulationError::invalid(
            "grid_parameter",
            format!("{name} must be a whole number of years between 0 and 1000, got {value}"),
        ));
    }
    Ok(rounded as u32)
}
