use super::engine::Projection;
use super::error::{SimulationError, SimulationResult};
use super::series::MONTHS_PER_YEAR;
use super::types::{MAX_PROJECTION_MONTHS, PointInTimeResult, SimulationParameters};

/// Position at the end of `target_year` without building the monthly
/// record sequence. `params.horizon_months` is ignored.
///
/// Agrees with the last record of [`simulate`](super::simulate) run over
/// `12 * target_year` months.
pub fn evaluate_at_year(
    params: &SimulationParameters,
    target_year: i32,
) -> SimulationResult<PointInTimeResult> {
    let target_year = u32::try_from(target_year).map_err(|_| {
        SimulationError::invalid("target_year", format!("must be >= 0, got {target_year}"))
    })?;
    let months = target_year
        .checked_mul(MONTHS_PER_YEAR)
        .filter(|&months| months <= MAX_PROJECTION_MONTHS)
        .ok_or_else(|| {
            SimulationError::invalid("target_year", format!("{target_year} is out of range"))
        })?;

    let mut projection = Projection::new(params)?;
    for month in 0..months {
        let flows = projection.flows(month);
        projection.advance(&flows);
    }

    let next = projection.flows(months);
    let position = projection.position(next.home_value);

    Ok(PointInTimeResult {
        target_year,
        months_simulated: months,
        home_value: position.home_value,
        remaining_debt: position.remaining_debt,
        home_equity: position.home_equity,
        invested_renting: position.invested_renting,
        down_payment_invested: position.down_payment_invested,
        invested_buying: position.invested_buying,
        net_worth_buy: position.net_worth_buy,
        net_worth_rent: position.net_worth_rent,
        effective_net_worth_buy: position.effective_net_worth_buy,
        effective_net_worth_rent: position.effective_net_worth_rent,
        monthly_mortgage_payment: next.loan.payment,
        monthly_property_tax: next.property_tax,
        monthly_upkeep: next.upkeep,
        monthly_rent: next.rent,
        monthly_tenant_income: next.tenant_income,
    })
}

/// Effective buy-side minus rent-side net worth at `target_year`.
pub fn buying_advantage(params: &SimulationParameters, target_year: i32) -> SimulationResult<f64> {
    evaluate_at_year(params, target_year).map(|result| result.buying_advantage())
}
