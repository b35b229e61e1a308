use super::accumulator::CompoundingAccumulator;
use super::amortization::{AmortizationRow, AmortizationSchedule, LoanState};
use super::error::SimulationResult;
use super::series::{self, MONTHS_PER_YEAR};
use super::types::{DownPaymentTreatment, MonthlyRecord, SimulationParameters, SurplusPolicy};

/// Cash moving during one month of the projection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MonthFlows {
    pub home_value: f64,
    pub rent: f64,
    pub tenant_income: f64,
    pub property_tax: f64,
    pub upkeep: f64,
    pub down_payment: f64,
    pub loan: AmortizationRow,
    pub buy_outflow: f64,
    pub differential: f64,
}

/// Balance-sheet position at a month boundary, with liquidation adjustments.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Position {
    pub home_value: f64,
    pub remaining_debt: f64,
    pub home_equity: f64,
    pub invested_renting: f64,
    pub down_payment_invested: f64,
    pub invested_buying: f64,
    pub net_worth_buy: f64,
    pub net_worth_rent: f64,
    pub capital_gains_tax: f64,
    pub realtor_fee: f64,
    pub effective_net_worth_buy: f64,
    pub effective_net_worth_rent: f64,
}

/// Mutable state of a single run. Built fresh for every call and never shared.
#[derive(Debug)]
pub(crate) struct Projection<'a> {
    params: &'a SimulationParameters,
    loan: LoanState,
    renter: CompoundingAccumulator,
    down_payment_account: CompoundingAccumulator,
    buyer: CompoundingAccumulator,
}

impl<'a> Projection<'a> {
    pub(crate) fn new(params: &'a SimulationParameters) -> SimulationResult<Self> {
        params.validate()?;
        let loan_rate = series::monthly_rate(params.annual_loan_rate)?;
        let stock_rate = series::monthly_rate(params.annual_stock_return)?;
        let schedule =
            AmortizationSchedule::new(params.loan_principal(), loan_rate, params.loan_term_months);

        Ok(Self {
            params,
            loan: schedule.loan_state(),
            renter: CompoundingAccumulator::new(stock_rate),
            down_payment_account: CompoundingAccumulator::new(stock_rate),
            buyer: CompoundingAccumulator::new(stock_rate),
        })
    }

    pub(crate) fn flows(&self, month: u32) -> MonthFlows {
        let p = self.params;
        let appreciation = p.annual_home_appreciation;
        let home_value = series::value_at_month(p.home_price, appreciation, month);
        let rent = series::value_at_month(p.initial_rent, appreciation, month);
        let tenant_income = series::value_at_month(p.initial_tenant_income, appreciation, month);
        let property_tax = home_value * p.annual_property_tax_rate / MONTHS_PER_YEAR as f64;
        let upkeep = home_value * p.annual_upkeep_rate / MONTHS_PER_YEAR as f64;
        let down_payment = if month == 0 { p.down_payment() } else { 0.0 };
        let loan = self.loan.preview(month);

        let tenant_offset = if p.options.tenant_income_offsets_cost {
            tenant_income
        } else {
            0.0
        };
        let buy_outflow = down_payment + loan.payment + property_tax + upkeep - tenant_offset;

        MonthFlows {
            home_value,
            rent,
            tenant_income,
            property_tax,
            upkeep,
            down_payment,
            loan,
            buy_outflow,
            differential: buy_outflow - rent,
        }
    }

    pub(crate) fn position(&self, home_value: f64) -> Position {
        let p = self.params;
        let remaining_debt = self.loan.balance();
        let home_equity = home_value - remaining_debt;
        let invested_renting = self.renter.balance();
        let down_payment_invested = self.down_payment_account.balance();
        let invested_buying = self.buyer.balance();

        let net_worth_buy = home_equity + invested_buying;
        let net_worth_rent = invested_renting + down_payment_invested;
        let capital_gains_tax = net_worth_rent * p.capital_gains_tax_rate;
        let realtor_fee = home_value * p.realtor_fee_rate;

        Position {
            home_value,
            remaining_debt,
            home_equity,
            invested_renting,
            down_payment_invested,
            invested_buying,
            net_worth_buy,
            net_worth_rent,
            capital_gains_tax,
            realtor_fee,
            effective_net_worth_buy: home_equity - realtor_fee
                + invested_buying * (1.0 - p.capital_gains_tax_rate),
            effective_net_worth_rent: net_worth_rent - capital_gains_tax,
        }
    }

    /// Applies the month's loan step and routes the differential into the
    /// investment accounts.
    pub(crate) fn advance(&mut self, flows: &MonthFlows) {
        self.loan.advance(flows.loan.month);

        let mut renter_contribution = flows.differential;
        let mut down_payment_contribution = 0.0;
        if self.params.options.down_payment == DownPaymentTreatment::SeparateAccount {
            renter_contribution -= flows.down_payment;
            down_payment_contribution = flows.down_payment;
        }

        let mut buyer_contribution = 0.0;
        if self.params.options.surplus == SurplusPolicy::BuyerInvests && renter_contribution < 0.0
        {
            buyer_contribution = -renter_contribution;
            renter_contribution = 0.0;
        }

        self.renter.contribute(renter_contribution);
        self.down_payment_account.contribute(down_payment_contribution);
        self.buyer.contribute(buyer_contribution);
    }
}

/// Month-by-month projection over `params.horizon_months`.
///
/// Returns `horizon_months + 1` records: record `m` holds the position at
/// the start of month `m`, so the last record is the position once the whole
/// horizon has elapsed.
pub fn simulate(params: &SimulationParameters) -> SimulationResult<Vec<MonthlyRecord>> {
    let mut projection = Projection::new(params)?;
    tracing::debug!(horizon_months = params.horizon_months, "simulating scenario");

    let mut records = Vec::with_capacity(params.horizon_months as usize + 1);
    let mut totals = RunningTotals::default();
    for month in 0..=params.horizon_months {
        let flows = projection.flows(month);
        totals.add(&flows);
        records.push(build_record(
            month,
            &flows,
            &totals,
            &projection.position(flows.home_value),
        ));
        if month < params.horizon_months {
            projection.advance(&flows);
        }
    }
    Ok(records)
}

#[derive(Debug, Default)]
struct RunningTotals {
    rent: f64,
    interest: f64,
    property_tax: f64,
}

impl RunningTotals {
    fn add(&mut self, flows: &MonthFlows) {
        self.rent += flows.rent;
        self.interest += flows.loan.interest_accrued;
        self.property_tax += flows.property_tax;
    }
}

fn build_record(
    month: u32,
    flows: &MonthFlows,
    totals: &RunningTotals,
    position: &Position,
) -> MonthlyRecord {
    MonthlyRecord {
        month,
        year: month as f64 / MONTHS_PER_YEAR as f64,
        home_value: position.home_value,
        remaining_debt: position.remaining_debt,
        home_equity: position.home_equity,
        rent: flows.rent,
        tenant_income: flows.tenant_income,
        mortgage_payment: flows.loan.payment,
        interest_accrued: flows.loan.interest_accrued,
        principal_paid: flows.loan.principal_paid,
        property_tax: flows.property_tax,
        upkeep: flows.upkeep,
        down_payment: flows.down_payment,
        cumulative_rent: totals.rent,
        cumulative_interest_paid: totals.interest,
        cumulative_property_tax: totals.property_tax,
        buy_outflow: flows.buy_outflow,
        cash_flow_differential: flows.differential,
        invested_renting: position.invested_renting,
        down_payment_invested: position.down_payment_invested,
        invested_buying: position.invested_buying,
        net_worth_buy: position.net_worth_buy,
        net_worth_rent: position.net_worth_rent,
        capital_gains_tax: position.capital_gains_tax,
        realtor_fee: position.realtor_fee,
        effective_net_worth_buy: position.effective_net_worth_buy,
        effective_net_worth_rent: position.effective_net_worth_rent,
        buying_advantage: position.effective_net_worth_buy - position.effective_net_worth_rent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accumulator::accumulate;
    use crate::core::error::SimulationError;
    use crate::core::types::ModelOptions;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_rel(actual: f64, expected: f64) {
        let tol = EPS * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    /// Zero growth everywhere so every number can be checked by hand.
    fn flat_params() -> SimulationParameters {
        SimulationParameters {
            horizon_months: 24,
            initial_rent: 1_000.0,
            home_price: 120_000.0,
            down_payment_fraction: 0.5,
            loan_term_months: 12,
            annual_loan_rate: 0.0,
            annual_property_tax_rate: 0.01,
            annual_stock_return: 0.0,
            annual_home_appreciation: 0.0,
            annual_upkeep_rate: 0.01,
            initial_tenant_income: 0.0,
            capital_gains_tax_rate: 0.15,
            realtor_fee_rate: 0.06,
            options: ModelOptions::default(),
        }
    }

    #[test]
    fn simulate_returns_one_record_per_month_plus_terminal() {
        let records = simulate(&flat_params()).expect("valid parameters");
        assert_eq!(records.len(), 25);
        for (idx, record) in records.iter().enumerate() {
            assert_eq!(record.month, idx as u32);
        }
        assert_approx(records[24].year, 2.0);
    }

    #[test]
    fn zero_horizon_yields_opening_position_only() {
        let params = SimulationParameters::default().with_horizon_years(0);
        let records = simulate(&params).expect("valid parameters");
        assert_eq!(records.len(), 1);
        let opening = &records[0];
        assert_eq!(opening.home_value, 800_000.0);
        assert_eq!(opening.remaining_debt, 640_000.0);
        assert_eq!(opening.invested_renting, 0.0);
        assert_approx(opening.effective_net_worth_buy, 160_000.0 - 48_000.0);
    }

    #[test]
    fn oracle_flat_scenario_matches_hand_calculation() {
        // Loan 60_000 over 12 months at 0%: 5_000 per month.
        // Tax and upkeep: 120_000 * 0.01 / 12 = 100 each.
        // Month 0 differential: 60_000 + 5_000 + 200 - 1_000 = 64_200.
        // Months 1-11: 5_200 - 1_000 = 4_200. Months 12+: 200 - 1_000 = -800.
        let records = simulate(&flat_params()).expect("valid parameters");

        assert_approx(records[0].mortgage_payment, 5_000.0);
        assert_approx(records[0].property_tax, 100.0);
        assert_approx(records[0].upkeep, 100.0);
        assert_approx(records[0].down_payment, 60_000.0);
        assert_approx(records[0].cash_flow_differential, 64_200.0);
        assert_approx(records[1].cash_flow_differential, 4_200.0);
        assert_approx(records[12].mortgage_payment, 0.0);
        assert_approx(records[12].cash_flow_differential, -800.0);

        assert_approx(records[12].remaining_debt, 0.0);
        assert_approx(records[12].invested_renting, 64_200.0 + 11.0 * 4_200.0);
        let terminal = &records[24];
        let renter = 64_200.0 + 11.0 * 4_200.0 - 12.0 * 800.0;
        assert_approx(terminal.invested_renting, renter);
        assert_approx(terminal.net_worth_buy, 120_000.0);
        assert_approx(terminal.effective_net_worth_buy, 120_000.0 - 7_200.0);
        assert_approx(terminal.effective_net_worth_rent, renter * 0.85);
        assert_approx(
            terminal.buying_advantage,
            terminal.effective_net_worth_buy - terminal.effective_net_worth_rent,
        );
    }

    #[test]
    fn running_totals_include_the_current_month() {
        let records = simulate(&flat_params()).expect("valid parameters");
        assert_approx(records[0].cumulative_rent, 1_000.0);
        assert_approx(records[11].cumulative_rent, 12_000.0);
        assert_approx(records[24].cumulative_rent, 25_000.0);
        assert_approx(records[11].cumulative_property_tax, 1_200.0);
        assert_approx(records[24].cumulative_interest_paid, 0.0);

        let params = SimulationParameters::default().with_horizon_years(31);
        let records = simulate(&params).expect("valid parameters");
        assert_eq!(records[0].cumulative_interest_paid, records[0].interest_accrued);
        let interest: f64 = records.iter().map(|r| r.interest_accrued).sum();
        let last = records.last().expect("records");
        assert_approx_rel(last.cumulative_interest_paid, interest);
        // Total interest is what the payments cover beyond the principal.
        let payments: f64 = records.iter().map(|r| r.mortgage_payment).sum();
        assert_approx_rel(last.cumulative_interest_paid, payments - 640_000.0);
        assert_eq!(
            records[372].cumulative_interest_paid,
            records[360].cumulative_interest_paid
        );
    }

    #[test]
    fn remaining_debt_at_month_zero_is_full_principal() {
        let records = simulate(&SimulationParameters::default().with_horizon_years(1))
            .expect("valid parameters");
        assert_eq!(records[0].remaining_debt, 640_000.0);
        assert!((records[0].mortgage_payment - 3_967.282_113).abs() < 1e-5);
        assert!(records[1].remaining_debt < 640_000.0);
    }

    #[test]
    fn renter_balance_follows_contribute_then_grow_of_differentials() {
        let params = SimulationParameters::default().with_horizon_years(5);
        let records = simulate(&params).expect("valid parameters");
        let differentials: Vec<f64> = records[..60]
            .iter()
            .map(|r| r.cash_flow_differential)
            .collect();
        let stock_rate = series::monthly_rate(params.annual_stock_return).expect("valid rate");
        let balances = accumulate(&differentials, stock_rate);
        for (idx, balance) in balances.iter().enumerate() {
            assert_eq!(records[idx + 1].invested_renting, *balance);
        }
    }

    #[test]
    fn escalating_flows_step_at_year_boundaries() {
        let params = SimulationParameters::default().with_horizon_years(2);
        let records = simulate(&params).expect("valid parameters");
        assert_eq!(records[11].rent, 1_500.0);
        assert_approx(records[12].rent, 1_581.0);
        assert_approx(records[12].home_value, 843_200.0);
        assert_approx(records[12].property_tax, 843_200.0 * 0.0105 / 12.0);
    }

    #[test]
    fn tenant_income_offsets_buy_outflow_only_when_enabled() {
        let mut params = flat_params();
        params.initial_tenant_income = 300.0;
        let with_offset = simulate(&params).expect("valid parameters");
        assert_approx(with_offset[1].buy_outflow, 5_200.0 - 300.0);
        assert_approx(with_offset[1].tenant_income, 300.0);

        params.options.tenant_income_offsets_cost = false;
        let without_offset = simulate(&params).expect("valid parameters");
        assert_approx(without_offset[1].buy_outflow, 5_200.0);
        assert_approx(without_offset[1].tenant_income, 300.0);
    }

    #[test]
    fn separate_down_payment_account_matches_contribution_treatment() {
        let params = SimulationParameters::default().with_horizon_years(10);
        let mut separate = params.clone();
        separate.options.down_payment = DownPaymentTreatment::SeparateAccount;

        let a = simulate(&params).expect("valid parameters");
        let b = simulate(&separate).expect("valid parameters");
        let last_a = a.last().expect("records");
        let last_b = b.last().expect("records");

        assert_eq!(last_a.down_payment_invested, 0.0);
        let stock_rate = series::monthly_rate(params.annual_stock_return).expect("valid rate");
        assert_approx_rel(
            last_b.down_payment_invested,
            160_000.0 * (1.0 + stock_rate).powi(120),
        );
        assert_approx_rel(last_b.net_worth_rent, last_a.net_worth_rent);
        assert_approx_rel(last_b.effective_net_worth_rent, last_a.effective_net_worth_rent);
    }

    #[test]
    fn buyer_invests_surplus_once_costs_fall_below_rent() {
        let mut params = flat_params();
        params.options.surplus = SurplusPolicy::BuyerInvests;
        let records = simulate(&params).expect("valid parameters");

        assert_approx(records[12].invested_buying, 0.0);
        let terminal = &records[24];
        assert_approx(terminal.invested_buying, 12.0 * 800.0);
        assert_approx(terminal.invested_renting, 64_200.0 + 11.0 * 4_200.0);
        assert_approx(terminal.net_worth_buy, 120_000.0 + 9_600.0);
        assert_approx(
            terminal.effective_net_worth_buy,
            120_000.0 - 7_200.0 + 9_600.0 * 0.85,
        );
    }

    #[test]
    fn simulate_rejects_invalid_parameters_before_running() {
        let params = SimulationParameters {
            down_payment_fraction: 1.5,
            ..SimulationParameters::default()
        };
        assert!(matches!(
            simulate(&params),
            Err(SimulationError::InvalidInput {
                field: "down_payment_fraction",
                ..
            })
        ));
    }

    #[test]
    fn full_cash_purchase_has_no_debt_or_payments() {
        let params = SimulationParameters {
            down_payment_fraction: 1.0,
            ..SimulationParameters::default().with_horizon_years(3)
        };
        let records = simulate(&params).expect("valid parameters");
        for record in &records {
            assert_eq!(record.remaining_debt, 0.0);
            assert_eq!(record.mortgage_payment, 0.0);
        }
        assert_approx(records[0].down_payment, 800_000.0);
    }

    #[test]
    fn simulate_is_idempotent() {
        let params = SimulationParameters::default();
        let a = simulate(&params).expect("valid parameters");
        let b = simulate(&params).expect("valid parameters");
        assert_eq!(a, b);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_records_are_finite_and_debt_never_negative(
            years in 0u32..50,
            rent in 500u32..6_000,
            price in 100_000u32..2_000_000,
            down_bp in 0u32..10_001,
            term_years in 0u32..40,
            loan_bp in 0i32..1_500,
            stock_bp in -500i32..1_500,
            appreciation_bp in -500i32..1_000,
            tenant in 0u32..3_000
        ) {
            let params = SimulationParameters {
                horizon_months: years * 12,
                initial_rent: rent as f64,
                home_price: price as f64,
                down_payment_fraction: down_bp as f64 / 10_000.0,
                loan_term_months: term_years * 12,
                annual_loan_rate: loan_bp as f64 / 10_000.0,
                annual_stock_return: stock_bp as f64 / 10_000.0,
                annual_home_appreciation: appreciation_bp as f64 / 10_000.0,
                initial_tenant_income: tenant as f64,
                ..SimulationParameters::default()
            };
            let records = simulate(&params).expect("valid parameters");
            prop_assert!(records.len() == (years * 12 + 1) as usize);
            for record in &records {
                prop_assert!(record.remaining_debt >= 0.0);
                prop_assert!(record.effective_net_worth_buy.is_finite());
                prop_assert!(record.effective_net_worth_rent.is_finite());
                prop_assert!(
                    (record.home_equity - (record.home_value - record.remaining_debt)).abs() <= 1e-6
                );
            }
        }
    }
}
