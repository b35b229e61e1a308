use serde::Serialize;

use super::error::{SimulationError, SimulationResult};
use super::series::MONTHS_PER_YEAR;

pub const DEFAULT_HORIZON_YEARS: u32 = 45;
pub const DEFAULT_INITIAL_RENT: f64 = 1_500.0;
pub const DEFAULT_HOME_PRICE: f64 = 800_000.0;
pub const DEFAULT_DOWN_PAYMENT_FRACTION: f64 = 0.20;
pub const DEFAULT_LOAN_TERM_YEARS: u32 = 30;
pub const DEFAULT_ANNUAL_LOAN_RATE: f64 = 0.065;
pub const DEFAULT_ANNUAL_PROPERTY_TAX_RATE: f64 = 0.0105;
pub const DEFAULT_ANNUAL_STOCK_RETURN: f64 = 0.11;
pub const DEFAULT_ANNUAL_HOME_APPRECIATION: f64 = 0.054;
pub const DEFAULT_ANNUAL_UPKEEP_RATE: f64 = 0.01;
pub const DEFAULT_INITIAL_TENANT_INCOME: f64 = 0.0;
pub const DEFAULT_CAPITAL_GAINS_TAX_RATE: f64 = 0.15;
pub const DEFAULT_REALTOR_FEE_RATE: f64 = 0.06;
/// Upper bound on horizons, loan terms and point-in-time targets.
pub const MAX_PROJECTION_MONTHS: u32 = 1_000 * MONTHS_PER_YEAR;

/// How the down payment shows up on the renter's side.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownPaymentTreatment {
    /// Added to the month-0 cash-flow differential.
    #[default]
    Contribution,
    /// Compounded in its own renter-side account, outside the differential.
    SeparateAccount,
}

/// Where a negative differential (buying cheaper than renting) goes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SurplusPolicy {
    /// Withdrawn from the renter's investments.
    #[default]
    RenterWithdraws,
    /// Invested by the buyer in a separate account.
    BuyerInvests,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    pub tenant_income_offsets_cost: bool,
    pub down_payment: DownPaymentTreatment,
    pub surplus: SurplusPolicy,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            tenant_income_offsets_cost: true,
            down_payment: DownPaymentTreatment::Contribution,
            surplus: SurplusPolicy::RenterWithdraws,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub horizon_months: u32,
    pub initial_rent: f64,
    pub home_price: f64,
    pub down_payment_fraction: f64,
    pub loan_term_months: u32,
    pub annual_loan_rate: f64,
    pub annual_property_tax_rate: f64,
    pub annual_stock_return: f64,
    pub annual_home_appreciation: f64,
    pub annual_upkeep_rate: f64,
    pub initial_tenant_income: f64,
    pub capital_gains_tax_rate: f64,
    pub realtor_fee_rate: f64,
    pub options: ModelOptions,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            horizon_months: DEFAULT_HORIZON_YEARS * MONTHS_PER_YEAR,
            initial_rent: DEFAULT_INITIAL_RENT,
            home_price: DEFAULT_HOME_PRICE,
            down_payment_fraction: DEFAULT_DOWN_PAYMENT_FRACTION,
            loan_term_months: DEFAULT_LOAN_TERM_YEARS * MONTHS_PER_YEAR,
            annual_loan_rate: DEFAULT_ANNUAL_LOAN_RATE,
            annual_property_tax_rate: DEFAULT_ANNUAL_PROPERTY_TAX_RATE,
            annual_stock_return: DEFAULT_ANNUAL_STOCK_RETURN,
            annual_home_appreciation: DEFAULT_ANNUAL_HOME_APPRECIATION,
            annual_upkeep_rate: DEFAULT_ANNUAL_UPKEEP_RATE,
            initial_tenant_income: DEFAULT_INITIAL_TENANT_INCOME,
            capital_gains_tax_rate: DEFAULT_CAPITAL_GAINS_TAX_RATE,
            realtor_fee_rate: DEFAULT_REALTOR_FEE_RATE,
            options: ModelOptions::default(),
        }
    }
}

impl SimulationParameters {
    /// Saturates on overflow; `validate` rejects anything past
    /// [`MAX_PROJECTION_MONTHS`].
    pub fn with_horizon_years(mut self, years: u32) -> Self {
        self.horizon_months = years.saturating_mul(MONTHS_PER_YEAR);
        self
    }

    pub fn loan_principal(&self) -> f64 {
        self.home_price * (1.0 - self.down_payment_fraction)
    }

    pub fn down_payment(&self) -> f64 {
        self.home_price * self.down_payment_fraction
    }

    pub fn validate(&self) -> SimulationResult<()> {
        let values = [
            ("initial_rent", self.initial_rent),
            ("home_price", self.home_price),
            ("down_payment_fraction", self.down_payment_fraction),
            ("annual_loan_rate", self.annual_loan_rate),
            ("annual_property_tax_rate", self.annual_property_tax_rate),
            ("annual_stock_return", self.annual_stock_return),
            ("annual_home_appreciation", self.annual_home_appreciation),
            ("annual_upkeep_rate", self.annual_upkeep_rate),
            ("initial_tenant_income", self.initial_tenant_income),
            ("capital_gains_tax_rate", self.capital_gains_tax_rate),
            ("realtor_fee_rate", self.realtor_fee_rate),
        ];
        for (field, value) in values {
            if !value.is_finite() {
                return Err(SimulationError::invalid(
                    field,
                    format!("must be finite, got {value}"),
                ));
            }
        }

        let rates = [
            ("annual_loan_rate", self.annual_loan_rate),
            ("annual_property_tax_rate", self.annual_property_tax_rate),
            ("annual_stock_return", self.annual_stock_return),
            ("annual_home_appreciation", self.annual_home_appreciation),
            ("annual_upkeep_rate", self.annual_upkeep_rate),
        ];
        for (field, rate) in rates {
            if rate <= -1.0 {
                return Err(SimulationError::invalid(
                    field,
                    format!("must be > -1, got {rate}"),
                ));
            }
        }

        for (field, months) in [
            ("horizon_months", self.horizon_months),
            ("loan_term_months", self.loan_term_months),
        ] {
            if months > MAX_PROJECTION_MONTHS {
                return Err(SimulationError::invalid(
                    field,
                    format!("must be <= {MAX_PROJECTION_MONTHS}, got {months}"),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.down_payment_fraction) {
            return Err(SimulationError::invalid(
                "down_payment_fraction",
                format!("must be between 0 and 1, got {}", self.down_payment_fraction),
            ));
        }
        if self.home_price < 0.0 {
            return Err(SimulationError::invalid(
                "home_price",
                format!("must be >= 0, got {}", self.home_price),
            ));
        }
        for (field, rate) in [
            ("capital_gains_tax_rate", self.capital_gains_tax_rate),
            ("realtor_fee_rate", self.realtor_fee_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimulationError::invalid(
                    field,
                    format!("must be between 0 and 1, got {rate}"),
                ));
            }
        }
        Ok(())
    }
}

/// One simulated month. Balances are the position at the start of the month;
/// flows are what moves during it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRecord {
    pub month: u32,
    pub year: f64,
    pub home_value: f64,
    pub remaining_debt: f64,
    pub home_equity: f64,
    pub rent: f64,
    pub tenant_income: f64,
    pub mortgage_payment: f64,
    pub interest_accrued: f64,
    pub principal_paid: f64,
    pub property_tax: f64,
    pub upkeep: f64,
    pub down_payment: f64,
    /// Running totals through the end of this month.
    pub cumulative_rent: f64,
    pub cumulative_interest_paid: f64,
    pub cumulative_property_tax: f64,
    pub buy_outflow: f64,
    pub cash_flow_differential: f64,
    pub invested_renting: f64,
    pub down_payment_invested: f64,
    pub invested_buying: f64,
    pub net_worth_buy: f64,
    pub net_worth_rent: f64,
    pub capital_gains_tax: f64,
    pub realtor_fee: f64,
    pub effective_net_worth_buy: f64,
    pub effective_net_worth_rent: f64,
    pub buying_advantage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointInTimeResult {
    pub target_year: u32,
    pub months_simulated: u32,
    pub home_value: f64,
    pub remaining_debt: f64,
    pub home_equity: f64,
    pub invested_renting: f64,
    pub down_payment_invested: f64,
    pub invested_buying: f64,
    pub net_worth_buy: f64,
    pub net_worth_rent: f64,
    pub effective_net_worth_buy: f64,
    pub effective_net_worth_rent: f64,
    pub monthly_mortgage_payment: f64,
    pub monthly_property_tax: f64,
    pub monthly_upkeep: f64,
    pub monthly_rent: f64,
    pub monthly_tenant_income: f64,
}

impl PointInTimeResult {
    /// Positive when buying comes out ahead.
    pub fn buying_advantage(&self) -> f64 {
        self.effective_net_worth_buy - self.effective_net_worth_rent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_configuration() {
        let params = SimulationParameters::default();
        assert_eq!(params.horizon_months, 540);
        assert_eq!(params.loan_term_months, 360);
        assert_eq!(params.loan_principal(), 640_000.0);
        assert_eq!(params.down_payment(), 160_000.0);
        assert_eq!(params.options, ModelOptions::default());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn validate_rejects_rate_at_minus_one() {
        let params = SimulationParameters {
            annual_stock_return: -1.0,
            ..SimulationParameters::default()
        };
        assert_eq!(
            params.validate(),
            Err(SimulationError::InvalidInput {
                field: "annual_stock_return",
                reason: "must be > -1, got -1".to_string(),
            })
        );
    }

    #[test]
    fn validate_rejects_down_payment_outside_unit_interval() {
        for fraction in [-0.01, 1.01] {
            let params = SimulationParameters {
                down_payment_fraction: fraction,
                ..SimulationParameters::default()
            };
            assert!(matches!(
                params.validate(),
                Err(SimulationError::InvalidInput {
                    field: "down_payment_fraction",
                    ..
                })
            ));
        }
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let params = SimulationParameters {
            initial_rent: f64::INFINITY,
            ..SimulationParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(SimulationError::InvalidInput {
                field: "initial_rent",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_liquidation_rates_above_one() {
        let params = SimulationParameters {
            realtor_fee_rate: 1.5,
            ..SimulationParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn with_horizon_years_converts_to_months() {
        let params = SimulationParameters::default().with_horizon_years(10);
        assert_eq!(params.horizon_months, 120);
    }

    #[test]
    fn huge_horizon_saturates_and_fails_validation() {
        let params = SimulationParameters::default().with_horizon_years(u32::MAX);
        assert_eq!(params.horizon_months, u32::MAX);
        assert!(matches!(
            params.validate(),
            Err(SimulationError::InvalidInput {
                field: "horizon_months",
                ..
            })
        ));
    }

    #[test]
    fn validate_bounds_loan_term() {
        let params = SimulationParameters {
            loan_term_months: i32::MAX as u32 + 1,
            ..SimulationParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(SimulationError::InvalidInput {
                field: "loan_term_months",
                ..
            })
        ));
        let at_limit = SimulationParameters {
            loan_term_months: MAX_PROJECTION_MONTHS,
            ..SimulationParameters::default()
        };
        assert!(at_limit.validate().is_ok());
    }
}
