use serde::Serialize;

/// Monthly rates at or below this are treated as interest-free.
pub const ZERO_RATE_EPSILON: f64 = 1e-9;

// Closing balances within this fraction of the original principal count as
// paid off, so accumulated rounding cannot leave a residual cent-fraction.
const PAYOFF_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationRow {
    pub month: u32,
    pub opening_balance: f64,
    pub interest_accrued: f64,
    pub payment: f64,
    pub principal_paid: f64,
    pub closing_balance: f64,
}

impl AmortizationRow {
    fn settled(month: u32) -> Self {
        Self {
            month,
            opening_balance: 0.0,
            interest_accrued: 0.0,
            payment: 0.0,
            principal_paid: 0.0,
            closing_balance: 0.0,
        }
    }
}

/// Standard level payment for `principal` over `term_months`.
pub fn level_payment(principal: f64, monthly_rate: f64, term_months: u32) -> f64 {
    if principal <= 0.0 || term_months == 0 {
        return 0.0;
    }
    if monthly_rate <= ZERO_RATE_EPSILON {
        return principal / term_months as f64;
    }
    let base = 1.0 + monthly_rate;
    let growth = match i32::try_from(term_months) {
        Ok(n) => base.powi(n),
        Err(_) => base.powf(f64::from(term_months)),
    };
    if !growth.is_finite() {
        // Interest-only in the limit of an unbounded term.
        return principal * monthly_rate;
    }
    principal * (monthly_rate * growth) / (growth - 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmortizationSchedule {
    principal: f64,
    monthly_rate: f64,
    fixed_payment: f64,
    payment_term_months: u32,
}

impl AmortizationSchedule {
    pub fn new(principal: f64, monthly_rate: f64, payment_term_months: u32) -> Self {
        let principal = principal.max(0.0);
        Self {
            principal,
            monthly_rate,
            fixed_payment: level_payment(principal, monthly_rate, payment_term_months),
            payment_term_months,
        }
    }

    pub fn principal(&self) -> f64 {
        self.principal
    }

    pub fn monthly_rate(&self) -> f64 {
        self.monthly_rate
    }

    pub fn fixed_payment(&self) -> f64 {
        self.fixed_payment
    }

    pub fn payment_term_months(&self) -> u32 {
        self.payment_term_months
    }

    pub fn loan_state(&self) -> LoanState {
        LoanState {
            balance: self.principal,
            monthly_rate: self.monthly_rate,
            fixed_payment: self.fixed_payment,
            payment_term_months: self.payment_term_months,
            payoff_threshold: self.principal * PAYOFF_TOLERANCE,
        }
    }

    /// The first `months` rows of the schedule.
    pub fn rows(&self, months: u32) -> Vec<AmortizationRow> {
        let mut loan = self.loan_state();
        (0..months).map(|month| loan.advance(month)).collect()
    }

    /// Balance outstanding after `months` months, without storing rows.
    pub fn balance_after(&self, months: u32) -> f64 {
        let mut loan = self.loan_state();
        for month in 0..months {
            if loan.is_paid_off() {
                break;
            }
            loan.advance(month);
        }
        loan.balance()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanState {
    balance: f64,
    monthly_rate: f64,
    fixed_payment: f64,
    payment_term_months: u32,
    payoff_threshold: f64,
}

impl LoanState {
    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn fixed_payment(&self) -> f64 {
        self.fixed_payment
    }

    pub fn is_paid_off(&self) -> bool {
        self.balance <= 0.0
    }

    /// What `month` would do to the loan, without applying it.
    pub fn preview(&self, month: u32) -> AmortizationRow {
        if self.is_paid_off() {
            return AmortizationRow::settled(month);
        }

        let interest = self.balance * self.monthly_rate;
        let payment = if month < self.payment_term_months {
            self.fixed_payment
        } else {
            0.0
        };
        let mut closing = self.balance + interest - payment;
        if closing <= self.payoff_threshold {
            closing = 0.0;
        }

        AmortizationRow {
            month,
            opening_balance: self.balance,
            interest_accrued: interest,
            payment,
            principal_paid: self.balance - closing,
            closing_balance: closing,
        }
    }

    pub fn advance(&mut self, month: u32) -> AmortizationRow {
        let row = self.preview(month);
        self.balance = row.closing_balance;
        row
    }
}
