/// Running investment balance where each period's contribution is added
/// before that period's growth is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompoundingAccumulator {
    balance: f64,
    monthly_rate: f64,
}

impl CompoundingAccumulator {
    pub fn new(monthly_rate: f64) -> Self {
        Self {
            balance: 0.0,
            monthly_rate,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn contribute(&mut self, contribution: f64) -> f64 {
        self.balance = (self.balance + contribution) * (1.0 + self.monthly_rate);
        self.balance
    }
}

pub fn accumulate(contributions: &[f64], monthly_rate: f64) -> Vec<f64> {
    let mut acc = CompoundingAccumulator::new(monthly_rate);
    contributions.iter().map(|&c| acc.contribute(c)).collect()
}
