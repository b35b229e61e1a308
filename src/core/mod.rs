mod accumulator;
mod amortization;
mod engine;
mod error;
mod point_in_time;
mod series;
mod sweep;
mod types;

pub use accumulator::{CompoundingAccumulator, accumulate};
pub use amortization::{AmortizationRow, AmortizationSchedule, LoanState, level_payment};
pub use engine::simulate;
pub use error::{SimulationError, SimulationResult};
pub use point_in_time::{buying_advantage, evaluate_at_year};
pub use series::{MONTHS_PER_YEAR, generate, monthly_rate, value_at_month, value_at_year};
pub use sweep::{
    GridAxis, GridSearchResult, ParameterName, SweepRange, grid_search, grid_search_with_options,
};
pub use types::{
    DEFAULT_HORIZON_YEARS, DownPaymentTreatment, MAX_PROJECTION_MONTHS, ModelOptions,
    MonthlyRecord, PointInTimeResult, SimulationParameters, SurplusPolicy,
};
