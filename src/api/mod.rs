use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::core::{
    DownPaymentTreatment, GridSearchResult, MONTHS_PER_YEAR, ModelOptions, MonthlyRecord,
    ParameterName, PointInTimeResult, SimulationParameters, SurplusPolicy, SweepRange,
    evaluate_at_year, grid_search_with_options, simulate,
};

const MAX_HORIZON_YEARS: u32 = 100;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiDownPaymentTreatment {
    Contribution,
    #[serde(alias = "separateAccount", alias = "separate_account", alias = "separate")]
    SeparateAccount,
}

impl From<ApiDownPaymentTreatment> for DownPaymentTreatment {
    fn from(value: ApiDownPaymentTreatment) -> Self {
        match value {
            ApiDownPaymentTreatment::Contribution => DownPaymentTreatment::Contribution,
            ApiDownPaymentTreatment::SeparateAccount => DownPaymentTreatment::SeparateAccount,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSurplusPolicy {
    #[serde(alias = "renterWithdraws", alias = "renter_withdraws")]
    RenterWithdraws,
    #[serde(alias = "buyerInvests", alias = "buyer_invests")]
    BuyerInvests,
}

impl From<ApiSurplusPolicy> for SurplusPolicy {
    fn from(value: ApiSurplusPolicy) -> Self {
        match value {
            ApiSurplusPolicy::RenterWithdraws => SurplusPolicy::RenterWithdraws,
            ApiSurplusPolicy::BuyerInvests => SurplusPolicy::BuyerInvests,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptionsPayload {
    tenant_income_offsets_cost: Option<bool>,
    down_payment_treatment: Option<ApiDownPaymentTreatment>,
    surplus_policy: Option<ApiSurplusPolicy>,
}

impl OptionsPayload {
    fn apply(&self, options: &mut ModelOptions) {
        if let Some(v) = self.tenant_income_offsets_cost {
            options.tenant_income_offsets_cost = v;
        }
        if let Some(v) = self.down_payment_treatment {
            options.down_payment = v.into();
        }
        if let Some(v) = self.surplus_policy {
            options.surplus = v.into();
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    horizon_years: Option<u32>,
    horizon_months: Option<u32>,
    target_year: Option<i32>,

    initial_rent: Option<f64>,
    home_price: Option<f64>,
    down_payment_fraction: Option<f64>,
    loan_term_years: Option<u32>,
    annual_loan_rate: Option<f64>,
    annual_property_tax_rate: Option<f64>,
    annual_stock_return: Option<f64>,
    annual_home_appreciation: Option<f64>,
    annual_upkeep_rate: Option<f64>,
    initial_tenant_income: Option<f64>,
    capital_gains_tax_rate: Option<f64>,
    realtor_fee_rate: Option<f64>,

    tenant_income_offsets_cost: Option<bool>,
    down_payment_treatment: Option<ApiDownPaymentTreatment>,
    surplus_policy: Option<ApiSurplusPolicy>,
}

impl ScenarioPayload {
    // Query strings cannot go through `serde(flatten)`, so the option keys
    // live inline here.
    fn options(&self) -> OptionsPayload {
        OptionsPayload {
            tenant_income_offsets_cost: self.tenant_income_offsets_cost,
            down_payment_treatment: self.down_payment_treatment,
            surplus_policy: self.surplus_policy,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SweptPayload {
    name: ParameterName,
    start: f64,
    stop: f64,
    step: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GridSearchPayload {
    fixed: BTreeMap<ParameterName, f64>,
    swept: Vec<SweptPayload>,
    #[serde(flatten)]
    options: OptionsPayload,
}

#[derive(Debug)]
struct ScenarioRequest {
    params: SimulationParameters,
    target_year: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    parameters: SimulationParameters,
    records: Vec<MonthlyRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateResponse {
    parameters: SimulationParameters,
    result: PointInTimeResult,
    buying_advantage: f64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/evaluate",
            get(evaluate_get_handler).post(evaluate_post_handler),
        )
        .route("/api/grid-search", post(grid_search_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "buy-vs-rent HTTP API listening");
    tracing::info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<ScenarioPayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: ScenarioPayload) -> Response {
    let request = match scenario_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match simulate(&request.params) {
        Ok(records) => {
            tracing::debug!(records = records.len(), "simulation complete");
            json_response(
                StatusCode::OK,
                SimulateResponse {
                    parameters: request.params,
                    records,
                },
            )
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn evaluate_get_handler(Query(payload): Query<ScenarioPayload>) -> Response {
    evaluate_handler_impl(payload).await
}

async fn evaluate_post_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    evaluate_handler_impl(payload).await
}

async fn evaluate_handler_impl(payload: ScenarioPayload) -> Response {
    let request = match scenario_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match evaluate_at_year(&request.params, request.target_year) {
        Ok(result) => json_response(
            StatusCode::OK,
            EvaluateResponse {
                parameters: request.params,
                buying_advantage: result.buying_advantage(),
                result,
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn grid_search_handler(Json(payload): Json<GridSearchPayload>) -> Response {
    match run_grid_search(payload) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    if status.is_client_error() {
        tracing::warn!(%status, error = msg, "rejecting request");
    }
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn scenario_request_from_payload(payload: ScenarioPayload) -> Result<ScenarioRequest, String> {
    let mut params = SimulationParameters::default();

    match (payload.horizon_years, payload.horizon_months) {
        (Some(_), Some(_)) => {
            return Err("horizonYears and horizonMonths cannot both be set".to_string());
        }
        (Some(years), None) => {
            if years > MAX_HORIZON_YEARS {
                return Err(format!("horizonYears must be <= {MAX_HORIZON_YEARS}"));
            }
            params.horizon_months = years * MONTHS_PER_YEAR;
        }
        (None, Some(months)) => {
            if months > MAX_HORIZON_YEARS * MONTHS_PER_YEAR {
                return Err(format!(
                    "horizonMonths must be <= {}",
                    MAX_HORIZON_YEARS * MONTHS_PER_YEAR
                ));
            }
            params.horizon_months = months;
        }
        (None, None) => {}
    }

    if let Some(v) = payload.initial_rent {
        params.initial_rent = v;
    }
    if let Some(v) = payload.home_price {
        params.home_price = v;
    }
    if let Some(v) = payload.down_payment_fraction {
        params.down_payment_fraction = v;
    }
    if let Some(v) = payload.loan_term_years {
        if v > MAX_HORIZON_YEARS {
            return Err(format!("loanTermYears must be <= {MAX_HORIZON_YEARS}"));
        }
        params.loan_term_months = v * MONTHS_PER_YEAR;
    }
    if let Some(v) = payload.annual_loan_rate {
        params.annual_loan_rate = v;
    }
    if let Some(v) = payload.annual_property_tax_rate {
        params.annual_property_tax_rate = v;
    }
    if let Some(v) = payload.annual_stock_return {
        params.annual_stock_return = v;
    }
    if let Some(v) = payload.annual_home_appreciation {
        params.annual_home_appreciation = v;
    }
    if let Some(v) = payload.annual_upkeep_rate {
        params.annual_upkeep_rate = v;
    }
    if let Some(v) = payload.initial_tenant_income {
        params.initial_tenant_income = v;
    }
    if let Some(v) = payload.capital_gains_tax_rate {
        params.capital_gains_tax_rate = v;
    }
    if let Some(v) = payload.realtor_fee_rate {
        params.realtor_fee_rate = v;
    }
    payload.options().apply(&mut params.options);

    // Point-in-time requests default to the end of the horizon.
    let target_year = payload
        .target_year
        .unwrap_or((params.horizon_months / MONTHS_PER_YEAR) as i32);
    if target_year > MAX_HORIZON_YEARS as i32 {
        return Err(format!("targetYear must be <= {MAX_HORIZON_YEARS}"));
    }

    params.validate().map_err(|e| e.to_string())?;
    Ok(ScenarioRequest {
        params,
        target_year,
    })
}

fn run_grid_search(payload: GridSearchPayload) -> Result<GridSearchResult, String> {
    let mut options = ModelOptions::default();
    payload.options.apply(&mut options);

    let fixed: Vec<(ParameterName, f64)> = payload.fixed.into_iter().collect();
    let swept: Vec<(ParameterName, SweepRange)> = payload
        .swept
        .iter()
        .map(|s| (s.name, SweepRange::new(s.start, s.stop, s.step)))
        .collect();

    grid_search_with_options(options, &fixed, &swept).map_err(|e| e.to_string())
}
