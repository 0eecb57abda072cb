#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use decena_adapters::sample_fleet;
use decena_core::{
    Actor, ActorRole, ComputeOutcome, DateRange, Liquidation, PaymentMethod, PaymentRequest,
    Period, Production, ProductionStatus, SettlementEngine, SettlementEngineConfig,
    SettlementError, StorageConfig, TripSource, ZoneSource,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub recent_period_months: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::Memory,
            recent_period_months: 6,
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<SettlementEngine>,
}

impl ServiceState {
    /// Bootstrap with the deterministic sample fleet sources.
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, SettlementError> {
        let (trips, zones) = sample_fleet();
        Self::bootstrap_with_sources(config, Arc::new(trips), Arc::new(zones)).await
    }

    pub async fn bootstrap_with_sources(
        config: ServiceConfig,
        trip_source: Arc<dyn TripSource>,
        zone_source: Arc<dyn ZoneSource>,
    ) -> Result<Self, SettlementError> {
        let engine_config = SettlementEngineConfig {
            storage: config.storage,
            recent_period_months: config.recent_period_months,
        };
        let engine = SettlementEngine::bootstrap(trip_source, zone_source, engine_config).await?;

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/periods/recent", get(recent_periods))
        .route("/v1/productions/compute", post(compute_productions))
        .route("/v1/productions", get(list_productions))
        .route(
            "/v1/productions/:production_id/transition",
            post(transition_production),
        )
        .route("/v1/productions/payable", get(list_payable))
        .route(
            "/v1/liquidations",
            get(list_liquidations).post(register_payment),
        )
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] SettlementError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

fn status_for(err: &SettlementError) -> StatusCode {
    match err {
        SettlementError::MalformedPeriod { .. }
        | SettlementError::Validation(_)
        | SettlementError::ZoneConfig(_) => StatusCode::BAD_REQUEST,
        SettlementError::Forbidden(_) => StatusCode::FORBIDDEN,
        SettlementError::ProductionNotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::NotApproved(_) | SettlementError::DuplicatePayment(_) => {
            StatusCode::CONFLICT
        }
        SettlementError::Storage(_) | SettlementError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Http { status, message } => (status, message),
            ApiError::Core(err) => (status_for(&err), err.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    storage_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "decena-service",
        storage_backend: state.engine.storage_backend().await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct RecentPeriodsQuery {
    months: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct PeriodEntry {
    period: Period,
    range: DateRange,
}

#[derive(Debug, Clone, Serialize)]
struct RecentPeriodsResponse {
    items: Vec<PeriodEntry>,
}

async fn recent_periods(
    State(state): State<ServiceState>,
    Query(query): Query<RecentPeriodsQuery>,
) -> Result<Json<RecentPeriodsResponse>, ApiError> {
    if query.months == Some(0) {
        return Err(ApiError::bad_request("months must be at least 1"));
    }

    let today = Utc::now().date_naive();
    let periods = match query.months {
        Some(months) => state.engine.recent_periods_over(today, months),
        None => state.engine.recent_periods(today),
    };

    let items = periods
        .into_iter()
        .map(|period| PeriodEntry {
            period,
            range: period.date_range(),
        })
        .collect();

    Ok(Json(RecentPeriodsResponse { items }))
}

#[derive(Debug, Clone, Deserialize)]
struct ComputeRequest {
    period: String,
}

async fn compute_productions(
    State(state): State<ServiceState>,
    Json(request): Json<ComputeRequest>,
) -> Result<Json<ComputeOutcome>, ApiError> {
    let period: Period = request.period.parse().map_err(ApiError::Core)?;
    Ok(Json(state.engine.compute_productions(period).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct PeriodQuery {
    period: String,
}

#[derive(Debug, Clone, Serialize)]
struct ProductionListResponse {
    period: Period,
    items: Vec<Production>,
}

async fn list_productions(
    State(state): State<ServiceState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ProductionListResponse>, ApiError> {
    let period: Period = query.period.parse().map_err(ApiError::Core)?;
    Ok(Json(ProductionListResponse {
        period,
        items: state.engine.list_productions(period).await,
    }))
}

async fn list_payable(
    State(state): State<ServiceState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ProductionListResponse>, ApiError> {
    let period: Period = query.period.parse().map_err(ApiError::Core)?;
    Ok(Json(ProductionListResponse {
        period,
        items: state.engine.list_payable(period).await,
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct TransitionRequest {
    status: ProductionStatus,
    comment: Option<String>,
    actor_id: String,
    role: ActorRole,
}

async fn transition_production(
    Path(production_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Production>, ApiError> {
    let actor = Actor::new(request.actor_id, request.role);
    let production = state
        .engine
        .transition_production(
            &production_id,
            request.status,
            request.comment.as_deref(),
            &actor,
        )
        .await?;
    Ok(Json(production))
}

#[derive(Debug, Clone, Deserialize)]
struct RegisterPaymentRequest {
    production_id: String,
    payment_date: NaiveDate,
    method: PaymentMethod,
    receipt_ref: String,
    paid: Option<bool>,
}

async fn register_payment(
    State(state): State<ServiceState>,
    Json(request): Json<RegisterPaymentRequest>,
) -> Result<Json<Liquidation>, ApiError> {
    let payment = PaymentRequest {
        production_id: request.production_id,
        payment_date: request.payment_date,
        method: request.method,
        receipt_ref: request.receipt_ref,
        paid: request.paid.unwrap_or(true),
    };
    Ok(Json(state.engine.register_payment(&payment).await?))
}

#[derive(Debug, Clone, Serialize)]
struct LiquidationListResponse {
    period: Period,
    items: Vec<Liquidation>,
}

async fn list_liquidations(
    State(state): State<ServiceState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<LiquidationListResponse>, ApiError> {
    let period: Period = query.period.parse().map_err(ApiError::Core)?;
    Ok(Json(LiquidationListResponse {
        period,
        items: state.engine.list_liquidations(period).await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let state = ServiceState::bootstrap(ServiceConfig::default())
            .await
            .unwrap();
        build_router(state)
    }

    async fn post_json(app: &Router, uri: &str, payload: serde_json::Value) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn get_uri(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn compute_and_pick(app: &Router, operator_key: &str) -> String {
        let response = post_json(
            app,
            "/v1/productions/compute",
            serde_json::json!({ "period": "1072024" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        body["productions"]
            .as_array()
            .unwrap()
            .iter()
            .find(|item| item["operator_key"] == operator_key)
            .and_then(|item| item["production_id"].as_str())
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn compute_returns_productions_and_diagnostics() {
        let app = test_app().await;
        let response = post_json(
            &app,
            "/v1/productions/compute",
            serde_json::json!({ "period": "1072024" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["period"], "1072024");
        assert_eq!(body["generated"], 3);
        assert_eq!(body["productions"].as_array().unwrap().len(), 3);
        assert_eq!(body["unmatched"].as_array().unwrap().len(), 1);
        assert!(body["snapshot_hash"].as_str().unwrap().len() > 32);
    }

    #[tokio::test]
    async fn malformed_period_is_rejected() {
        let app = test_app().await;
        let response = post_json(
            &app,
            "/v1/productions/compute",
            serde_json::json!({ "period": "20-2024" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get_uri(&app, "/v1/productions?period=9999999").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn approval_and_payment_happy_path() {
        let app = test_app().await;
        let production_id = compute_and_pick(&app, "transportes sur").await;

        let response = post_json(
            &app,
            &format!("/v1/productions/{production_id}/transition"),
            serde_json::json!({
                "status": "aprobado",
                "comment": "cierre decena",
                "actor_id": "v-1",
                "role": "validador"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "aprobado");
        assert_eq!(body["validated_by"], "v-1");

        let response = get_uri(&app, "/v1/productions/payable?period=1072024").await;
        let body = body_json(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);

        let payment = serde_json::json!({
            "production_id": production_id,
            "payment_date": "2024-07-15",
            "method": "transferencia",
            "receipt_ref": "rec-077"
        });

        let response = post_json(&app, "/v1/liquidations", payment.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["paid"], true);

        let response = post_json(&app, "/v1/liquidations", payment).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = get_uri(&app, "/v1/liquidations?period=1072024").await;
        let body = body_json(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_on_pending_production_conflicts() {
        let app = test_app().await;
        let production_id = compute_and_pick(&app, "buses andinos").await;

        let response = post_json(
            &app,
            "/v1/liquidations",
            serde_json::json!({
                "production_id": production_id,
                "payment_date": "2024-07-15",
                "method": "efectivo",
                "receipt_ref": "rec-001"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn rejection_without_comment_is_a_validation_error() {
        let app = test_app().await;
        let production_id = compute_and_pick(&app, "buses maule").await;

        let response = post_json(
            &app,
            &format!("/v1/productions/{production_id}/transition"),
            serde_json::json!({
                "status": "rechazado",
                "actor_id": "v-1",
                "role": "validador"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn validator_cannot_reopen_approved_production() {
        let app = test_app().await;
        let production_id = compute_and_pick(&app, "transportes sur").await;

        let approve = serde_json::json!({
            "status": "aprobado",
            "actor_id": "v-1",
            "role": "validador"
        });
        let response = post_json(
            &app,
            &format!("/v1/productions/{production_id}/transition"),
            approve,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let reopen = serde_json::json!({
            "status": "en_revision",
            "actor_id": "v-1",
            "role": "validador"
        });
        let response = post_json(
            &app,
            &format!("/v1/productions/{production_id}/transition"),
            reopen.clone(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin_reopen = serde_json::json!({
            "status": "en_revision",
            "actor_id": "a-1",
            "role": "administrador"
        });
        let response = post_json(
            &app,
            &format!("/v1/productions/{production_id}/transition"),
            admin_reopen,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_production_is_not_found() {
        let app = test_app().await;
        let response = post_json(
            &app,
            "/v1/productions/missing-id/transition",
            serde_json::json!({
                "status": "aprobado",
                "actor_id": "v-1",
                "role": "validador"
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recent_periods_listing_is_bounded() {
        let app = test_app().await;

        let response = get_uri(&app, "/v1/periods/recent?months=2").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 6);

        let response = get_uri(&app, "/v1/periods/recent?months=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
