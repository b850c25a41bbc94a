use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shopsync_core::db::JobFilter;
use shopsync_core::diff::OverrideStatus;
use shopsync_core::models::{Direction, InternalId, JobStatus, TriggerKind, ValidationFinding};
use shopsync_core::shop::HttpShopTransport;
use shopsync_core::{JobId, ProductId, ShopId, SyncJob, SyncOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, token_matches};
use crate::config::AppConfig;
use crate::error::AppError;

const MAX_JOB_LIST: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    orchestrator: Arc<SyncOrchestrator<HttpShopTransport>>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, orchestrator: SyncOrchestrator<HttpShopTransport>) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync", post(request_sync))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(job_status))
        .route(
            "/products/{product}/shops/{shop}/override-status",
            get(override_status),
        )
        .route(
            "/products/{product}/shops/{shop}/override",
            put(edit_override),
        )
        .route("/products/{product}/shops/{shop}/findings", get(findings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.api_token.as_deref() {
        let token = extract_bearer_token(request.headers())?;
        if !token_matches(token, expected) {
            return Err(AppError::unauthorized("Invalid API token"));
        }
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    product_id: ProductId,
    shop_id: ShopId,
    #[serde(default = "default_direction")]
    direction: Direction,
    #[serde(default = "default_trigger")]
    trigger: TriggerKind,
}

const fn default_direction() -> Direction {
    Direction::Push
}

const fn default_trigger() -> TriggerKind {
    TriggerKind::Auto
}

async fn request_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<(StatusCode, Json<SyncJob>), AppError> {
    let job = state
        .orchestrator
        .request_sync(
            request.product_id,
            request.shop_id,
            request.direction,
            request.trigger,
        )
        .await?;
    tracing::info!(
        endpoint = "sync",
        job_id = %job.id,
        product_id = %request.product_id,
        shop_id = %request.shop_id,
        "Accepted sync request"
    );
    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncJob>, AppError> {
    let id: JobId = id
        .parse()
        .map_err(|error| AppError::bad_request(format!("invalid job id: {error}")))?;
    Ok(Json(state.orchestrator.get_job_status(&id).await?))
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    status: Option<String>,
    product: Option<i64>,
    shop: Option<i64>,
    limit: Option<usize>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<SyncJob>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(AppError::bad_request)?;
    let filter = JobFilter {
        status,
        product_id: query.product.map(ProductId::new),
        shop_id: query.shop.map(ShopId::new),
        limit: query.limit.unwrap_or(20).min(MAX_JOB_LIST),
    };
    Ok(Json(state.orchestrator.list_jobs(&filter).await?))
}

async fn override_status(
    State(state): State<AppState>,
    Path((product, shop)): Path<(i64, i64)>,
) -> Result<Json<OverrideStatus>, AppError> {
    let status = state
        .orchestrator
        .get_override_status(ProductId::new(product), ShopId::new(shop))
        .await?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct OverrideEditRequest {
    items: Vec<InternalId>,
    #[serde(default)]
    primary: Option<InternalId>,
}

async fn edit_override(
    State(state): State<AppState>,
    Path((product, shop)): Path<(i64, i64)>,
    Json(request): Json<OverrideEditRequest>,
) -> Result<(StatusCode, Json<SyncJob>), AppError> {
    let product_id = ProductId::new(product);
    let shop_id = ShopId::new(shop);
    let job = state
        .orchestrator
        .request_override_edit(product_id, shop_id, request.items, request.primary)
        .await?;
    tracing::info!(
        endpoint = "override",
        job_id = %job.id,
        %product_id,
        %shop_id,
        "Accepted category override edit"
    );
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[derive(Debug, Serialize)]
struct FindingsResponse {
    product_id: ProductId,
    shop_id: ShopId,
    findings: Vec<ValidationFinding>,
}

async fn findings(
    State(state): State<AppState>,
    Path((product, shop)): Path<(i64, i64)>,
) -> Result<Json<FindingsResponse>, AppError> {
    let product_id = ProductId::new(product);
    let shop_id = ShopId::new(shop);
    let findings = state
        .orchestrator
        .get_validation_findings(product_id, shop_id)
        .await?;
    Ok(Json(FindingsResponse {
        product_id,
        shop_id,
        findings,
    }))
}
