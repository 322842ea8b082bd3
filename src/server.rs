use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::app::validation::schema_errors;
use crate::app::{RetrieveUseCase, Services};
use crate::error::RefineryError;
use crate::observability::metrics;
use crate::rate_limiter::KeyRateLimiter;
use crate::types::InputRecord;

const API_KEY_HEADER: &str = "api-key";

#[derive(Clone)]
pub struct AppState {
    services: Arc<Services>,
    limiter: KeyRateLimiter,
    auth_token: Arc<str>,
}

impl AppState {
    pub fn new(services: Arc<Services>, auth_token: &str, rate_limit_per_minute: u32) -> Self {
        Self {
            services,
            limiter: KeyRateLimiter::new(rate_limit_per_minute),
            auth_token: Arc::from(auth_token),
        }
    }
}

/// Response body shared by every endpoint.
#[derive(Debug, Serialize)]
struct Envelope {
    status: &'static str,
    message: String,
    data: Value,
}

fn respond(route: &'static str, code: StatusCode, message: impl Into<String>, data: Value) -> Response {
    metrics::http::request(route, code.as_u16());
    let status = if code.is_success() { "success" } else { "error" };
    let body = Envelope {
        status,
        message: message.into(),
        data,
    };
    (code, Json(body)).into_response()
}

/// Health check endpoint
async fn health() -> Response {
    respond(
        "/health",
        StatusCode::OK,
        "Service healthy",
        json!({ "time": chrono::Utc::now().to_rfc3339() }),
    )
}

async fn optimize(State(state): State<AppState>, body: Bytes) -> Response {
    const ROUTE: &str = "/optimize";

    let instance: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return respond(
                ROUTE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error",
                json!([{ "field": "body", "message": e.to_string() }]),
            )
        }
    };
    match schema_errors(&instance) {
        Ok(errors) if !errors.is_empty() => {
            return respond(
                ROUTE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error",
                json!(errors),
            )
        }
        Ok(_) => {}
        Err(e) => {
            error!("Record schema unavailable: {}", e);
            return respond(ROUTE, StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), Value::Null);
        }
    }
    // Already schema-checked; only decode
    let records: Vec<InputRecord> = match serde_json::from_value(instance) {
        Ok(r) => r,
        Err(e) => {
            return respond(
                ROUTE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error",
                json!([{ "field": "body", "message": e.to_string() }]),
            )
        }
    };

    match state.services.optimize.execute(&records).await {
        Ok(summary) => respond(
            ROUTE,
            StatusCode::OK,
            "Workflow completed successfully",
            json!({
                "batch_id": summary.batch_id,
                "total_records": summary.total_records,
                "refined": summary.refined,
                "failed": summary.failed,
            }),
        ),
        Err(e) => {
            error!("Workflow failed: {}", e);
            respond(ROUTE, StatusCode::BAD_REQUEST, format!("Workflow failed: {}", e), Value::Null)
        }
    }
}

fn parse_param(params: &HashMap<String, String>, name: &str) -> Result<Option<usize>, String> {
    params
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .map_err(|_| format!("{} must be a positive integer", name))
        })
        .transpose()
}

async fn retrieve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    const ROUTE: &str = "/retrieve";

    let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let api_key = match api_key {
        Some(key) if !state.auth_token.is_empty() && key == &*state.auth_token => key,
        _ => {
            return respond(
                ROUTE,
                StatusCode::UNAUTHORIZED,
                "Invalid or unauthorized Api key.",
                Value::Null,
            )
        }
    };
    if !state.limiter.check(api_key).await {
        warn!("Rate limit exceeded for retrieve");
        metrics::http::rate_limited();
        return respond(ROUTE, StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded", Value::Null);
    }

    let parsed = parse_param(&params, "page").and_then(|page| {
        parse_param(&params, "per_page").map(|per_page| (page, per_page))
    });
    let (page, per_page) = match parsed
        .map_err(RefineryError::Validation)
        .and_then(|(page, per_page)| RetrieveUseCase::page_params(page, per_page))
    {
        Ok(p) => p,
        Err(e) => {
            return respond(
                ROUTE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error",
                json!([{ "field": "query", "message": e.to_string() }]),
            )
        }
    };

    match state.services.retrieve.execute(page, per_page) {
        Ok(Some(page)) => respond(ROUTE, StatusCode::OK, "Final records retrieved", json!(page)),
        Ok(None) => respond(ROUTE, StatusCode::OK, "No records found", json!([])),
        Err(e) => {
            error!("Failed to retrieve records: {}", e);
            respond(
                ROUTE,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to retrieve records: {}", e),
                Value::Null,
            )
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/optimize", post(optimize))
        .route("/retrieve", get(retrieve))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{}", port);
    info!("Health check: http://localhost:{}/health", port);

    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
