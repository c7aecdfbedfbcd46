//! HTTP surface: a thin axum router over [`AskService`].

use std::sync::Arc;
use std::time::Instant;

use askpage_core::AskService;
use askpage_shared::{AskPageError, FetchRequest};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use color_eyre::eyre::{Result, eyre};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const ENDPOINTS: &[&str] = &[
    "GET /health - health check",
    "GET /api/status - service status",
    "GET /api/domains - allowed domains",
    "POST /api/ask - ask a question about a page",
];

/// Shared application state.
#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<AskService>,
    started_at: Instant,
}

/// Build the router with CORS and request tracing.
pub(crate) fn router(service: Arc<AskService>) -> Router {
    let cors = cors_layer(&service.config().server.cors_origins);
    let state = AppState {
        service,
        started_at: Instant::now(),
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/domains", get(domains_handler))
        .route("/api/ask", post(ask_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub(crate) async fn serve(service: Arc<AskService>, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("failed to bind {addr}: {e}"))?;

    info!(%addr, "askpage server listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Any origin when the list is empty, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "askpage server is running",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS,
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let config = state.service.config();
    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "allowedDomains": state.service.validator().domains().len(),
        "llmProviders": state.service.composer().provider_names(),
        "protocol": {
            "enabled": config.fetch.protocol_enabled,
            "command": config.fetch.protocol_command,
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn domains_handler(State(state): State<AppState>) -> Json<Value> {
    let domains = state.service.validator().domains();
    Json(json!({
        "domains": domains,
        "count": domains.len(),
    }))
}

async fn ask_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let expose_internal = state.service.config().server.expose_internal_errors;

    let result = async {
        let body: Value = serde_json::from_slice(&body)
            .map_err(|_| AskPageError::validation("request body must be valid JSON"))?;
        let request = FetchRequest::from_json(body, &state.service.config().policy)?;
        state
            .service
            .ask_request(request, &askpage_core::SilentProgress)
            .await
    }
    .await;

    match result {
        Ok(answer) => Json(json!({ "success": true, "data": answer })).into_response(),
        Err(error) => ApiError {
            error,
            expose_internal,
        }
        .into_response(),
    }
}

async fn not_found_handler(uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "not found",
            "path": uri.path(),
            "availableEndpoints": ENDPOINTS,
        })),
    )
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct ApiError {
    error: AskPageError,
    expose_internal: bool,
}

fn status_for(error: &AskPageError) -> StatusCode {
    match error {
        AskPageError::Validation { .. } | AskPageError::UrlNotPermitted { .. } => {
            StatusCode::BAD_REQUEST
        }
        AskPageError::Fetch(_) => StatusCode::BAD_GATEWAY,
        AskPageError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let kind = self.error.kind();

        if status.is_server_error() {
            error!(%status, kind, error = %self.error, "ask failed");
        } else {
            warn!(%status, kind, error = %self.error, "ask rejected");
        }

        let message = if self.error.is_caller_facing() || self.expose_internal {
            self.error.to_string()
        } else if matches!(self.error, AskPageError::Processing { .. }) {
            "content could not be processed".to_string()
        } else {
            "internal server error".to_string()
        };

        (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "kind": kind,
            })),
        )
            .into_response()
    }
}
