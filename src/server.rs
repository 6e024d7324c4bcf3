use anyhow::Result;
use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, Method, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gateway::Gateway;
use crate::types::{AnalysisRequest, ErrorBody, HealthResponse};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

/// Routes of the public API, with tracing and CORS applied.
pub fn router(state: AppState, cors_origins: &[String]) -> Result<Router> {
    let origins = cors_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(API_KEY_HEADER),
        ]);

    Ok(Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn index_handler() -> Json<Value> {
    Json(json!({
        "message": "Sentiment & Emotion Analysis API",
        "endpoints": {
            "/analyze": "POST - анализ текста",
            "/health": "GET - проверка статуса",
            "/metrics": "GET - метрики Prometheus"
        }
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

#[tracing::instrument(skip_all)]
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response {
    let presented_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    // The key is checked before the body so bad credentials always get a 403.
    if let Err(err) = state.gateway.authorize(presented_key) {
        return err.into_response();
    }

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed analysis request");
            let body = ErrorBody {
                detail: rejection.body_text(),
            };
            return (rejection.status(), Json(body)).into_response();
        }
    };

    match state.gateway.handle(&request, presented_key).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}
