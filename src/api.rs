//! Consumer read surface: cached matches, pooled predictions, on-demand analysis.

use crate::cache::MatchCache;
use crate::engine::PredictionEngine;
use crate::error::PipelineError;
use crate::health::HealthState;
use crate::pool::PredictionPool;
use crate::registry::SourceRegistry;
use crate::types::{AnalysisRequest, MatchAnalysis, MatchWithOdds, Prediction, PredictionCategory};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MatchCache>,
    pub pool: Arc<PredictionPool>,
    pub engine: Arc<PredictionEngine>,
    pub registry: Arc<SourceRegistry>,
    pub health: HealthState,
    /// Required as a bearer token to change the source list
    pub admin_token: Option<Arc<str>>,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        let body = json!({
            "error": self.code(),
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, PipelineError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/matches", get(list_matches))
        .route("/api/predictions/:category", get(draw_prediction))
        .route("/api/analyze", axum::routing::post(analyze))
        .route("/api/sources", get(list_sources).put(replace_sources))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let counts = match state.pool.counts().await {
        Ok(counts) => Some(counts),
        Err(e) => {
            warn!("Pool counts unavailable: {}", e);
            None
        }
    };
    let (status, body) = state.health.report(counts).await;
    (status, Json(body))
}

async fn list_matches(State(state): State<AppState>) -> ApiResult<Vec<MatchWithOdds>> {
    Ok(Json(state.cache.read().await?))
}

async fn draw_prediction(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Prediction> {
    let category: PredictionCategory = category.parse().map_err(PipelineError::InvalidRequest)?;
    Ok(Json(state.pool.draw(category).await?))
}

async fn analyze(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<MatchAnalysis> {
    let Json(request) = payload.map_err(|e| PipelineError::InvalidRequest(e.body_text()))?;
    Ok(Json(state.engine.analyze_match(&request).await?))
}

#[derive(Debug, Serialize, Deserialize)]
struct SourceList {
    urls: Vec<String>,
}

async fn list_sources(State(state): State<AppState>) -> ApiResult<SourceList> {
    Ok(Json(SourceList { urls: state.registry.list().await? }))
}

/// The source list points the browser at arbitrary URLs, so changing it needs
/// the admin token. With no token configured the route is closed.
fn authorize_admin(headers: &HeaderMap, admin_token: Option<&str>) -> Result<(), PipelineError> {
    let Some(expected) = admin_token else {
        return Err(PipelineError::Forbidden(
            "source list changes are disabled (ADMIN_TOKEN not set)".to_string(),
        ));
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if presented != Some(expected) {
        return Err(PipelineError::Forbidden("invalid admin token".to_string()));
    }
    Ok(())
}

async fn replace_sources(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SourceList>, JsonRejection>,
) -> ApiResult<SourceList> {
    authorize_admin(&headers, state.admin_token.as_deref())?;
    let Json(body) = payload.map_err(|e| PipelineError::InvalidRequest(e.body_text()))?;
    let urls = state.registry.replace(&body.urls).await?;
    Ok(Json(SourceList { urls }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_code_and_message() {
        let response = PipelineError::EmptyPool(PredictionCategory::Single).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = PipelineError::InsufficientData {
            category: PredictionCategory::Express3,
            required: 3,
            available: 2,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
        headers
    }

    #[test]
    fn source_changes_need_the_admin_token() {
        assert!(authorize_admin(&bearer("s3cret"), Some("s3cret")).is_ok());

        let err = authorize_admin(&bearer("guess"), Some("s3cret")).unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert!(authorize_admin(&HeaderMap::new(), Some("s3cret")).is_err());

        // No token configured: closed to everyone
        let err = authorize_admin(&bearer("anything"), None).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
