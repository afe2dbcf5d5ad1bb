use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::response::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

pub async fn health_check(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let snapshot = state.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "source": {
            "healthy": snapshot.source_healthy,
            "facePresent": snapshot.face_present,
            "ticks": snapshot.stats.ticks,
            "skippedTicks": snapshot.stats.skipped_ticks,
        }
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// 至少处理过一帧且数据源当前正常才算就绪
pub async fn readiness(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let snapshot = state.snapshot();
    if snapshot.tick == 0 {
        return Err(AppError::service_unavailable("No frames processed yet"));
    }
    if !snapshot.source_healthy {
        return Err(AppError::service_unavailable("Landmark source unavailable"));
    }
    Ok(StatusCode::OK)
}
