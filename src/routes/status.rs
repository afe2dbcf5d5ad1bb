//! Read-only views over the latest monitor snapshot.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/history", get(history))
        .route("/stats", get(stats))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.snapshot())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// Most recent points, oldest first. `limit` keeps only the last N.
async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut points = state.snapshot().history;
    if let Some(limit) = query.limit {
        if limit == 0 {
            return Err(AppError::bad_request(
                "INVALID_LIMIT",
                "limit must be at least 1",
            ));
        }
        if points.len() > limit {
            points.drain(..points.len() - limit);
        }
    }
    Ok(ok(serde_json::json!({
        "count": points.len(),
        "points": points,
    })))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot();
    let detector = &state.config().detector;
    let sampler = &state.config().sampler;

    ok(serde_json::json!({
        "uptimeSecs": state.uptime_secs(),
        "elapsedSecs": snapshot.elapsed_secs,
        "session": snapshot.stats,
        "detector": {
            "thresholdHigh": detector.threshold_high,
            "thresholdLow": detector.threshold_low,
            "polarity": detector.polarity,
            "sustainedOpenSecs": detector.sustained_open_secs,
            "cooldownSecs": detector.cooldown_secs,
        },
        "sampler": {
            "sampleRate": sampler.sample_rate,
            "metric": sampler.metric.as_str(),
            "smoothingWindow": sampler.smoothing_window,
            "historyCapacity": sampler.history_capacity,
            "sessionDurationMins": sampler.session_duration_mins,
        },
    }))
}
