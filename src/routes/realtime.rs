use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{extract::State, Router};
use futures::Stream;

use crate::constants::MAX_SSE_CONNECTIONS;
use crate::response::AppError;
use crate::state::AppState;

static SSE_CONNECTION_COUNT: AtomicUsize = AtomicUsize::new(0);

struct SseGuard;
impl Drop for SseGuard {
    fn drop(&mut self) {
        SSE_CONNECTION_COUNT.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(sse_handler))
}

/// Pushes a `snapshot` event for the current state, then one per published
/// tick. Slow clients only ever see the newest snapshot.
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let current = SSE_CONNECTION_COUNT.fetch_add(1, Ordering::SeqCst);
    if current >= MAX_SSE_CONNECTIONS {
        SSE_CONNECTION_COUNT.fetch_sub(1, Ordering::SeqCst);
        return Err(AppError::too_many_requests("Too many SSE connections"));
    }
    let guard = SseGuard;

    let mut shutdown_rx = state.shutdown_rx();
    let mut snapshot_rx = state.snapshot_rx();

    let stream = async_stream::stream! {
        let _guard = guard;
        loop {
            let snapshot = snapshot_rx.borrow_and_update().clone();
            if let Ok(json) = serde_json::to_string(&snapshot) {
                yield Ok(Event::default().event("snapshot").data(json));
            }

            tokio::select! {
                changed = snapshot_rx.changed() => {
                    // 采样循环结束，发送端已释放
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
