pub mod health;
pub mod realtime;
pub mod status;

use std::any::Any;

use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::response::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(status::router())
        .merge(realtime::router());

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

async fn fallback_404() -> AppError {
    AppError::not_found("Not found")
}

/// handler panic 转为脱敏后的 500 JSON
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::internal(&format!("Handler panicked: {detail}")).into_response()
}
