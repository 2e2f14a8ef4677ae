use axum::routing::any;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::dispatcher::dispatch;
use crate::state::AppState;

/// Build the blob router. Every method on every path goes to the dispatcher,
/// which owns validation and method handling.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(dispatch))
        .route("/*key", any(dispatch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
