//! HTTP router

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, Request, State},
    middleware,
    response::Response,
};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};

use super::auth::auth_middleware;
use super::handlers::dispatch;
use crate::authz::Authorizer;
use crate::mtls::UserDn;
use crate::predict::Predictor;
use crate::verbosity::Verbosity;

/// Shared application state
pub struct AppState {
    /// Allowlist cache and admission decision
    pub authorizer: Arc<Authorizer>,
    /// Model behind the `predict` endpoint
    pub predictor: Arc<dyn Predictor>,
    /// Runtime verbosity
    pub verbosity: Arc<Verbosity>,
    /// Directory served under `/models/` and by `data?model=`
    pub model_dir: PathBuf,
    /// Maximum accepted request body size
    pub max_body_bytes: usize,
}

/// Create the router
///
/// `/models/...` serves the model directory read-only (no listings); every
/// other path is dispatched on its last segment. Both sit behind the
/// authorization middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    let models = ServeDir::new(&state.model_dir).append_index_html_on_directories(false);

    Router::new()
        .nest_service("/models", models)
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_handler(
    State(state): State<Arc<AppState>>,
    Extension(dn): Extension<UserDn>,
    request: Request,
) -> Response {
    dispatch(state, dn, request).await
}
