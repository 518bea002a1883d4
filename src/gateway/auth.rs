//! Certificate-based authorization middleware.
//!
//! Every request, static files included, passes through
//! [`auth_middleware`]. The peer chain recorded by the TLS acceptor is handed
//! to the [`Authorizer`]; an admitted caller's [`UserDn`] is inserted into
//! the request extensions for downstream handlers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::router::AppState;
use crate::authz::AuthDecision;
use crate::mtls::{PeerCertificates, UserDn};

/// Body of every 403 answer.
pub const FORBIDDEN_MESSAGE: &str = "You are not allowed to access this resource";

/// Authorization middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let chain = request
        .extensions()
        .get::<PeerCertificates>()
        .cloned()
        .unwrap_or_default();

    match state.authorizer.authorize(chain.as_slice()).await {
        AuthDecision::Allowed(dn) => {
            debug!(dn = %dn, path = %request.uri().path(), "Authorized request");
            request.extensions_mut().insert::<UserDn>(dn);
            next.run(request).await
        }
        AuthDecision::Denied => forbidden_response(),
    }
}

/// 403 with the plain-text refusal message.
pub fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        FORBIDDEN_MESSAGE,
    )
        .into_response()
}
