//! Endpoint handlers, selected by the last path segment.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Query, Request, rejection::QueryRejection},
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use prost::Message;
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, error, info, warn};

use super::router::AppState;
use crate::mtls::UserDn;
use crate::predict::Hits;

/// Content type of `predict` responses.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Endpoint selected by the final path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `.../data`
    Data,
    /// `.../predict`
    Predict,
    /// `.../verbose`
    Verbose,
    /// Anything else, root included
    Default,
}

impl Endpoint {
    /// Classify a request path.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('/').next().unwrap_or_default() {
            "data" => Self::Data,
            "predict" => Self::Predict,
            "verbose" => Self::Verbose,
            _ => Self::Default,
        }
    }
}

/// Route an authorized request to its endpoint.
pub async fn dispatch(state: Arc<AppState>, dn: UserDn, request: Request) -> Response {
    match Endpoint::from_path(request.uri().path()) {
        Endpoint::Data => data_handler(&state, request).await,
        Endpoint::Predict => predict_handler(&state, request).await,
        Endpoint::Verbose => verbose_handler(&state, request).await,
        Endpoint::Default => default_handler(&dn),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// data
// ─────────────────────────────────────────────────────────────────────────────

/// First value of the `model` query parameter; later repeats are ignored.
fn model_param(uri: &Uri) -> Result<Option<String>, QueryRejection> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri)?;
    Ok(pairs
        .into_iter()
        .find_map(|(key, value)| (key == "model").then_some(value)))
}

/// Serve a model file named by the `model` query parameter.
///
/// 200 with the file (conditional and range requests honoured), 204 when no
/// such file exists (an empty name included), 400 when the parameter is
/// missing or escapes the serving directory.
async fn data_handler(state: &AppState, request: Request) -> Response {
    let model = match model_param(request.uri()) {
        Ok(Some(model)) => model,
        Ok(None) => return StatusCode::BAD_REQUEST.into_response(),
        Err(e) => {
            debug!(error = %e, "Malformed data query");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if model.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let Some(path) = resolve_model_path(&state.model_dir, &model) else {
        warn!(model = %model, "Rejected model path outside serving directory");
        return StatusCode::BAD_REQUEST.into_response();
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return StatusCode::NO_CONTENT.into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return StatusCode::NO_CONTENT.into_response();
        }
        Err(e) => {
            error!(file = %path.display(), error = %e, "Unable to stat model file");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Join `model` onto `dir` if it is a plain relative path.
///
/// Empty, absolute, and `..`-bearing values are refused.
#[must_use]
pub fn resolve_model_path(dir: &Path, model: &str) -> Option<PathBuf> {
    let relative = Path::new(model);
    if model.is_empty() || relative.is_absolute() {
        return None;
    }
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    plain.then(|| dir.join(relative))
}

// ─────────────────────────────────────────────────────────────────────────────
// predict
// ─────────────────────────────────────────────────────────────────────────────

async fn predict_handler(state: &AppState, request: Request) -> Response {
    if request.method() != Method::POST {
        error!(method = %request.method(), "predict called with unsupported method");
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let body = match Bytes::from_request(request, &()).await {
        Ok(body) => body,
        Err(rejection) => {
            error!(error = %rejection, "Unable to read prediction input");
            return rejection.into_response();
        }
    };

    let hits = match Hits::from_bytes(&body) {
        Ok(hits) => hits,
        Err(e) => {
            error!(error = %e, "Unable to decode Hits");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if state.verbosity.is_verbose() {
        info!(rows = hits.hits.len(), data = ?hits, "Received prediction input");
    }

    match state.predictor.predict(&hits).await {
        Ok(predictions) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
            predictions.encode_to_vec(),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Prediction failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// verbose
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerboseRequest {
    #[serde(default)]
    level: i32,
}

/// Set the verbosity level; always 200 for POST.
async fn verbose_handler(state: &AppState, request: Request) -> Response {
    if request.method() != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    match Bytes::from_request(request, &()).await {
        Ok(body) => match serde_json::from_slice::<VerboseRequest>(&body) {
            Ok(VerboseRequest { level }) => state.verbosity.set(level),
            Err(e) => warn!(error = %e, "Ignoring malformed verbosity request"),
        },
        Err(rejection) => warn!(error = %rejection, "Unable to read verbosity request"),
    }

    StatusCode::OK.into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// default
// ─────────────────────────────────────────────────────────────────────────────

fn default_handler(dn: &UserDn) -> Response {
    (StatusCode::OK, format!("Hello {dn}")).into_response()
}
