//! Per-request entry point for blob operations.
//!
//! Every request gets a correlation id, has its path validated before
//! anything else, and is then routed by method:
//!
//! | Method | Success | Failure |
//! |---|---|---|
//! | GET | 200 + body | 400, 404, 500 |
//! | PUT | 201 new / 200 replaced | 400, 500 |
//! | DELETE | 204 | 400, 404, 500 |
//! | other | - | 400 |

use std::io;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use blob_manifest::StoreOutcome;
use blob_types::BlobPath;
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{error, info, info_span, warn, Instrument};

use crate::auth::{Action, Credentials};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Response header echoing the request's correlation id.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Handle one blob request.
///
/// `key` is the percent-decoded path after the leading `/`; it is absent for
/// the bare root and for paths that do not decode to UTF-8.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    key: Option<Path<String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let raw = key.map(|Path(key)| key).unwrap_or_default();
    let span = info_span!("request", request_id = %request_id, %method, path = %raw);

    async move {
        info!("request received");
        let mut response = match handle(&state, &method, &raw, &headers, body).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                } else {
                    info!(error = %e, "request rejected");
                }
                e.into_response()
            }
        };
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
        }
        info!(status = response.status().as_u16(), "request completed");
        response
    }
    .instrument(span)
    .await
}

async fn handle(
    state: &AppState,
    method: &Method,
    raw: &str,
    headers: &HeaderMap,
    body: Body,
) -> ServerResult<Response> {
    let path = state.validator.validate(raw)?;

    let action = match *method {
        Method::GET => Action::Read { path: path.clone() },
        Method::PUT => Action::Write { path: path.clone() },
        Method::DELETE => Action::Delete { path: path.clone() },
        _ => return Err(ServerError::UnsupportedMethod(method.to_string())),
    };
    authorize(state, headers, &action).await?;

    match action {
        Action::Read { .. } => retrieve(state, path).await,
        Action::Write { .. } => store(state, path, headers, body).await,
        Action::Delete { .. } => delete(state, path).await,
    }
}

async fn authorize(state: &AppState, headers: &HeaderMap, action: &Action) -> ServerResult<()> {
    let credentials = Credentials::from_headers(headers);
    let identity = state.clients.authenticate(&credentials).await?;
    if state.clients.authorize(&identity, action).await? {
        Ok(())
    } else {
        Err(ServerError::AuthorizationDenied {
            identity: identity.name,
            action: action.to_string(),
        })
    }
}

async fn retrieve(state: &AppState, path: BlobPath) -> ServerResult<Response> {
    let Some((entry, reader)) = state.manifest.open_blob(&path).await? else {
        return Err(ServerError::NotFound(path.to_string()));
    };

    // Headers are committed once the body starts; a read error after that
    // can only abort the connection.
    let id = entry.id;
    let stream = ReaderStream::new(reader)
        .inspect_err(move |e| warn!(id = %id.short_hex(), error = %e, "blob read failed mid-stream"));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_LENGTH, entry.size);
    if !entry.mime_type.is_empty() {
        builder = builder.header(CONTENT_TYPE, entry.mime_type.as_str());
    }
    if !entry.sha256.is_empty() {
        builder = builder.header(ETAG, format!("\"{}\"", entry.sha256));
    }
    info!(id = %entry.id.short_hex(), size = entry.size, "streaming blob");
    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn store(
    state: &AppState,
    path: BlobPath,
    headers: &HeaderMap,
    body: Body,
) -> ServerResult<Response> {
    let mime_type = single_content_type(headers);
    let mut reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));

    let (entry, outcome) = state.manifest.store(path, mime_type, &mut reader).await?;
    info!(id = %entry.id.short_hex(), size = entry.size, ?outcome, "blob stored");

    let status = match outcome {
        StoreOutcome::Created => StatusCode::CREATED,
        StoreOutcome::Replaced => StatusCode::OK,
    };
    Ok(status.into_response())
}

async fn delete(state: &AppState, path: BlobPath) -> ServerResult<Response> {
    if state.manifest.remove(&path).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ServerError::NotFound(path.to_string()))
    }
}

/// The request's `Content-Type`, or empty when absent, repeated, or not
/// visible ASCII.
fn single_content_type(headers: &HeaderMap) -> String {
    let mut values = headers.get_all(CONTENT_TYPE).iter();
    match (values.next(), values.next()) {
        (Some(value), None) => value.to_str().map(str::to_owned).unwrap_or_default(),
        _ => String::new(),
    }
}
