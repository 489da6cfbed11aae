//! Local HTTP front for the worker, used by `aqua serve`.
//!
//! Every request is handed to the worker as an [`AssetRequest`]; GETs are
//! answered cache-first, everything else goes to the upstream.

use super::WorkerHandle;
use super::fetch::{AssetRequest, FetchError};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use color_eyre::eyre::{Result, WrapErr};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub fn build_router(handle: WorkerHandle) -> Router {
    Router::new().fallback(proxy).with_state(handle)
}

async fn proxy(
    State(handle): State<WorkerHandle>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());
    let mut request = AssetRequest::get(path).with_method(method.as_str());
    if !body.is_empty() {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream");
        request = request.with_body(content_type, body.to_vec());
    }

    debug!(target: "worker", method = %request.method, path = %request.path, "proxy request");
    match handle.fetch(request).await {
        Ok(asset) => {
            let status = StatusCode::from_u16(asset.status).unwrap_or(StatusCode::OK);
            let mut response = (status, Body::from(asset.body)).into_response();
            if let Some(ct) = asset.content_type
                && let Ok(value) = HeaderValue::from_str(&ct)
            {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Err(FetchError::WorkerGone) => {
            (StatusCode::SERVICE_UNAVAILABLE, FetchError::WorkerGone.to_string()).into_response()
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// Serve on `addr` until `cancel` fires.
pub async fn serve(addr: SocketAddr, handle: WorkerHandle, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!(target: "worker", %addr, "serving assets");

    axum::serve(listener, build_router(handle))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .wrap_err("asset server failed")?;
    Ok(())
}
