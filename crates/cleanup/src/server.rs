//! `FinalizeCleanup` notification endpoint.
//!
//! One procedure path serves two protocols:
//! - Connect unary: `POST` with a JSON (`application/json`) or binary
//!   (`application/proto`) `FinalizeCleanupRequest`, which carries no fields.
//! - gRPC: `application/grpc` requests are handed to a tonic unary service, so
//!   callers get a framed response and `grpc-status` trailers.

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tonic::codegen::BoxFuture;
use tonic::server::{Grpc, UnaryService};
use tonic::Status;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::CleanupError;
use crate::signal::FinalizeSignal;

/// Procedure path for `cleanup.v1.CleanupService/FinalizeCleanup`.
pub const FINALIZE_CLEANUP_PATH: &str = "/cleanup.v1.CleanupService/FinalizeCleanup";

const PROTO_CONTENT_TYPE: &str = "application/proto";
const GRPC_CONTENT_TYPE: &str = "application/grpc";
const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web";

/// `cleanup.v1.FinalizeCleanupRequest`
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct FinalizeCleanupRequest {}

/// `cleanup.v1.FinalizeCleanupResponse`
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct FinalizeCleanupResponse {}

/// Connect protocol error body.
#[derive(Debug, Serialize)]
struct ConnectError {
    code: &'static str,
    message: String,
}

impl ConnectError {
    fn failed_precondition(err: &CleanupError) -> Response {
        let body = Self {
            code: "failed_precondition",
            message: err.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Unary gRPC handler for `FinalizeCleanup`.
#[derive(Clone)]
struct FinalizeCleanupService {
    signal: FinalizeSignal,
}

impl UnaryService<FinalizeCleanupRequest> for FinalizeCleanupService {
    type Response = FinalizeCleanupResponse;
    type Future = BoxFuture<tonic::Response<FinalizeCleanupResponse>, Status>;

    fn call(&mut self, _request: tonic::Request<FinalizeCleanupRequest>) -> Self::Future {
        let signal = self.signal.clone();
        Box::pin(async move {
            signal.notify().await.map_err(|err| {
                warn!(error = %err, protocol = "grpc", "rejected FinalizeCleanup request");
                Status::failed_precondition(err.to_string())
            })?;
            Ok(tonic::Response::new(FinalizeCleanupResponse {}))
        })
    }
}

/// Builds the notification router.
pub fn router(signal: FinalizeSignal) -> Router {
    Router::new()
        .route(FINALIZE_CLEANUP_PATH, post(finalize_cleanup))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(signal)
}

/// Serves the router on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, signal: FinalizeSignal, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "FinalizeCleanup server listening");
    axum::serve(listener, router(signal))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("FinalizeCleanup server stopped");
    Ok(())
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Matches `application/grpc`, `application/grpc+proto` and parameterised forms,
/// but not gRPC-Web.
fn is_grpc(content_type: &str) -> bool {
    content_type
        .strip_prefix(GRPC_CONTENT_TYPE)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('+') || rest.starts_with(';'))
}

async fn finalize_cleanup(State(signal): State<FinalizeSignal>, request: Request) -> Response {
    let content_type = content_type(request.headers());
    if content_type.starts_with(GRPC_WEB_CONTENT_TYPE) {
        warn!(content_type, "unsupported FinalizeCleanup content type");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }
    let grpc = is_grpc(content_type);
    let is_proto = content_type.starts_with(PROTO_CONTENT_TYPE);

    info!("Received FinalizeCleanup request");
    if grpc {
        let mut grpc = Grpc::new(tonic_prost::ProstCodec::<
            FinalizeCleanupResponse,
            FinalizeCleanupRequest,
        >::default());
        return grpc
            .unary(FinalizeCleanupService { signal }, request)
            .await
            .map(Body::new);
    }

    if let Err(err) = signal.notify().await {
        warn!(error = %err, protocol = "connect", "rejected FinalizeCleanup request");
        return ConnectError::failed_precondition(&err);
    }

    if is_proto {
        // An empty FinalizeCleanupResponse encodes to zero bytes
        ([(header::CONTENT_TYPE, PROTO_CONTENT_TYPE)], Vec::<u8>::new()).into_response()
    } else {
        Json(serde_json::json!({})).into_response()
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
