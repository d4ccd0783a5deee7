//! HTTP server: middleware stack, listener, and graceful shutdown.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    BoxError, Router,
    body::{Body, Bytes, HttpBody},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::{self, ApiError, AppState};
use crate::breeds::{BreedCache, BreedClient};
use crate::config::{Config, Env};
use crate::storage::Storage;

/// Timeout for a single upstream breed fetch.
pub const BREED_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the served application: the API router behind the middleware.
pub fn app(state: AppState, env: Env, timeout: Duration) -> Router {
    with_middleware(api::router(state), env, timeout)
}

/// Outermost first: request id assignment and propagation, tracing, the
/// error envelope for timeouts, timeout, panic recovery.
fn with_middleware(router: Router, env: Env, timeout: Duration) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(middleware::map_response(timeout_envelope))
        .layer(
            TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    env = env.as_str(),
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = message, "handler panicked");
    ApiError::internal().into_response()
}

/// Handlers never answer 408 themselves, so a 408 here came from the
/// timeout layer with an empty body.
async fn timeout_envelope<B>(response: Response<B>) -> Response
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        tracing::warn!("request timed out");
        return ApiError::new(StatusCode::REQUEST_TIMEOUT, "request timed out").into_response();
    }
    response.map(Body::new)
}

/// Opens storage, starts the breed refresher, and serves until Ctrl-C.
pub async fn run(config: &Config) -> Result<(), String> {
    let storage = Storage::open(&config.storage_path).map_err(|e| {
        format!(
            "failed to open storage at {}: {e}",
            config.storage_path.display()
        )
    })?;

    let breeds = BreedCache::seeded(config.breeds.seed.iter().cloned());
    let client = BreedClient::new(&config.breeds.url, BREED_FETCH_TIMEOUT)
        .map_err(|e| format!("failed to build breed client: {e}"))?;
    let refresher = breeds.start(client, config.breeds.refresh_interval());

    let state = AppState::new(Arc::new(storage), breeds);
    let router = app(state, config.env, config.http_server.timeout());

    let address = &config.http_server.address;
    let listener = match TcpListener::bind(address).await {
        Ok(l) => l,
        Err(e) => {
            refresher.stop().await;
            return Err(format!("failed to bind {address}: {e}"));
        }
    };
    tracing::info!(%address, "server listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    refresher.stop().await;
    tracing::info!("server stopped");
    result.map_err(|e| format!("server error: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
