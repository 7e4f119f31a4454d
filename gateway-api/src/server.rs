//! API server utilities: building a [`Router`] into a servable future with
//! tracing, backpressure, load shedding, concurrency limits, server-side
//! timeouts, and graceful shutdown.

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use anyhow::Context;
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use gateway_common::error::GatewayErrorKind;
use gateway_common::shutdown::ShutdownChannel;
use gateway_common::task::GwTask;
use tower::buffer::BufferLayer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn, Instrument};

use crate::response::ApiError;

/// The maximum time we wait for in-flight connections to finish after a
/// shutdown signal before giving up.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the Axum / Tower middleware stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LayerConfig {
    /// Maximum request body size in bytes (`None` disables the limit).
    pub body_limit: Option<usize>,
    /// Shed load instead of queueing once the service is at capacity.
    pub load_shed: bool,
    /// Size of the work buffer (`None` disables buffering).
    pub buffer_size: Option<usize>,
    /// Maximum number of requests processed concurrently.
    pub concurrency: Option<usize>,
    /// Maximum time a handler may spend on a single request.
    pub handling_timeout: Option<Duration>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            body_limit: Some(16384),
            load_shed: true,
            buffer_size: Some(4096),
            concurrency: Some(4096),
            handling_timeout: Some(Duration::from_secs(15)),
        }
    }
}

/// Builds a servable future from `router`, binding `bind_addr` and applying
/// `layer_config`'s middleware stack. Returns the future and the bound
/// address (useful when `bind_addr`'s port is 0).
pub fn build_server_fut(
    bind_addr: SocketAddr,
    router: Router<()>,
    layer_config: LayerConfig,
    server_span: tracing::Span,
    shutdown: ShutdownChannel,
) -> anyhow::Result<(impl Future<Output = ()>, SocketAddr)> {
    let listener = TcpListener::bind(bind_addr)
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    listener
        .set_nonblocking(true)
        .context("Failed to set listener non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to get local address")?;

    let middleware_stack = tower::ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            layer_config
                .body_limit
                .map(DefaultBodyLimit::max)
                .unwrap_or_else(DefaultBodyLimit::disable),
        )
        .layer(HandleErrorLayer::new(|error: tower::BoxError| async move {
            ApiError::from_kind(
                GatewayErrorKind::InternalError,
                format!("Service is at capacity; retry later: {error:#}"),
            )
        }))
        .option_layer(layer_config.load_shed.then(LoadShedLayer::new))
        .option_layer(layer_config.buffer_size.map(BufferLayer::new))
        .option_layer(layer_config.concurrency.map(ConcurrencyLimitLayer::new))
        .layer(HandleErrorLayer::new(|error: tower::BoxError| async move {
            ApiError::from_kind(
                GatewayErrorKind::InternalError,
                format!("Server timed out handling request: {error:#}"),
            )
        }))
        .option_layer(layer_config.handling_timeout.map(TimeoutLayer::new));

    let router_with_fallback = router
        .fallback(|method: http::Method, uri: http::Uri| async move {
            ApiError::from_kind(
                GatewayErrorKind::NotFound,
                format!("No such endpoint: {method} {}", uri.path()),
            )
        })
        .layer(middleware_stack);

    let shutdown_rx = shutdown;
    let server_fut = async move {
        let tokio_listener =
            tokio::net::TcpListener::from_std(listener).expect("bound above");
        let serve_fut = axum::serve(
            tokio_listener,
            router_with_fallback.into_make_service(),
        )
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await;
            info!("Shutting down API server");
        });

        match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, serve_fut).await {
            Ok(Ok(())) => debug!("API server graceful shutdown success"),
            Ok(Err(e)) => error!("API server exited with error: {e:#}"),
            Err(_) => warn!("API server timed out during shutdown"),
        }
    }
    .instrument(server_span);

    Ok((server_fut, local_addr))
}

/// [`build_server_fut`] but spawns the result into a named, joinable task.
pub fn spawn_server_task(
    bind_addr: SocketAddr,
    router: Router<()>,
    layer_config: LayerConfig,
    server_span_name: &'static str,
    shutdown: ShutdownChannel,
) -> anyhow::Result<(GwTask<()>, SocketAddr)> {
    let server_span = tracing::info_span!("(api-server)", name = server_span_name);
    let (server_fut, local_addr) =
        build_server_fut(bind_addr, router, layer_config, server_span, shutdown)?;
    let task = GwTask::spawn(server_span_name, server_fut);
    Ok((task, local_addr))
}
