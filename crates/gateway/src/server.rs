use std::{any::Any, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        body::{Body, Bytes, to_bytes},
        extract::{Request, State},
        http::{StatusCode, header::CONTENT_LENGTH},
        middleware,
        response::Response,
        routing::post,
    },
    kraken_config::RpcConfig,
    kraken_protocol::{
        CONVERSATION_ID_HEADER, Call, DecodeError, NOT_FOUND_MESSAGE, SERVER_ERROR_MESSAGE,
    },
    tokio::net::TcpListener,
    tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer},
    tracing::{debug, error, info, warn},
};

use crate::{
    conn::{self, ConnectionLimits},
    cors,
    methods::MethodTable,
    proxy::{self, ClientInfo},
    render::{Renderer, transport_error},
    signal::SignalRouter,
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Address(#[from] anyhow::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub methods: Arc<MethodTable>,
    pub limits: ConnectionLimits,
}

impl AppState {
    pub fn new(router: Arc<dyn SignalRouter>, limits: ConnectionLimits) -> Self {
        Self {
            methods: Arc::new(MethodTable::new(router)),
            limits,
        }
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    Router::new()
        .route("/", post(rpc_handler).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(cors::cors))
        .layer(middleware::from_fn(proxy::proxy_headers))
        .layer(TraceLayer::new_for_http())
}

/// Bind a listener; failure is returned, never retried.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })
}

/// Start the RPC gateway and serve until Ctrl-C.
pub async fn start_gateway(
    config: &RpcConfig,
    router: Arc<dyn SignalRouter>,
) -> Result<(), GatewayError> {
    let addr = config.socket_addr()?;
    let listener = bind(addr).await?;
    let addr = listener.local_addr().unwrap_or(addr);

    let limits = ConnectionLimits::default();
    let state = AppState::new(router, limits);
    let method_count = state.methods.method_names().len();
    let app = build_gateway_app(state);

    // Startup banner.
    let lines = [
        format!("kraken rpc v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}"),
        format!("{method_count} methods registered"),
        format!(
            "timeouts: read {}s, write {}s, idle {}s",
            limits.read_timeout.as_secs(),
            limits.write_timeout.as_secs(),
            limits.idle_timeout.as_secs()
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    conn::serve(listener, app, limits, shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, shutdown signal disabled");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn rpc_handler(State(state): State<AppState>, request: Request) -> Response {
    let client = request
        .extensions()
        .get::<ClientInfo>()
        .cloned()
        .unwrap_or_default();
    let conversation = request
        .headers()
        .get(CONVERSATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let call = match read_call(request, &state.limits).await {
        Ok(call) => call,
        Err(e) => {
            debug!(client = client.addr_or_unknown(), error = %e, "rejecting request");
            return transport_error(StatusCode::BAD_REQUEST, e.to_string());
        },
    };

    debug!(
        client = client.addr_or_unknown(),
        conversation = conversation.as_deref().unwrap_or(""),
        method = %call.method,
        id = %call.id,
        "rpc call"
    );
    let result = state.methods.dispatch(&call).await;
    Renderer::new(call.id).render(result)
}

async fn read_call(request: Request, limits: &ConnectionLimits) -> Result<Call, DecodeError> {
    let max = limits.max_body_bytes;
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max) {
        return Err(DecodeError::TooLarge(max));
    }

    let body = read_body(request.into_body(), max, limits.read_timeout).await?;
    Call::decode(&body)
}

async fn read_body(body: Body, max: usize, timeout: Duration) -> Result<Bytes, DecodeError> {
    match tokio::time::timeout(timeout, to_bytes(body, max)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(DecodeError::Body(e.to_string())),
        Err(_) => Err(DecodeError::Body(format!(
            "timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

async fn not_found() -> Response {
    transport_error(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());
    error!(panic = %detail, "request handler panicked");
    transport_error(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
}
