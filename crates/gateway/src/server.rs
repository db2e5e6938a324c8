use std::{
    future::Future,
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use {
    axum::{
        Router,
        body::{Body, Bytes},
        extract::{ConnectInfo, DefaultBodyLimit, Query, State, WebSocketUpgrade},
        http::{HeaderMap, StatusCode, Uri, header},
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{debug, info, warn},
};

use tether_protocol::{
    self as protocol, MAX_BODY_BYTES, Request, RequestId, RpcEnvelope, Source, methods as m,
};

use crate::{
    error::{Error, Result},
    methods::MethodRegistry,
    owner_link,
    state::GatewayState,
};

const OPENAPI_DEFAULT: &str = include_str!("../assets/openapi.yaml");

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
    pub methods: Arc<MethodRegistry>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>, methods: Arc<MethodRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_state = AppState {
        gateway: state,
        methods,
    };

    Router::new()
        .route("/jsonrpc", post(jsonrpc_handler))
        .route("/api", get(api_handler))
        .route("/agentAppInfo", get(agent_app_info_handler))
        .route("/clashConfig.yaml", get(clash_config_handler))
        .route("/file", get(file_handler))
        .route("/openapi.json", get(openapi_handler))
        .route("/health", get(health_handler))
        .route("/owner", get(owner_upgrade_handler))
        .fallback(static_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the gateway HTTP + WebSocket server and run until `shutdown` resolves.
pub async fn start_gateway(
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.bind, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;

    info!(
        addr = %local,
        version = %state.version,
        methods = methods.method_names().len(),
        "gateway listening"
    );
    if let Some(path) = state.store.path() {
        info!(path = %path.display(), "settings store");
    }

    let app = build_gateway_app(state, methods);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!("gateway stopped");
    Ok(())
}

// ── RPC ──────────────────────────────────────────────────────────────────────

fn envelope(id: RequestId, response: protocol::Response) -> Json<RpcEnvelope> {
    Json(RpcEnvelope::new(id, response))
}

/// Rejected before dispatch: 400 with the error in the envelope.
fn transport_error(err: Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        envelope(RequestId::default(), protocol::Response::error(err.to_string())),
    )
        .into_response()
}

/// JSON bodies arrive as `application/json` or, from simple clients, as
/// `text/plain`. No header at all is read as JSON.
fn accepts_content_type(headers: &HeaderMap) -> std::result::Result<(), String> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(());
    };
    let raw = value.to_str().map_err(|_| "unreadable content type".to_string())?;
    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case("application/json") || essence.eq_ignore_ascii_case("text/plain")
    {
        Ok(())
    } else {
        Err(format!("unsupported content type: {essence}"))
    }
}

async fn jsonrpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(reason) = accepts_content_type(&headers) {
        debug!(reason = %reason, "rejected rpc body");
        return transport_error(Error::Transport(reason));
    }
    if body.is_empty() {
        return transport_error(Error::Transport("empty body".into()));
    }
    let request = match Request::from_rpc_body(&body) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "rejected rpc body");
            return transport_error(e.into());
        },
    };
    let id = request.id.clone();
    let response = state.methods.dispatch(&state.gateway, request).await;
    envelope(id, response).into_response()
}

#[derive(Deserialize)]
struct ApiQuery {
    method: Option<String>,
}

async fn api_handler(State(state): State<AppState>, Query(query): Query<ApiQuery>) -> Response {
    let Some(method) = query.method.filter(|m| !m.is_empty()) else {
        return transport_error(Error::Transport("missing method".into()));
    };
    let request = Request::bare(method, Source::External);
    let id = request.id.clone();
    let response = state.methods.dispatch(&state.gateway, request).await;
    envelope(id, response).into_response()
}

async fn agent_app_info_handler(State(state): State<AppState>) -> Response {
    let request = Request::bare(m::AGENT_APP_INFO, Source::Internal);
    let id = request.id.clone();
    let response = state.methods.dispatch(&state.gateway, request).await;
    envelope(id, response).into_response()
}

// ── Documents ────────────────────────────────────────────────────────────────

async fn clash_config_handler(State(state): State<AppState>) -> Response {
    let gw = &state.gateway;
    match gw.synthesizer.synthesize(&gw.store.settings()) {
        Ok(doc) => ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], doc).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to serve proxy config");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        },
    }
}

async fn openapi_handler(State(state): State<AppState>) -> Response {
    let yaml = match &state.gateway.config.assets.openapi {
        None => OPENAPI_DEFAULT.to_string(),
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "openapi document unavailable");
                return StatusCode::NOT_FOUND.into_response();
            },
        },
    };
    match serde_yaml::from_str::<serde_json::Value>(&yaml) {
        Ok(doc) => Json(doc).into_response(),
        Err(e) => {
            warn!(error = %e, "openapi document is not valid YAML");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        },
    }
}

#[derive(Deserialize)]
struct FileQuery {
    path: Option<String>,
}

async fn file_handler(State(state): State<AppState>, Query(query): Query<FileQuery>) -> Response {
    let Some(path) = query.path.filter(|p| !p.is_empty()) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "missing path").into_response();
    };
    let upstream = match state.gateway.helper.file(&path).await {
        Ok(r) => r,
        Err(e) => {
            warn!(path, error = %e, "file fetch failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        },
    };

    let filename = Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .replace('"', "");
    (
        [
            (header::CONTENT_TYPE, mime_for_file(&path).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response()
}

// ── Health / owner link ──────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let gw = &state.gateway;
    Json(serde_json::json!({
        "ok": true,
        "version": gw.version,
        "uptimeMs": gw.uptime_ms(),
        "pendingCalls": gw.bridge.pending_count(),
        "owners": gw.owner_link.attached(),
        "proxyState": gw.lifecycle.state(),
        "readiness": gw.readiness.snapshot(),
    }))
}

async fn owner_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_BODY_BYTES)
        .on_upgrade(move |socket| owner_link::handle_owner_socket(socket, state.gateway, addr))
}

// ── Static assets ────────────────────────────────────────────────────────────

async fn static_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(root) = state.gateway.config.assets.dir.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(mut file) = resolve_asset(root, uri.path()) else {
        debug!(path = uri.path(), "rejected asset path");
        return StatusCode::NOT_FOUND.into_response();
    };
    if tokio::fs::metadata(&file).await.is_ok_and(|m| m.is_dir()) {
        file.push("index.html");
    }
    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let mime = mime_for_path(&file.to_string_lossy());
            ([(header::CONTENT_TYPE, mime)], bytes).into_response()
        },
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Map a request path onto `root`. Only plain path segments are accepted, so
/// nothing outside `root` can be named.
fn resolve_asset(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(uri_path).ok()?;
    let rel = decoded.trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };
    let rel = Path::new(rel);
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(root.join(rel))
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn mime_for_path(path: &str) -> &'static str {
    match extension(path).as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

fn mime_for_file(path: &str) -> &'static str {
    match extension(path).as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
