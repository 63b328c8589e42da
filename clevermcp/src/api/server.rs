use crate::config::{Config, CorsConfig, ServerConfig};
use crate::mcp::{McpHandler, McpReply, SseSessions, ToolContext, ToolRegistry};
use crate::Result;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const LIVENESS_MESSAGE: &str = "MCP server is running!";

#[derive(Clone)]
pub struct AppState {
    pub mcp_handler: Arc<McpHandler>,
    pub sessions: Arc<SseSessions>,
}

pub struct ApiServer {
    mcp_handler: Arc<McpHandler>,
    sessions: Arc<SseSessions>,
    server_config: ServerConfig,
}

impl ApiServer {
    pub fn new(
        mcp_handler: Arc<McpHandler>,
        sessions: Arc<SseSessions>,
        server_config: ServerConfig,
    ) -> Self {
        Self {
            mcp_handler,
            sessions,
            server_config,
        }
    }

    /// Wire the built-in tools and SSE sessions from configuration
    pub fn from_config(config: &Config, ctx: ToolContext) -> Self {
        let tool_registry = Arc::new(ToolRegistry::with_builtin_tools());
        tracing::info!("Registered {} MCP tools", tool_registry.len());

        let mcp_handler = Arc::new(McpHandler::new(tool_registry, ctx, config.mcp.clone()));
        let sessions = Arc::new(SseSessions::new(
            config.mcp.keep_alive_interval(),
            config.mcp.max_sse_sessions,
        ));

        Self::new(mcp_handler, sessions, config.server.clone())
    }

    pub fn sessions(&self) -> Arc<SseSessions> {
        self.sessions.clone()
    }

    /// GET / - liveness
    async fn root_handler() -> impl IntoResponse {
        ([(header::CONTENT_TYPE, "text/plain")], LIVENESS_MESSAGE)
    }

    /// GET /mcp - SSE keep-alive stream
    async fn sse_handler(State(state): State<AppState>) -> Response {
        match state.sessions.open() {
            Ok(stream) => (
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                    (header::CONNECTION, "keep-alive"),
                ],
                Body::from_stream(stream),
            )
                .into_response(),
            Err(e) => {
                tracing::warn!("Refusing SSE stream: {}", e);
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        }
    }

    /// POST / and POST /mcp - JSON-RPC requests
    async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> McpReply {
        state.mcp_handler.handle_body(&body).await
    }

    async fn not_found() -> impl IntoResponse {
        (StatusCode::NOT_FOUND, "Not found")
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(cors_config: &CorsConfig) -> CorsLayer {
        if !cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let has_wildcard = cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        let app_state = AppState {
            mcp_handler: self.mcp_handler.clone(),
            sessions: self.sessions.clone(),
        };

        // Wrong method on a known path is a 404 like any other miss. HEAD is
        // routed explicitly since axum would otherwise answer it with GET.
        Router::new()
            .route(
                "/",
                get(Self::root_handler)
                    .head(Self::not_found)
                    .post(Self::rpc_handler)
                    .fallback(Self::not_found),
            )
            .route(
                "/mcp",
                get(Self::sse_handler)
                    .head(Self::not_found)
                    .post(Self::rpc_handler)
                    .fallback(Self::not_found),
            )
            .fallback(Self::not_found)
            .with_state(app_state)
            .layer(DefaultBodyLimit::max(self.server_config.max_body_size))
            .layer(Self::build_cors_layer(&self.server_config.cors))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves.
    ///
    /// On shutdown every SSE stream is ended first so that in-flight
    /// connections can drain.
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let router = self.router();
        let sessions = self.sessions.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown requested, closing {} SSE streams", sessions.active_count());
            sessions.shutdown();
        };

        if self.server_config.tls.enabled {
            tracing::info!("Server listening on https://{}", addr);
            crate::api::tls::serve_tls(listener, router, &self.server_config.tls, signal).await
        } else {
            tracing::info!("Server listening on http://{}", addr);
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await?;
            Ok(())
        }
    }
}
