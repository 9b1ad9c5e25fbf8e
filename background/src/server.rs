// Background service: WebSocket ports plus a small status API

use anyhow::{bail, Result};
use futures::{SinkExt, StreamExt};
use poem::listener::TcpListener;
use poem::web::websocket::{Message as WsMessage, WebSocket};
use poem::web::{Data, Query};
use poem::{get, handler, EndpointExt, IntoResponse, Route, Server};
use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi, OpenApiService};
use serde::Deserialize;
use std::sync::Arc;
use tokio::signal;
use wallet_keyring::{KeyValueStore, Keyring, MemoryStore, RocksStore};

use crate::clock::{Clock, SystemClock};
use crate::config::ConfigFile;
use crate::handlers::Background;
use crate::messages::MessageEnvelope;
use crate::port::{Port, PortKind};
use crate::state::State;
use crate::window::{CommandOpener, LogOpener, TabOpener, WindowGate};

pub const EXTENSION_PORT: &str = "extension";
pub const CONTENT_PORT: &str = "content";

#[derive(Debug, Deserialize)]
pub struct PortParams {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl PortParams {
    pub fn kind(self) -> Result<PortKind> {
        match (self.name.as_str(), self.url) {
            (EXTENSION_PORT, _) => Ok(PortKind::Extension),
            (CONTENT_PORT, Some(url)) => Ok(PortKind::Content { url }),
            (CONTENT_PORT, None) => bail!("content ports must carry the page url"),
            (other, _) => bail!("unknown port name {}", other),
        }
    }
}

/// Pump frames between a socket and the dispatcher until either side closes
async fn serve_port(background: Arc<Background>, kind: PortKind, socket: poem::web::websocket::WebSocketStream) {
    let (port, mut outbound) = Port::new(kind);
    let (mut sink, mut stream) = socket.split();
    tracing::info!("🔌 Port {} connected ({:?})", port.id(), port.kind());

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode response {}: {}", message.id, e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<MessageEnvelope>(&text) {
                Ok(envelope) => {
                    let background = background.clone();
                    let port = port.clone();
                    tokio::spawn(async move {
                        background.dispatch(&port, envelope).await;
                    });
                }
                Err(e) => {
                    tracing::warn!("Malformed frame on port {}: {}", port.id(), e);
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    background.disconnect(&port);
    writer.abort();
    tracing::info!("🔌 Port {} closed", port.id());
}

#[handler]
fn port_handler(
    ws: WebSocket,
    Query(params): Query<PortParams>,
    background: Data<&Arc<Background>>,
) -> poem::Result<impl IntoResponse> {
    let kind = params
        .kind()
        .map_err(|e| poem::Error::from_string(e.to_string(), poem::http::StatusCode::BAD_REQUEST))?;
    let background = background.0.clone();

    Ok(ws.on_upgrade(move |socket| serve_port(background, kind, socket)))
}

// ============================================================================
// Status API
// ============================================================================

#[derive(Debug, Object)]
pub struct StatusResponse {
    pub accounts: u64,
    pub authorized_origins: u64,
    pub known_chains: u64,
    pub pending_authorizations: u64,
    pub pending_metadata: u64,
    pub pending_signing: u64,
    pub notification: String,
}

pub struct StatusApi {
    pub background: Arc<Background>,
}

#[OpenApi]
impl StatusApi {
    /// Store sizes and pending request queues
    #[oai(path = "/api/status", method = "get")]
    async fn status(&self) -> Json<StatusResponse> {
        let counts = self.background.counts().await;
        let notification = serde_json::to_value(self.background.state().notification())
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        Json(StatusResponse {
            accounts: counts.accounts as u64,
            authorized_origins: counts.authorized_origins as u64,
            known_chains: counts.known_chains as u64,
            pending_authorizations: counts.pending_authorizations as u64,
            pending_metadata: counts.pending_metadata as u64,
            pending_signing: counts.pending_signing as u64,
            notification,
        })
    }
}

// ============================================================================
// Startup
// ============================================================================

pub fn build_background(config: &ConfigFile) -> Result<Background> {
    let store: Arc<dyn KeyValueStore> = match &config.keyring.storage_path {
        Some(path) => {
            tracing::info!("✅ Opening account storage at {}", path);
            Arc::new(RocksStore::open(path)?)
        }
        None => {
            tracing::warn!("⚠️  No storage_path configured, accounts are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let keyring = Keyring::load(store.clone(), config.keyring.ss58_format)?;
    tracing::info!("✅ Keyring loaded with {} accounts", keyring.len());
    let state = State::load(store, clock.clone())?;

    let opener: Arc<dyn TabOpener> = match &config.window.open_command {
        Some(program) => Arc::new(CommandOpener::new(program.clone())),
        None => Arc::new(LogOpener),
    };
    let window = WindowGate::new(config.window.extension_url.clone(), opener);

    Ok(Background::new(
        keyring,
        state,
        window,
        clock,
        config.signing.password_expiry_ms(),
    ))
}

pub async fn run(config: ConfigFile) -> Result<()> {
    let background = Arc::new(build_background(&config)?);

    let api_service = OpenApiService::new(
        StatusApi {
            background: background.clone(),
        },
        "Wallet Background",
        "0.1.0",
    );
    let ui = api_service.scalar();
    let spec = api_service.spec_endpoint();

    let app = Route::new()
        .at("/port", get(port_handler).data(background))
        .nest("/", api_service)
        .nest("/docs", ui)
        .nest("/spec", spec);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("🚀 Wallet background listening on {}", addr);
    tracing::info!("   🔌 WS  /port?name=extension | /port?name=content&url=<page>");
    tracing::info!("   📊 GET /api/status");
    tracing::info!("   📖 Documentation: http://{}/docs", addr);

    Server::new(TcpListener::bind(addr))
        .run_with_graceful_shutdown(app, shutdown_signal(), None)
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
