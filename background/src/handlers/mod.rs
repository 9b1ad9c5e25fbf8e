//! Request dispatcher: routes each port message to the privileged or the
//! public handler and writes the outcome back to the port.

pub mod extension;
pub mod tabs;

pub use extension::{sign_payload, Extension};
pub use tabs::{injected_accounts, Tabs};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use wallet_keyring::Keyring;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::messages::{Message, MessageEnvelope, TransportResponse};
use crate::password_cache::PasswordCache;
use crate::port::{Port, PortKind};
use crate::state::State;
use crate::window::WindowGate;

/// Queue sizes and store counts for the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub accounts: usize,
    pub authorized_origins: usize,
    pub known_chains: usize,
    pub pending_authorizations: usize,
    pub pending_metadata: usize,
    pub pending_signing: usize,
}

pub struct Background {
    extension: Extension,
    tabs: Tabs,
    keyring: Arc<Mutex<Keyring>>,
    state: Arc<State>,
}

impl Background {
    pub fn new(
        keyring: Keyring,
        state: State,
        window: WindowGate,
        clock: Arc<dyn Clock>,
        password_expiry_ms: u64,
    ) -> Self {
        let keyring = Arc::new(Mutex::new(keyring));
        let state = Arc::new(state);
        let cache = PasswordCache::new(clock.clone(), password_expiry_ms);

        Self {
            extension: Extension::new(keyring.clone(), state.clone(), cache, window, clock),
            tabs: Tabs::new(keyring.clone(), state.clone()),
            keyring,
            state,
        }
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn keyring(&self) -> &Arc<Mutex<Keyring>> {
        &self.keyring
    }

    /// Handle one message. Privileged messages are only accepted on the
    /// extension port, public ones only on content-script ports.
    pub async fn handle(&self, port: &Port, envelope: MessageEnvelope) -> Result<Value> {
        let message = Message::parse(&envelope.message)?;
        tracing::debug!("Port {} -> {} ({})", port.id(), message, envelope.id);

        match (message, port.kind()) {
            (Message::Extension(message), PortKind::Extension) => {
                self.extension
                    .handle(&envelope.id, message, envelope.request, port)
                    .await
            }
            (Message::Tabs(message), PortKind::Content { url }) => {
                self.tabs
                    .handle(&envelope.id, message, envelope.request, url, port)
                    .await
            }
            (message, _) => Err(Error::WrongPort(message.to_string())),
        }
    }

    /// Handle one message and post the outcome to the port. Dismissed
    /// requests get no reply.
    pub async fn dispatch(&self, port: &Port, envelope: MessageEnvelope) {
        let id = envelope.id.clone();
        let message = envelope.message.clone();

        match self.handle(port, envelope).await {
            Ok(value) => {
                port.send(TransportResponse::response(&id, value));
            }
            Err(Error::Dismissed) => {
                tracing::debug!("{} ({}) dismissed without answer", message, id);
            }
            Err(e) => {
                tracing::warn!("{} ({}) failed: {}", message, id, e);
                port.send(TransportResponse::error(&id, &e));
            }
        }
    }

    /// Tear down a port: stop its subscriptions and drop the requests it
    /// opened.
    pub fn disconnect(&self, port: &Port) {
        port.disconnect();
        self.state.remove_port(port.id());
        tracing::debug!("Port {} disconnected", port.id());
    }

    pub async fn counts(&self) -> Counts {
        let accounts = self.keyring.lock().await.len();
        Counts {
            accounts,
            authorized_origins: self.state.auth_urls().len(),
            known_chains: self.state.known_metadata().len(),
            pending_authorizations: self.state.auth_requests.len(),
            pending_metadata: self.state.meta_requests.len(),
            pending_signing: self.state.sign_requests.len(),
        }
    }
}
