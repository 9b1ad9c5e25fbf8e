//! A connected popup or dApp tab

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::messages::TransportResponse;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// Extension popup; may send `pri(*)` messages
    Extension,
    /// Injected dApp page at `url`; may send `pub(*)` messages
    Content { url: String },
}

struct PortInner {
    id: u64,
    kind: PortKind,
    outbound: mpsc::UnboundedSender<TransportResponse>,
    closed: CancellationToken,
}

/// Duplex channel to one client. Cloning shares the same connection.
#[derive(Clone)]
pub struct Port {
    inner: Arc<PortInner>,
}

impl Port {
    pub fn new(kind: PortKind) -> (Self, mpsc::UnboundedReceiver<TransportResponse>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let port = Self {
            inner: Arc::new(PortInner {
                id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                outbound,
                closed: CancellationToken::new(),
            }),
        };
        (port, rx)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> &PortKind {
        &self.inner.kind
    }

    pub fn url(&self) -> Option<&str> {
        match &self.inner.kind {
            PortKind::Content { url } => Some(url),
            PortKind::Extension => None,
        }
    }

    /// Queue a frame; false once the port is gone
    pub fn send(&self, message: TransportResponse) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.outbound.send(message).is_ok()
    }

    /// Token cancelled together with the port
    pub fn child_token(&self) -> CancellationToken {
        self.inner.closed.child_token()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Mark the port disconnected, ending every subscription opened on it
    pub fn disconnect(&self) {
        if !self.inner.closed.is_cancelled() {
            tracing::debug!("Port {} disconnected", self.inner.id);
            self.inner.closed.cancel();
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}
