//! Push channels from a watched source to a port

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::messages::TransportResponse;
use crate::port::Port;

/// Handle to a running subscription; cancelling it (or disconnecting the
/// port) stops the forwarding task.
#[derive(Debug, Clone)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Frame body for a pushed value; `None` (and an error log) when it does not
/// serialize
pub fn to_json<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value)
        .map_err(|e| tracing::error!("Failed to encode subscription value: {}", e))
        .ok()
}

/// Forward `source` to `port` as `{ id, subscription }` frames: the current
/// value first, then every change. Values the transform drops are skipped.
pub fn subscribe<T, F>(port: &Port, id: &str, mut source: watch::Receiver<T>, transform: F) -> Subscription
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> Option<Value> + Send + 'static,
{
    let token = port.child_token();
    let subscription = Subscription {
        token: token.clone(),
    };
    let port = port.clone();
    let id = id.to_string();

    tokio::spawn(async move {
        loop {
            let value = {
                let current = source.borrow_and_update();
                transform(&*current)
            };
            if let Some(value) = value {
                if !port.send(TransportResponse::subscription(&id, value)) {
                    break;
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                changed = source.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Subscription {} on port {} ended", id, port.id());
    });

    subscription
}

/// Watch two sources as one, republishing the pair whenever either side
/// changes. Stops with the port.
pub fn combine<A, B>(
    port: &Port,
    mut first: watch::Receiver<A>,
    mut second: watch::Receiver<B>,
) -> watch::Receiver<(A, B)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    let initial = (
        first.borrow_and_update().clone(),
        second.borrow_and_update().clone(),
    );
    let (tx, rx) = watch::channel(initial);
    let token = port.child_token();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = first.changed() => if changed.is_err() { break },
                changed = second.changed() => if changed.is_err() { break },
            }
            let value = (
                first.borrow_and_update().clone(),
                second.borrow_and_update().clone(),
            );
            if tx.send(value).is_err() {
                break;
            }
        }
    });

    rx
}
