//! Approval-gated requests awaiting a decision from the popup

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

use crate::error::{Error, Result};

pub type Responder<R> = oneshot::Sender<Result<R>>;
pub type Pending<R> = oneshot::Receiver<Result<R>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Resolved,
    Rejected,
}

struct Entry<T, R> {
    request: T,
    port_id: u64,
    status: RequestStatus,
    responder: Option<Responder<R>>,
}

/// One queue of pending requests keyed by id.
///
/// Each entry is settled at most once: the first `resolve`/`reject` moves it
/// out of `Pending`, consumes its responder and drops it from the queue, so a
/// second attempt on the same id fails with [`Error::RequestNotFound`].
pub struct RequestStore<T, R> {
    name: &'static str,
    entries: Mutex<BTreeMap<String, Entry<T, R>>>,
    changes: watch::Sender<Vec<T>>,
}

impl<T, R> RequestStore<T, R>
where
    T: Clone,
{
    pub fn new(name: &'static str) -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            name,
            entries: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Entry<T, R>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, entries: &BTreeMap<String, Entry<T, R>>) {
        let snapshot = entries.values().map(|e| e.request.clone()).collect();
        self.changes.send_replace(snapshot);
    }

    /// Queue `request` under `id`; the receiver completes when it is settled
    pub fn create(&self, id: &str, request: T, port_id: u64) -> Result<Pending<R>> {
        self.create_unless(id, request, port_id, |_| None)
    }

    /// Like [`create`](Self::create), but refused with the error `conflict`
    /// returns for any already queued request. The check and the insert
    /// happen under one lock.
    pub fn create_unless(
        &self,
        id: &str,
        request: T,
        port_id: u64,
        conflict: impl Fn(&T) -> Option<Error>,
    ) -> Result<Pending<R>> {
        let mut entries = self.entries();
        if entries.contains_key(id) {
            return Err(Error::DuplicateRequest(id.to_string()));
        }
        if let Some(error) = entries.values().find_map(|e| conflict(&e.request)) {
            return Err(error);
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            id.to_string(),
            Entry {
                request,
                port_id,
                status: RequestStatus::Pending,
                responder: Some(tx),
            },
        );
        tracing::debug!("Queued {} request {} ({} pending)", self.name, id, entries.len());
        self.publish(&entries);

        Ok(rx)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries().get(id).map(|e| e.request.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries().values().map(|e| e.request.clone()).collect()
    }

    /// Current queue contents, republished after every change
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.changes.subscribe()
    }

    fn settle(&self, id: &str, status: RequestStatus, outcome: Result<R>) -> Result<()> {
        let responder = {
            let mut entries = self.entries();
            let entry = entries.get_mut(id).ok_or(Error::RequestNotFound)?;
            if entry.status != RequestStatus::Pending {
                return Err(Error::RequestNotFound);
            }
            entry.status = status;
            let responder = entry.responder.take();
            entries.remove(id);
            self.publish(&entries);
            responder
        };

        tracing::debug!("Settled {} request {} as {:?}", self.name, id, status);

        // The caller may already be gone (port closed mid-request)
        if let Some(responder) = responder {
            let _ = responder.send(outcome);
        }
        Ok(())
    }

    pub fn resolve(&self, id: &str, value: R) -> Result<()> {
        self.settle(id, RequestStatus::Resolved, Ok(value))
    }

    pub fn reject(&self, id: &str, error: Error) -> Result<()> {
        self.settle(id, RequestStatus::Rejected, Err(error))
    }

    /// Drop a request without answering it. The waiting caller observes a
    /// closed channel.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut entries = self.entries();
        entries.remove(id).ok_or(Error::RequestNotFound)?;
        self.publish(&entries);
        tracing::debug!("Dismissed {} request {}", self.name, id);
        Ok(())
    }

    /// Drop every request opened from `port_id`
    pub fn remove_port(&self, port_id: u64) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.port_id != port_id);
        let removed = before - entries.len();
        if removed > 0 {
            self.publish(&entries);
            tracing::debug!("Dropped {} {} requests from port {}", removed, self.name, port_id);
        }
        removed
    }
}
