//! Background state: the three approval queues plus the persisted
//! authorization table, known chain metadata and notification setting.

pub mod pending;
pub mod requests;

pub use pending::{Pending, RequestStatus, RequestStore};
pub use requests::{AuthorizeRequest, MetadataRequest, SigningRequest};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use wallet_keyring::{normalize_address, AccountJson, KeyValueStore, Space};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::types::{
    AuthResponse, AuthUrlInfo, AuthUrls, MetadataDef, RequestAuthorizeTab, RequestSign,
    ResponseSigning,
};

const NOTIFICATION_KEY: &str = "notification";

/// Accounts each allowed host may see, keyed like the authorization table
pub type Grants = BTreeMap<String, Vec<String>>;

fn grants_of(auth_urls: &AuthUrls) -> Grants {
    auth_urls
        .iter()
        .filter(|(_, entry)| entry.is_allowed)
        .map(|(key, entry)| (key.clone(), entry.authorized_accounts.clone()))
        .collect()
}

/// How the popup is surfaced when a request is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    #[default]
    Popup,
    Window,
    Extension,
}

impl FromStr for NotificationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "popup" => Ok(NotificationMode::Popup),
            "window" => Ok(NotificationMode::Window),
            "extension" => Ok(NotificationMode::Extension),
            other => Err(Error::InvalidPayload(format!(
                "Unknown notification mode {}",
                other
            ))),
        }
    }
}

/// Host part of a dApp url, used as the authorization key
pub fn strip_url(url: &str) -> Result<String> {
    let supported = ["http:", "https:", "ipfs:", "ipns:"];
    if !supported.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    url.split('/')
        .nth(2)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidUrl(url.to_string()))
}

/// Same account regardless of SS58 prefix
pub fn same_account(a: &str, b: &str) -> bool {
    match (normalize_address(a, 42), normalize_address(b, 42)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Wait for a queued request to be settled
async fn settled<R>(pending: Pending<R>) -> Result<R> {
    match pending.await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::Dismissed),
    }
}

pub struct State {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    counter: AtomicU64,
    auth_urls: Mutex<AuthUrls>,
    grants: watch::Sender<Grants>,
    known_metadata: Mutex<BTreeMap<String, MetadataDef>>,
    notification: Mutex<NotificationMode>,
    pub auth_requests: RequestStore<AuthorizeRequest, AuthResponse>,
    pub meta_requests: RequestStore<MetadataRequest, bool>,
    pub sign_requests: RequestStore<SigningRequest, ResponseSigning>,
}

impl State {
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let auth_urls: AuthUrls = store
            .load_all::<AuthUrlInfo>(Space::AuthUrls)?
            .into_iter()
            .map(|info| (info.id.clone(), info))
            .collect();

        let known_metadata: BTreeMap<String, MetadataDef> = store
            .load_all::<MetadataDef>(Space::Metadata)?
            .into_iter()
            .map(|def| (def.genesis_hash.clone(), def))
            .collect();

        let notification = store
            .get_json::<NotificationMode>(Space::Settings, NOTIFICATION_KEY)?
            .unwrap_or_default();

        tracing::info!(
            "State loaded: {} authorized origins, {} known chains",
            auth_urls.len(),
            known_metadata.len()
        );

        let (grants, _) = watch::channel(grants_of(&auth_urls));

        Ok(Self {
            store,
            clock,
            counter: AtomicU64::new(0),
            auth_urls: Mutex::new(auth_urls),
            grants,
            known_metadata: Mutex::new(known_metadata),
            notification: Mutex::new(notification),
            auth_requests: RequestStore::new("authorize"),
            meta_requests: RequestStore::new("metadata"),
            sign_requests: RequestStore::new("signing"),
        })
    }

    /// Unique request id: `<ms>.<counter>`
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}.{}", self.clock.now_ms(), n)
    }

    fn popup(&self, kind: &str, url: &str) {
        tracing::info!(
            "New {} request from {} (notification: {:?})",
            kind,
            url,
            *guard(&self.notification)
        );
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Authorize `url`, queueing a request unless the origin already has a
    /// decision on record.
    pub async fn authorize_url(
        &self,
        url: &str,
        request: RequestAuthorizeTab,
        port_id: u64,
    ) -> Result<AuthResponse> {
        let id_str = strip_url(url)?;

        let existing = guard(&self.auth_urls).get(&id_str).cloned();
        if let Some(existing) = existing {
            if !existing.is_allowed {
                return Err(Error::SourceNotAllowed(url.to_string()));
            }
            return Ok(AuthResponse {
                authorized_accounts: existing.authorized_accounts,
                result: true,
            });
        }

        let id = self.next_id();
        let origin = request.origin.clone();
        let pending = self.auth_requests.create_unless(
            &id,
            AuthorizeRequest {
                id: id.clone(),
                request,
                url: url.to_string(),
            },
            port_id,
            |queued| {
                (strip_url(&queued.url).ok().as_deref() == Some(id_str.as_str()))
                    .then(|| Error::AuthorizationPending(url.to_string()))
            },
        )?;
        self.popup("authorize", url);

        let response = settled(pending).await?;

        let info = AuthUrlInfo {
            id: id_str.clone(),
            origin,
            url: url.to_string(),
            authorized_accounts: response.authorized_accounts.clone(),
            is_allowed: response.result,
            count: 0,
        };
        self.store.put_json(Space::AuthUrls, &id_str, &info)?;
        {
            let mut auth_urls = guard(&self.auth_urls);
            auth_urls.insert(id_str, info);
            self.publish_grants(&auth_urls);
        }

        tracing::info!(
            "Authorization for {} {}",
            url,
            if response.result { "granted" } else { "denied" }
        );
        Ok(response)
    }

    /// Entry for an origin that may talk to the wallet
    pub fn ensure_url_authorized(&self, url: &str) -> Result<AuthUrlInfo> {
        let id_str = strip_url(url)?;
        let mut auth_urls = guard(&self.auth_urls);
        let entry = auth_urls
            .get_mut(&id_str)
            .ok_or_else(|| Error::SourceNotEnabled(url.to_string()))?;

        if !entry.is_allowed {
            return Err(Error::SourceNotAllowed(url.to_string()));
        }

        entry.count += 1;
        let entry = entry.clone();
        self.store.put_json(Space::AuthUrls, &id_str, &entry)?;
        Ok(entry)
    }

    pub fn auth_urls(&self) -> AuthUrls {
        guard(&self.auth_urls).clone()
    }

    /// Granted accounts per allowed host, republished when a grant changes
    pub fn subscribe_grants(&self) -> watch::Receiver<Grants> {
        self.grants.subscribe()
    }

    fn publish_grants(&self, auth_urls: &AuthUrls) {
        let grants = grants_of(auth_urls);
        self.grants.send_if_modified(|current| {
            if *current == grants {
                return false;
            }
            *current = grants;
            true
        });
    }

    /// Table key for either a stored id or a full url
    fn auth_key(&self, auth_urls: &AuthUrls, url: &str) -> Result<String> {
        if auth_urls.contains_key(url) {
            return Ok(url.to_string());
        }
        let id_str = strip_url(url).map_err(|_| Error::SourceNotEnabled(url.to_string()))?;
        if auth_urls.contains_key(&id_str) {
            Ok(id_str)
        } else {
            Err(Error::SourceNotEnabled(url.to_string()))
        }
    }

    pub fn update_authorized_accounts(&self, url: &str, accounts: Vec<String>) -> Result<()> {
        let mut auth_urls = guard(&self.auth_urls);
        let key = self.auth_key(&auth_urls, url)?;
        if let Some(entry) = auth_urls.get_mut(&key) {
            entry.authorized_accounts = accounts;
            self.store.put_json(Space::AuthUrls, &key, &*entry)?;
        }
        self.publish_grants(&auth_urls);
        Ok(())
    }

    /// Forget the decision for an origin; it must ask again next time
    pub fn remove_auth_url(&self, url: &str) -> Result<AuthUrls> {
        let mut auth_urls = guard(&self.auth_urls);
        let key = self.auth_key(&auth_urls, url)?;
        auth_urls.remove(&key);
        self.store.delete(Space::AuthUrls, &key)?;
        self.publish_grants(&auth_urls);
        tracing::info!("Removed authorization for {}", key);
        Ok(auth_urls.clone())
    }

    /// Strip a forgotten account from every origin's authorized list
    pub fn remove_account_from_auth_urls(&self, address: &str) -> Result<()> {
        let mut auth_urls = guard(&self.auth_urls);
        for (key, entry) in auth_urls.iter_mut() {
            let before = entry.authorized_accounts.len();
            entry
                .authorized_accounts
                .retain(|account| !same_account(account, address));
            if entry.authorized_accounts.len() != before {
                self.store.put_json(Space::AuthUrls, key, &*entry)?;
            }
        }
        self.publish_grants(&auth_urls);
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub async fn inject_metadata(&self, url: &str, def: MetadataDef, port_id: u64) -> Result<bool> {
        let id = self.next_id();
        let pending = self.meta_requests.create(
            &id,
            MetadataRequest {
                id: id.clone(),
                request: def,
                url: url.to_string(),
            },
            port_id,
        )?;
        self.popup("metadata", url);

        settled(pending).await
    }

    pub fn save_metadata(&self, def: MetadataDef) -> Result<()> {
        self.store.put_json(Space::Metadata, &def.genesis_hash, &def)?;
        tracing::info!(
            "Stored metadata for {} (spec {})",
            def.chain,
            def.spec_version
        );
        guard(&self.known_metadata).insert(def.genesis_hash.clone(), def);
        Ok(())
    }

    pub fn get_metadata(&self, genesis_hash: &str) -> Option<MetadataDef> {
        guard(&self.known_metadata).get(genesis_hash).cloned()
    }

    pub fn known_metadata(&self) -> Vec<MetadataDef> {
        guard(&self.known_metadata).values().cloned().collect()
    }

    // ========================================================================
    // Signing
    // ========================================================================

    pub async fn sign(
        &self,
        url: &str,
        request: RequestSign,
        account: AccountJson,
        port_id: u64,
    ) -> Result<ResponseSigning> {
        let id = self.next_id();
        let pending = self.sign_requests.create(
            &id,
            SigningRequest {
                account,
                id: id.clone(),
                request,
                url: url.to_string(),
            },
            port_id,
        )?;
        self.popup("signing", url);

        settled(pending).await
    }

    // ========================================================================
    // Settings / ports
    // ========================================================================

    pub fn notification(&self) -> NotificationMode {
        *guard(&self.notification)
    }

    pub fn set_notification(&self, mode: NotificationMode) -> Result<()> {
        self.store.put_json(Space::Settings, NOTIFICATION_KEY, &mode)?;
        *guard(&self.notification) = mode;
        Ok(())
    }

    /// Drop every pending request opened from a disconnected port
    pub fn remove_port(&self, port_id: u64) {
        let removed = self.auth_requests.remove_port(port_id)
            + self.meta_requests.remove_port(port_id)
            + self.sign_requests.remove_port(port_id);
        if removed > 0 {
            tracing::info!("Port {} closed with {} pending requests", port_id, removed);
        }
    }
}
