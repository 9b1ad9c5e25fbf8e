//! Privileged (`pri(*)`) requests from the extension popup

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use wallet_keyring::{
    extract_suri, generate_mnemonic, get_suri, validate_seed, AccountMeta, Keyring, KeyringPair,
    KeyringPairJson, SEED_DEFAULT_LENGTH,
};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::messages::{payload, payload_or_default, ExtensionMessage};
use crate::password_cache::PasswordCache;
use crate::port::Port;
use crate::registry::{hex_bytes, signable, wrap_bytes, TypeRegistry};
use crate::state::{NotificationMode, State};
use crate::subscription::{subscribe, to_json};
use crate::types::*;
use crate::window::WindowGate;

fn reply<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Sign a queued payload with an unlocked pair, returning the hex signature
pub fn sign_payload(
    payload: &SigningPayload,
    pair: &KeyringPair,
    metadata: Option<&MetadataDef>,
    ss58_format: u16,
) -> Result<String> {
    match payload {
        SigningPayload::Json(payload) => {
            let mut registry = TypeRegistry::for_chain(metadata, ss58_format);
            registry.set_signed_extensions(
                &payload.signed_extensions,
                metadata.and_then(|m| m.user_extensions.as_ref()),
            );

            let message = signable(registry.encode_payload(payload)?);
            let raw = pair.sign(&message)?;

            let mut signature = Vec::with_capacity(raw.len() + 1);
            if let Some(prefix) = pair.kind().signature_prefix() {
                signature.push(prefix);
            }
            signature.extend(raw);
            Ok(format!("0x{}", hex::encode(signature)))
        }
        SigningPayload::Raw(payload) => {
            let data = if payload.data.starts_with("0x") {
                hex_bytes("data", &payload.data)?
            } else {
                payload.data.as_bytes().to_vec()
            };
            let signature = pair.sign(&wrap_bytes(&data))?;
            Ok(format!("0x{}", hex::encode(signature)))
        }
    }
}

pub struct Extension {
    keyring: Arc<Mutex<Keyring>>,
    state: Arc<State>,
    cache: Mutex<PasswordCache>,
    window: WindowGate,
    clock: Arc<dyn Clock>,
}

impl Extension {
    pub fn new(
        keyring: Arc<Mutex<Keyring>>,
        state: Arc<State>,
        cache: PasswordCache,
        window: WindowGate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keyring,
            state,
            cache: Mutex::new(cache),
            window,
            clock,
        }
    }

    pub async fn handle(
        &self,
        id: &str,
        message: ExtensionMessage,
        request: Value,
        port: &Port,
    ) -> Result<Value> {
        match message {
            ExtensionMessage::AccountsCreateExternal => {
                reply(self.accounts_create_external(payload(request)?).await?)
            }
            ExtensionMessage::AccountsCreateHardware => {
                reply(self.accounts_create_hardware(payload(request)?).await?)
            }
            ExtensionMessage::AccountsCreateSuri => {
                reply(self.accounts_create_suri(payload(request)?).await?)
            }
            ExtensionMessage::AccountsEdit => reply(self.accounts_edit(payload(request)?).await?),
            ExtensionMessage::AccountsTie => reply(self.accounts_tie(payload(request)?).await?),
            ExtensionMessage::AccountsShow => reply(self.accounts_show(payload(request)?).await?),
            ExtensionMessage::AccountsChangePassword => {
                reply(self.accounts_change_password(payload(request)?).await?)
            }
            ExtensionMessage::AccountsUpdateMeta => {
                reply(self.accounts_update_meta(payload(request)?).await?)
            }
            ExtensionMessage::AccountsForget => {
                reply(self.accounts_forget(payload(request)?).await?)
            }
            ExtensionMessage::AccountsExport => {
                reply(self.accounts_export(payload(request)?).await?)
            }
            ExtensionMessage::AccountsBatchExport => {
                reply(self.accounts_batch_export(payload(request)?).await?)
            }
            ExtensionMessage::AccountsValidate => {
                reply(self.accounts_validate(payload(request)?).await)
            }
            ExtensionMessage::AccountsSubscribe => reply(self.accounts_subscribe(id, port).await),
            ExtensionMessage::JsonRestore => reply(self.json_restore(payload(request)?).await?),
            ExtensionMessage::JsonBatchRestore => {
                reply(self.json_batch_restore(payload(request)?).await?)
            }
            ExtensionMessage::JsonAccountInfo => {
                reply(self.json_account_info(payload(request)?).await?)
            }
            ExtensionMessage::SeedCreate => {
                reply(self.seed_create(payload_or_default(request)?).await?)
            }
            ExtensionMessage::SeedValidate => reply(self.seed_validate(payload(request)?).await?),
            ExtensionMessage::DerivationValidate => {
                reply(self.derivation_validate(payload(request)?).await?)
            }
            ExtensionMessage::DerivationCreate => {
                reply(self.derivation_create(payload(request)?).await?)
            }
            ExtensionMessage::AuthorizeApprove => {
                reply(self.authorize_approve(payload(request)?)?)
            }
            ExtensionMessage::AuthorizeReject => reply(self.authorize_reject(payload(request)?)?),
            ExtensionMessage::AuthorizeIgnore => reply(self.authorize_ignore(payload(request)?)?),
            ExtensionMessage::AuthorizeRemove => reply(self.authorize_remove(payload(request)?)?),
            ExtensionMessage::AuthorizeUpdate => reply(self.authorize_update(payload(request)?)?),
            ExtensionMessage::AuthorizeList => reply(self.authorize_list()),
            ExtensionMessage::AuthorizeRequests => reply(self.authorize_subscribe(id, port)),
            ExtensionMessage::MetadataApprove => reply(self.metadata_approve(payload(request)?)?),
            ExtensionMessage::MetadataReject => reply(self.metadata_reject(payload(request)?)?),
            ExtensionMessage::MetadataGet => reply(self.metadata_get(payload(request)?)),
            ExtensionMessage::MetadataList => reply(self.metadata_list()),
            ExtensionMessage::MetadataUpdate => reply(self.metadata_update(payload(request)?)?),
            ExtensionMessage::MetadataRequests => reply(self.metadata_subscribe(id, port)),
            ExtensionMessage::SigningApprovePassword => {
                reply(self.signing_approve_password(payload(request)?).await?)
            }
            ExtensionMessage::SigningApproveSignature => {
                reply(self.signing_approve_signature(payload(request)?)?)
            }
            ExtensionMessage::SigningCancel => reply(self.signing_cancel(payload(request)?)?),
            ExtensionMessage::SigningIsLocked => {
                reply(self.signing_is_locked(payload(request)?).await?)
            }
            ExtensionMessage::SigningRequests => reply(self.signing_subscribe(id, port)),
            ExtensionMessage::WindowOpen => reply(self.window_open(payload(request)?)),
            ExtensionMessage::SettingsNotification => {
                reply(self.settings_notification(payload(request)?)?)
            }
            ExtensionMessage::Ping => reply(true),
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // ========================================================================
    // Account creation
    // ========================================================================

    async fn accounts_create_external(&self, req: RequestAccountCreateExternal) -> Result<bool> {
        let mut meta = AccountMeta::new()
            .with("name", req.name)
            .with("addedTime", self.now());
        meta.set_opt("genesisHash", req.genesis_hash);

        let address = self.keyring.lock().await.add_external(&req.address, meta)?;
        tracing::info!("Added external account {}", address);
        Ok(true)
    }

    async fn accounts_create_hardware(&self, req: RequestAccountCreateHardware) -> Result<bool> {
        let mut meta = AccountMeta::new()
            .with("name", req.name)
            .with("accountIndex", req.account_index)
            .with("addressOffset", req.address_offset)
            .with("addedTime", self.now());
        meta.set_opt("genesisHash", req.genesis_hash);

        let address = self
            .keyring
            .lock()
            .await
            .add_hardware(&req.address, &req.hardware_type, meta)?;
        tracing::info!("Added {} hardware account {}", req.hardware_type, address);
        Ok(true)
    }

    async fn accounts_create_suri(&self, req: RequestAccountCreateSuri) -> Result<bool> {
        let kind = req.kind.unwrap_or_default();
        let mut meta = AccountMeta::new()
            .with("name", req.name)
            .with("addedTime", self.now());
        meta.set_opt("genesisHash", req.genesis_hash);

        let address = self.keyring.lock().await.add_uri(
            &get_suri(&req.suri, kind),
            &req.password,
            meta,
            kind,
        )?;
        tracing::info!("Added {} account {}", kind, address);
        Ok(true)
    }

    // ========================================================================
    // Account mutation
    // ========================================================================

    async fn update_meta(&self, address: &str, update: impl FnOnce(&mut AccountMeta)) -> Result<bool> {
        let mut keyring = self.keyring.lock().await;
        let mut meta = keyring
            .get_pair(address)
            .ok_or(Error::PairNotFound)?
            .meta()
            .clone();
        update(&mut meta);
        keyring.save_account_meta(address, meta)?;
        Ok(true)
    }

    async fn accounts_edit(&self, req: RequestAccountEdit) -> Result<bool> {
        self.update_meta(&req.address, |meta| meta.set("name", req.name))
            .await
    }

    async fn accounts_tie(&self, req: RequestAccountTie) -> Result<bool> {
        self.update_meta(&req.address, |meta| meta.set("genesisHash", req.genesis_hash))
            .await
    }

    async fn accounts_show(&self, req: RequestAccountShow) -> Result<bool> {
        self.update_meta(&req.address, |meta| meta.set("isHidden", !req.is_showing))
            .await
    }

    async fn accounts_update_meta(&self, req: RequestUpdateMeta) -> Result<bool> {
        self.update_meta(&req.address, |meta| meta.merge(req.meta))
            .await
    }

    async fn accounts_change_password(&self, req: RequestAccountChangePassword) -> Result<bool> {
        let mut keyring = self.keyring.lock().await;
        let pair = keyring
            .get_pair_mut(&req.address)
            .ok_or(Error::PairNotFound)?;
        pair.unlock(&req.old_pass)
            .map_err(|_| Error::InvalidOldPassword)?;
        let address = pair.address().to_string();

        keyring.encrypt_account(&address, &req.new_pass)?;
        self.cache.lock().await.forget(&address);
        tracing::info!("Changed password of {}", address);
        Ok(true)
    }

    async fn accounts_forget(&self, req: RequestAccountForget) -> Result<bool> {
        let mut keyring = self.keyring.lock().await;
        let address = keyring.normalize(&req.address)?;
        keyring.forget_account(&address)?;
        self.state.remove_account_from_auth_urls(&address)?;
        self.cache.lock().await.forget(&address);
        tracing::info!("Forgot account {}", address);
        Ok(true)
    }

    // ========================================================================
    // Export / restore
    // ========================================================================

    async fn accounts_export(&self, req: RequestAccountExport) -> Result<ResponseAccountExport> {
        let exported_json = self
            .keyring
            .lock()
            .await
            .backup_account(&req.address, &req.password)?;
        Ok(ResponseAccountExport { exported_json })
    }

    async fn accounts_batch_export(
        &self,
        req: RequestAccountBatchExport,
    ) -> Result<ResponseAccountsExport> {
        let exported_json = self
            .keyring
            .lock()
            .await
            .backup_accounts(&req.addresses, &req.password)?;
        Ok(ResponseAccountsExport { exported_json })
    }

    /// Any failure (unknown pair, wrong password, storage) reads as `false`
    async fn accounts_validate(&self, req: RequestAccountValidate) -> bool {
        match self
            .keyring
            .lock()
            .await
            .backup_account(&req.address, &req.password)
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Validation of {} failed: {}", req.address, e);
                false
            }
        }
    }

    async fn json_restore(&self, req: RequestJsonRestore) -> Result<bool> {
        let address = self
            .keyring
            .lock()
            .await
            .restore_account(&req.file, &req.password)?;
        tracing::info!("Restored account {}", address);
        Ok(true)
    }

    async fn json_batch_restore(&self, req: RequestBatchRestore) -> Result<bool> {
        let restored = self
            .keyring
            .lock()
            .await
            .restore_accounts(&req.file, &req.password)?;
        tracing::info!("Restored {} accounts", restored.len());
        Ok(true)
    }

    async fn json_account_info(&self, json: KeyringPairJson) -> Result<ResponseJsonGetAccountInfo> {
        let pair = self.keyring.lock().await.create_from_json(&json)?;
        Ok(ResponseJsonGetAccountInfo {
            address: pair.address().to_string(),
            name: pair.meta().name().map(str::to_string),
            genesis_hash: pair.meta().genesis_hash().map(str::to_string),
            kind: pair.kind(),
        })
    }

    // ========================================================================
    // Seeds and derivation
    // ========================================================================

    async fn seed_create(&self, req: RequestSeedCreate) -> Result<ResponseSeedCreate> {
        let kind = req.kind.unwrap_or_default();
        let seed = match req.seed {
            Some(seed) => seed,
            None => generate_mnemonic(req.length.unwrap_or(SEED_DEFAULT_LENGTH))?,
        };

        let pair = self
            .keyring
            .lock()
            .await
            .create_from_uri(&get_suri(&seed, kind), AccountMeta::new(), kind)?;

        Ok(ResponseSeedCreate {
            address: pair.address().to_string(),
            seed,
        })
    }

    async fn seed_validate(&self, req: RequestSeedValidate) -> Result<ResponseSeedValidate> {
        let kind = req.kind.unwrap_or_default();
        let phrase = extract_suri(&req.suri)?.phrase;
        validate_seed(&phrase)?;

        let pair = self
            .keyring
            .lock()
            .await
            .create_from_uri(&get_suri(&req.suri, kind), AccountMeta::new(), kind)?;

        Ok(ResponseSeedValidate {
            address: pair.address().to_string(),
            suri: req.suri,
        })
    }

    /// Unlock a copy of the parent and derive `suri` from it. The stored
    /// parent stays locked.
    fn derive(
        keyring: &Keyring,
        parent_address: &str,
        suri: &str,
        password: &str,
        meta: AccountMeta,
    ) -> Result<KeyringPair> {
        let mut parent = keyring
            .get_pair(parent_address)
            .ok_or(Error::PairNotFound)?
            .clone();

        parent.unlock(password).map_err(|_| Error::InvalidPassword)?;

        parent
            .derive(suri, meta, keyring.ss58_format())
            .map_err(|_| Error::InvalidDerivationPath(suri.to_string()))
    }

    async fn derivation_validate(&self, req: RequestDeriveValidate) -> Result<ResponseDeriveValidate> {
        let keyring = self.keyring.lock().await;
        let child = Self::derive(
            &keyring,
            &req.parent_address,
            &req.suri,
            &req.parent_password,
            AccountMeta::new(),
        )?;

        Ok(ResponseDeriveValidate {
            address: child.address().to_string(),
            suri: req.suri,
        })
    }

    async fn derivation_create(&self, req: RequestDeriveCreate) -> Result<bool> {
        let mut keyring = self.keyring.lock().await;
        let mut meta = AccountMeta::new()
            .with("name", req.name)
            .with("parentAddress", req.parent_address.clone())
            .with("suri", req.suri.clone())
            .with("addedTime", self.now());
        meta.set_opt("genesisHash", req.genesis_hash);

        let child = Self::derive(
            &keyring,
            &req.parent_address,
            &req.suri,
            &req.parent_password,
            meta,
        )?;
        let address = keyring.add_pair(child, &req.password)?;
        tracing::info!("Derived account {} from {}", address, req.parent_address);
        Ok(true)
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    fn authorize_approve(&self, req: RequestAuthorizeApprove) -> Result<bool> {
        self.state.auth_requests.resolve(
            &req.id,
            AuthResponse {
                authorized_accounts: req.authorized_accounts,
                result: true,
            },
        )?;
        Ok(true)
    }

    fn authorize_reject(&self, req: RequestById) -> Result<bool> {
        self.state.auth_requests.resolve(
            &req.id,
            AuthResponse {
                authorized_accounts: Vec::new(),
                result: false,
            },
        )?;
        Ok(true)
    }

    /// Close the request without answering the dApp
    fn authorize_ignore(&self, req: RequestById) -> Result<bool> {
        self.state.auth_requests.remove(&req.id)?;
        Ok(true)
    }

    fn authorize_remove(&self, url: String) -> Result<ResponseAuthorizeList> {
        Ok(ResponseAuthorizeList {
            list: self.state.remove_auth_url(&url)?,
        })
    }

    fn authorize_update(&self, req: RequestAuthorizeUpdate) -> Result<()> {
        self.state
            .update_authorized_accounts(&req.url, req.authorized_accounts)
    }

    fn authorize_list(&self) -> ResponseAuthorizeList {
        ResponseAuthorizeList {
            list: self.state.auth_urls(),
        }
    }

    fn authorize_subscribe(&self, id: &str, port: &Port) -> bool {
        subscribe(port, id, self.state.auth_requests.subscribe(), |value| to_json(value));
        true
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    fn metadata_approve(&self, req: RequestById) -> Result<bool> {
        let queued = self
            .state
            .meta_requests
            .get(&req.id)
            .ok_or(Error::RequestNotFound)?;

        self.state.save_metadata(queued.request)?;
        self.state.meta_requests.resolve(&req.id, true)?;
        Ok(true)
    }

    fn metadata_reject(&self, req: RequestById) -> Result<bool> {
        self.state.meta_requests.reject(&req.id, Error::Rejected)?;
        Ok(true)
    }

    fn metadata_get(&self, genesis_hash: Option<String>) -> Option<MetadataDef> {
        genesis_hash.and_then(|hash| self.state.get_metadata(&hash))
    }

    fn metadata_list(&self) -> Vec<MetadataDef> {
        self.state.known_metadata()
    }

    fn metadata_update(&self, def: MetadataDef) -> Result<bool> {
        self.state.save_metadata(def)?;
        Ok(true)
    }

    fn metadata_subscribe(&self, id: &str, port: &Port) -> bool {
        subscribe(port, id, self.state.meta_requests.subscribe(), |value| to_json(value));
        true
    }

    // ========================================================================
    // Signing
    // ========================================================================

    /// Reject a signing request that cannot proceed
    fn reject_signing(&self, id: &str, error: Error) -> Result<bool> {
        tracing::warn!("Signing request {} rejected: {}", id, error);
        self.state.sign_requests.reject(id, error)?;
        Ok(false)
    }

    async fn signing_approve_password(&self, req: RequestSigningApprovePassword) -> Result<bool> {
        let queued = self
            .state
            .sign_requests
            .get(&req.id)
            .ok_or(Error::RequestNotFound)?;

        let mut keyring = self.keyring.lock().await;
        let ss58_format = keyring.ss58_format();
        let Some(pair) = keyring.get_pair_mut(&queued.account.address) else {
            return self.reject_signing(&req.id, Error::PairNotFound);
        };

        let mut cache = self.cache.lock().await;
        cache.refresh(pair);

        if pair.is_locked() {
            let Some(password) = req.password.as_deref() else {
                return self.reject_signing(&req.id, Error::PasswordNeeded);
            };
            // The request stays queued so the popup can retry
            pair.unlock(password)?;
        }

        let metadata = match &queued.request.payload {
            SigningPayload::Json(payload) => self.state.get_metadata(&payload.genesis_hash),
            SigningPayload::Raw(_) => None,
        };

        let signature =
            match sign_payload(&queued.request.payload, pair, metadata.as_ref(), ss58_format) {
                Ok(signature) => signature,
                Err(e) => {
                    pair.lock();
                    return self.reject_signing(&req.id, e);
                }
            };

        if req.save_pass {
            cache.remember(pair.address());
        } else {
            pair.lock();
        }

        self.state.sign_requests.resolve(
            &req.id,
            ResponseSigning {
                id: req.id.clone(),
                signature,
                signed_transaction: None,
            },
        )?;
        Ok(true)
    }

    fn signing_approve_signature(&self, req: RequestSigningApproveSignature) -> Result<bool> {
        self.state.sign_requests.resolve(
            &req.id,
            ResponseSigning {
                id: req.id.clone(),
                signature: req.signature,
                signed_transaction: req.signed_transaction,
            },
        )?;
        Ok(true)
    }

    fn signing_cancel(&self, req: RequestById) -> Result<bool> {
        self.state.sign_requests.reject(&req.id, Error::Cancelled)?;
        Ok(true)
    }

    /// Lock status of the account behind a signing request. Expires a lapsed
    /// cached unlock as a side effect.
    async fn signing_is_locked(&self, req: RequestById) -> Result<ResponseSigningIsLocked> {
        let queued = self
            .state
            .sign_requests
            .get(&req.id)
            .ok_or(Error::RequestNotFound)?;

        let mut keyring = self.keyring.lock().await;
        let pair = keyring
            .get_pair_mut(&queued.account.address)
            .ok_or(Error::PairNotFound)?;
        let remaining_time = self.cache.lock().await.refresh(pair);

        Ok(ResponseSigningIsLocked {
            is_locked: pair.is_locked(),
            remaining_time,
        })
    }

    fn signing_subscribe(&self, id: &str, port: &Port) -> bool {
        subscribe(port, id, self.state.sign_requests.subscribe(), |value| to_json(value));
        true
    }

    // ========================================================================
    // Misc
    // ========================================================================

    async fn accounts_subscribe(&self, id: &str, port: &Port) -> bool {
        let accounts = self.keyring.lock().await.subscribe();
        subscribe(port, id, accounts, |value| to_json(value));
        true
    }

    fn window_open(&self, path: String) -> bool {
        self.window.open(&path)
    }

    fn settings_notification(&self, mode: String) -> Result<bool> {
        self.state.set_notification(mode.parse::<NotificationMode>()?)?;
        Ok(true)
    }
}
