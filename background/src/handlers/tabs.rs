//! Public (`pub(*)`) requests from dApp content scripts

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use wallet_keyring::{AccountJson, Keyring};

use crate::error::{Error, Result};
use crate::messages::{payload, TabsMessage};
use crate::port::Port;
use crate::state::{same_account, Grants, State};
use crate::subscription::{combine, subscribe, to_json};
use crate::types::*;

fn reply<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Visible accounts the origin was granted, in the shape dApps receive
pub fn injected_accounts(accounts: &[AccountJson], authorized: &[String]) -> Vec<InjectedAccount> {
    accounts
        .iter()
        .filter(|account| !account.meta.is_hidden())
        .filter(|account| {
            authorized
                .iter()
                .any(|granted| same_account(granted, &account.address))
        })
        .map(InjectedAccount::from)
        .collect()
}

pub struct Tabs {
    keyring: Arc<Mutex<Keyring>>,
    state: Arc<State>,
}

impl Tabs {
    pub fn new(keyring: Arc<Mutex<Keyring>>, state: Arc<State>) -> Self {
        Self { keyring, state }
    }

    pub async fn handle(
        &self,
        id: &str,
        message: TabsMessage,
        request: Value,
        url: &str,
        port: &Port,
    ) -> Result<Value> {
        match message {
            TabsMessage::AuthorizeTab => {
                reply(self.authorize_tab(url, payload(request)?, port).await?)
            }
            TabsMessage::AccountsList => reply(self.accounts_list(url).await?),
            TabsMessage::AccountsSubscribe => reply(self.accounts_subscribe(url, id, port).await?),
            TabsMessage::BytesSign => {
                let payload = SigningPayload::Raw(payload(request)?);
                reply(self.sign(url, payload, port).await?)
            }
            TabsMessage::ExtrinsicSign => {
                let payload = SigningPayload::Json(payload(request)?);
                reply(self.sign(url, payload, port).await?)
            }
            TabsMessage::MetadataList => reply(self.metadata_list(url)?),
            TabsMessage::MetadataProvide => {
                reply(self.metadata_provide(url, payload(request)?, port).await?)
            }
            TabsMessage::Ping => reply(true),
        }
    }

    async fn authorize_tab(
        &self,
        url: &str,
        request: RequestAuthorizeTab,
        port: &Port,
    ) -> Result<AuthResponse> {
        self.state.authorize_url(url, request, port.id()).await
    }

    async fn accounts_list(&self, url: &str) -> Result<Vec<InjectedAccount>> {
        let site = self.state.ensure_url_authorized(url)?;
        let accounts = self.keyring.lock().await.accounts();
        Ok(injected_accounts(&accounts, &site.authorized_accounts))
    }

    /// Push the origin's visible accounts whenever the accounts or its grant
    /// change. A revoked origin receives an empty list.
    async fn accounts_subscribe(&self, url: &str, id: &str, port: &Port) -> Result<bool> {
        let site = self.state.ensure_url_authorized(url)?;
        let accounts = self.keyring.lock().await.subscribe();
        let sources = combine(port, accounts, self.state.subscribe_grants());
        let host = site.id;

        subscribe(port, id, sources, move |(accounts, grants): &(Vec<AccountJson>, Grants)| {
            let authorized = grants.get(&host).map(Vec::as_slice).unwrap_or_default();
            to_json(&injected_accounts(accounts, authorized))
        });
        Ok(true)
    }

    /// Queue a signing request for an account this origin may use
    async fn sign(&self, url: &str, payload: SigningPayload, port: &Port) -> Result<ResponseSigning> {
        let site = self.state.ensure_url_authorized(url)?;
        let address = payload.address().to_string();

        let account = {
            let keyring = self.keyring.lock().await;
            let pair = keyring.get_pair(&address).ok_or(Error::PairNotFound)?;
            if !site
                .authorized_accounts
                .iter()
                .any(|granted| same_account(granted, pair.address()))
            {
                return Err(Error::AccountNotAuthorized(address, url.to_string()));
            }
            pair.to_account_json()
        };

        self.state
            .sign(url, RequestSign { payload }, account, port.id())
            .await
    }

    fn metadata_list(&self, url: &str) -> Result<Vec<InjectedMetadataKnown>> {
        self.state.ensure_url_authorized(url)?;
        Ok(self
            .state
            .known_metadata()
            .into_iter()
            .map(|def| InjectedMetadataKnown {
                genesis_hash: def.genesis_hash,
                spec_version: def.spec_version,
            })
            .collect())
    }

    async fn metadata_provide(&self, url: &str, def: MetadataDef, port: &Port) -> Result<bool> {
        self.state.ensure_url_authorized(url)?;
        self.state.inject_metadata(url, def, port.id()).await
    }
}
