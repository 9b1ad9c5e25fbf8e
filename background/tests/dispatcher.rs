use serde_json::{json, Value};
use sp_core::{sr25519, Pair as _};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use wallet_background::clock::{Clock, ManualClock};
use wallet_background::messages::{MessageEnvelope, TransportResponse};
use wallet_background::password_cache::PASSWORD_EXPIRY_MS;
use wallet_background::port::{Port, PortKind};
use wallet_background::registry::wrap_bytes;
use wallet_background::state::{AuthorizeRequest, SigningRequest, State};
use wallet_background::types::{AuthResponse, RequestAuthorizeTab};
use wallet_background::window::{RecordingOpener, WindowGate};
use wallet_background::{Background, Error};
use wallet_keyring::{generate_mnemonic, KeyValueStore, Keyring, MemoryStore, SEED_LENGTHS};

const DEV_PHRASE: &str = "bottom drive obey lake curtain smoke basket hold race lonely fit walk";
const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
const PASSWORD: &str = "correct horse";
const DAPP_URL: &str = "https://dapp.example.com/swap";

struct Harness {
    background: Arc<Background>,
    clock: ManualClock,
    opener: Arc<RecordingOpener>,
    popup: Port,
    popup_rx: UnboundedReceiver<TransportResponse>,
}

fn harness() -> Harness {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(1_700_000_000_000);
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let keyring = Keyring::load(store.clone(), 42).unwrap();
    let state = State::load(store, shared_clock.clone()).unwrap();
    let opener = Arc::new(RecordingOpener::default());
    let window = WindowGate::new("chrome-extension://wallet/index.html", opener.clone());

    let background = Arc::new(Background::new(
        keyring,
        state,
        window,
        shared_clock,
        PASSWORD_EXPIRY_MS,
    ));
    let (popup, popup_rx) = Port::new(PortKind::Extension);

    Harness {
        background,
        clock,
        opener,
        popup,
        popup_rx,
    }
}

async fn call(background: &Background, port: &Port, message: &str, request: Value) -> Result<Value, Error> {
    background
        .handle(
            port,
            MessageEnvelope {
                id: "1".to_string(),
                message: message.to_string(),
                request,
            },
        )
        .await
}

impl Harness {
    async fn call(&self, message: &str, request: Value) -> Result<Value, Error> {
        call(&self.background, &self.popup, message, request).await
    }

    async fn add_alice(&self) {
        let created = self
            .call(
                "pri(accounts.create.suri)",
                json!({ "name": "Alice", "suri": "//Alice", "password": PASSWORD }),
            )
            .await
            .unwrap();
        assert_eq!(created, json!(true));
    }

    /// Connect a dApp tab and let the popup grant it Alice
    async fn authorized_tab(&self, url: &str) -> (Port, UnboundedReceiver<TransportResponse>) {
        let (tab, tab_rx) = Port::new(PortKind::Content {
            url: url.to_string(),
        });

        let background = self.background.clone();
        let port = tab.clone();
        let task = tokio::spawn(async move {
            call(&background, &port, "pub(authorize.tab)", json!({ "origin": "Example dApp" })).await
        });

        let id = self.next_request_id(|state| {
            state.auth_requests.subscribe()
        })
        .await;
        self.call(
            "pri(authorize.approve)",
            json!({ "id": id, "authorizedAccounts": [ALICE] }),
        )
        .await
        .unwrap();

        let response = task.await.unwrap().unwrap();
        assert_eq!(response["result"], json!(true));
        (tab, tab_rx)
    }

    /// Id of the first queued request once one shows up
    async fn next_request_id<T: HasId>(
        &self,
        queue: impl Fn(&State) -> tokio::sync::watch::Receiver<Vec<T>>,
    ) -> String {
        let mut requests = queue(self.background.state());
        let queued = requests.wait_for(|r| !r.is_empty()).await.unwrap();
        queued[0].id().to_string()
    }

    /// Queue a bytes signing request from `tab` and return its id with the
    /// task awaiting the dApp-side answer
    async fn queue_bytes_sign(
        &self,
        tab: &Port,
        data: &str,
    ) -> (String, tokio::task::JoinHandle<Result<Value, Error>>) {
        let background = self.background.clone();
        let port = tab.clone();
        let request = json!({ "address": ALICE, "data": data, "type": "bytes" });
        let task = tokio::spawn(async move {
            call(&background, &port, "pub(bytes.sign)", request).await
        });

        let id = self
            .next_request_id(|state| state.sign_requests.subscribe())
            .await;
        (id, task)
    }
}

trait HasId {
    fn id(&self) -> &str;
}

impl HasId for AuthorizeRequest {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for SigningRequest {
    fn id(&self) -> &str {
        &self.id
    }
}

fn alice() -> sr25519::Pair {
    sr25519::Pair::from_string(&format!("{}//Alice", DEV_PHRASE), None).unwrap()
}

fn signature_bytes(value: &Value) -> Vec<u8> {
    let hex_sig = value["signature"].as_str().unwrap();
    hex::decode(hex_sig.trim_start_matches("0x")).unwrap()
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_unknown_message_type() {
    let h = harness();
    let err = h.call("pri(accounts.teleport)", json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "Unable to handle message of type pri(accounts.teleport)");
}

#[tokio::test]
async fn test_privileged_message_rejected_on_content_port() {
    let h = harness();
    let (tab, _rx) = Port::new(PortKind::Content {
        url: DAPP_URL.to_string(),
    });

    let err = call(&h.background, &tab, "pri(accounts.forget)", json!({ "address": ALICE }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongPort(_)));

    let err = h.call("pub(accounts.list)", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::WrongPort(_)));
}

#[tokio::test]
async fn test_dispatch_posts_error_frame() {
    let mut h = harness();
    h.background
        .dispatch(
            &h.popup,
            MessageEnvelope {
                id: "42".to_string(),
                message: "pri(signing.cancel)".to_string(),
                request: json!({ "id": "missing" }),
            },
        )
        .await;

    let frame = h.popup_rx.recv().await.unwrap();
    assert_eq!(frame.id, "42");
    assert_eq!(frame.error.as_deref(), Some("Unable to find request"));
    assert!(frame.response.is_none());
}

// ============================================================================
// Seeds and derivation
// ============================================================================

#[tokio::test]
async fn test_seed_create_lengths() {
    let h = harness();

    let created = h.call("pri(seed.create)", Value::Null).await.unwrap();
    assert_eq!(created["seed"].as_str().unwrap().split(' ').count(), 12);
    assert!(created["address"].as_str().unwrap().starts_with('5'));

    let created = h.call("pri(seed.create)", json!({ "length": 24 })).await.unwrap();
    assert_eq!(created["seed"].as_str().unwrap().split(' ').count(), 24);

    assert!(h.call("pri(seed.create)", json!({ "length": 13 })).await.is_err());
}

#[tokio::test]
async fn test_seed_validate_word_counts() {
    let h = harness();

    for words in SEED_LENGTHS {
        let seed = generate_mnemonic(words).unwrap();
        let valid = h
            .call("pri(seed.validate)", json!({ "suri": seed }))
            .await
            .unwrap();
        assert_eq!(valid["suri"], json!(seed));

        let longer = format!("{} abandon", seed);
        let err = h
            .call("pri(seed.validate)", json!({ "suri": longer }))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Mnemonic needs to contain 12, 15, 18, 21, 24 words"
        );
    }

    for bits in [128, 192, 512] {
        let hex_seed = format!("0x{}", "1".repeat(bits / 4));
        let err = h
            .call("pri(seed.validate)", json!({ "suri": hex_seed }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Hex seed needs to be 256-bits");
    }
}

#[tokio::test]
async fn test_seed_validate() {
    let h = harness();

    let valid = h
        .call("pri(seed.validate)", json!({ "suri": format!("{}//Alice", DEV_PHRASE) }))
        .await
        .unwrap();
    assert_eq!(valid["address"], json!(ALICE));

    let hex_seed = format!("0x{}", "ab".repeat(32));
    assert!(h.call("pri(seed.validate)", json!({ "suri": hex_seed })).await.is_ok());

    let short_hex = format!("0x{}", "ab".repeat(31));
    let err = h
        .call("pri(seed.validate)", json!({ "suri": short_hex }))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Hex seed needs to be 256-bits");

    let err = h
        .call("pri(seed.validate)", json!({ "suri": "bottom drive obey lake" }))
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Mnemonic needs to contain"));
}

#[tokio::test]
async fn test_derivation_validate() {
    let h = harness();
    h.add_alice().await;

    let request = json!({ "parentAddress": ALICE, "parentPassword": PASSWORD, "suri": "//0" });
    let first = h.call("pri(derivation.validate)", request.clone()).await.unwrap();
    let second = h.call("pri(derivation.validate)", request).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first["suri"], json!("//0"));
    assert_ne!(first["address"], json!(ALICE));

    let err = h
        .call(
            "pri(derivation.validate)",
            json!({ "parentAddress": ALICE, "parentPassword": "nope", "suri": "//0" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid password");

    let err = h
        .call(
            "pri(derivation.validate)",
            json!({ "parentAddress": ALICE, "parentPassword": PASSWORD, "suri": "///" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "\"///\" is not a valid derivation path");
}

#[tokio::test]
async fn test_derivation_create() {
    let h = harness();
    h.add_alice().await;

    let validated = h
        .call(
            "pri(derivation.validate)",
            json!({ "parentAddress": ALICE, "parentPassword": PASSWORD, "suri": "//staking" }),
        )
        .await
        .unwrap();

    h.call(
        "pri(derivation.create)",
        json!({
            "name": "Alice staking",
            "parentAddress": ALICE,
            "parentPassword": PASSWORD,
            "password": "child pass",
            "suri": "//staking"
        }),
    )
    .await
    .unwrap();

    let keyring = h.background.keyring().lock().await;
    let child = keyring
        .get_pair(validated["address"].as_str().unwrap())
        .unwrap();
    assert_eq!(child.meta().get_str("parentAddress"), Some(ALICE));
    assert_eq!(child.meta().name(), Some("Alice staking"));
    assert!(child.is_locked());
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_account_meta_updates() {
    let h = harness();
    h.add_alice().await;

    h.call("pri(accounts.edit)", json!({ "address": ALICE, "name": "Renamed" }))
        .await
        .unwrap();
    h.call("pri(accounts.show)", json!({ "address": ALICE, "isShowing": false }))
        .await
        .unwrap();
    h.call(
        "pri(accounts.tie)",
        json!({ "address": ALICE, "genesisHash": "0x91b171bb158e2d3848fa23a9f1c25182fb8e20313b2c1eb49219da7a70ce90c3" }),
    )
    .await
    .unwrap();

    let keyring = h.background.keyring().lock().await;
    let meta = keyring.get_pair(ALICE).unwrap().meta().clone();
    assert_eq!(meta.name(), Some("Renamed"));
    assert!(meta.is_hidden());
    assert!(meta.genesis_hash().unwrap().starts_with("0x91b1"));
    drop(keyring);

    let err = h
        .call("pri(accounts.edit)", json!({ "address": "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty", "name": "x" }))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unable to find pair");
}

#[tokio::test]
async fn test_accounts_validate_and_change_password() {
    let h = harness();
    h.add_alice().await;

    let ok = h
        .call("pri(accounts.validate)", json!({ "address": ALICE, "password": PASSWORD }))
        .await
        .unwrap();
    assert_eq!(ok, json!(true));

    let wrong = h
        .call("pri(accounts.validate)", json!({ "address": ALICE, "password": "wrong" }))
        .await
        .unwrap();
    assert_eq!(wrong, json!(false));

    let unknown = h
        .call("pri(accounts.validate)", json!({ "address": "not-an-address", "password": PASSWORD }))
        .await
        .unwrap();
    assert_eq!(unknown, json!(false));

    let err = h
        .call(
            "pri(accounts.changePassword)",
            json!({ "address": ALICE, "oldPass": "wrong", "newPass": "new" }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "oldPass is invalid");

    h.call(
        "pri(accounts.changePassword)",
        json!({ "address": ALICE, "oldPass": PASSWORD, "newPass": "new" }),
    )
    .await
    .unwrap();
    let ok = h
        .call("pri(accounts.validate)", json!({ "address": ALICE, "password": "new" }))
        .await
        .unwrap();
    assert_eq!(ok, json!(true));
}

#[tokio::test]
async fn test_export_and_restore() {
    let h = harness();
    h.add_alice().await;

    let exported = h
        .call("pri(accounts.export)", json!({ "address": ALICE, "password": PASSWORD }))
        .await
        .unwrap();
    let file = exported["exportedJson"].clone();

    let info = h.call("pri(json.account.info)", file.clone()).await.unwrap();
    assert_eq!(info["address"], json!(ALICE));
    assert_eq!(info["name"], json!("Alice"));
    assert_eq!(info["type"], json!("sr25519"));

    h.call("pri(accounts.forget)", json!({ "address": ALICE })).await.unwrap();
    assert!(h.background.keyring().lock().await.is_empty());

    let err = h
        .call("pri(json.restore)", json!({ "file": file.clone(), "password": "wrong" }))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unable to decode using the supplied passphrase");

    h.call("pri(json.restore)", json!({ "file": file, "password": PASSWORD }))
        .await
        .unwrap();
    assert!(h.background.keyring().lock().await.get_pair(ALICE).is_some());
}

#[tokio::test]
async fn test_external_and_hardware_accounts() {
    let h = harness();

    h.call(
        "pri(accounts.create.external)",
        json!({ "address": ALICE, "name": "Watch", "genesisHash": null }),
    )
    .await
    .unwrap();
    h.call(
        "pri(accounts.create.hardware)",
        json!({
            "accountIndex": 0,
            "address": "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty",
            "addressOffset": 0,
            "hardwareType": "ledger",
            "name": "Ledger"
        }),
    )
    .await
    .unwrap();

    let keyring = h.background.keyring().lock().await;
    assert_eq!(keyring.len(), 2);
    let watch = keyring.get_pair(ALICE).unwrap();
    assert!(watch.meta().is_external());
    assert!(!watch.has_secret());
    let ledger = keyring
        .get_pair("5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty")
        .unwrap();
    assert!(ledger.meta().is_hardware());
    assert_eq!(ledger.meta().get_str("hardwareType"), Some("ledger"));
}

#[tokio::test]
async fn test_accounts_subscription_pushes_changes() {
    let mut h = harness();

    let subscribed = h.call("pri(accounts.subscribe)", json!({})).await.unwrap();
    assert_eq!(subscribed, json!(true));

    let initial = h.popup_rx.recv().await.unwrap();
    assert_eq!(initial.subscription, Some(json!([])));

    h.add_alice().await;
    let update = h.popup_rx.recv().await.unwrap();
    let accounts = update.subscription.unwrap();
    assert_eq!(accounts[0]["address"], json!(ALICE));
    assert_eq!(accounts[0]["name"], json!("Alice"));
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_authorize_approve_resolves_waiter() {
    let h = harness();
    let state = h.background.state();

    let pending = state
        .auth_requests
        .create(
            "r1",
            AuthorizeRequest {
                id: "r1".to_string(),
                request: RequestAuthorizeTab {
                    origin: "dApp".to_string(),
                },
                url: DAPP_URL.to_string(),
            },
            0,
        )
        .unwrap();

    let approved = h
        .call("pri(authorize.approve)", json!({ "id": "r1", "authorizedAccounts": [ALICE] }))
        .await
        .unwrap();
    assert_eq!(approved, json!(true));

    assert_eq!(
        pending.await.unwrap().unwrap(),
        AuthResponse {
            authorized_accounts: vec![ALICE.to_string()],
            result: true,
        }
    );
    assert!(state.auth_requests.get("r1").is_none());

    let err = h
        .call("pri(authorize.approve)", json!({ "id": "r1", "authorizedAccounts": [] }))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unable to find request");
}

#[tokio::test]
async fn test_tab_requires_authorization() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = Port::new(PortKind::Content {
        url: DAPP_URL.to_string(),
    });

    let err = call(&h.background, &tab, "pub(accounts.list)", json!({}))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("The source {} has not been enabled yet", DAPP_URL)
    );

    let pong = call(&h.background, &tab, "pub(ping)", Value::Null).await.unwrap();
    assert_eq!(pong, json!(true));
}

#[tokio::test]
async fn test_authorized_tab_lists_granted_accounts() {
    let h = harness();
    h.add_alice().await;
    h.call(
        "pri(accounts.create.suri)",
        json!({ "name": "Bob", "suri": "//Bob", "password": PASSWORD }),
    )
    .await
    .unwrap();

    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;
    let listed = call(&h.background, &tab, "pub(accounts.list)", json!({}))
        .await
        .unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["address"], json!(ALICE));

    // same host, different page: decision is already on record
    let (other, _rx) = Port::new(PortKind::Content {
        url: "https://dapp.example.com/pool".to_string(),
    });
    let again = call(&h.background, &other, "pub(authorize.tab)", json!({ "origin": "Example dApp" }))
        .await
        .unwrap();
    assert_eq!(again["authorizedAccounts"], json!([ALICE]));

    let list = h.call("pri(authorize.list)", Value::Null).await.unwrap();
    assert_eq!(list["list"]["dapp.example.com"]["isAllowed"], json!(true));
}

#[tokio::test]
async fn test_account_pushes_follow_revoked_grant() {
    let h = harness();
    h.add_alice().await;
    let (tab, mut tab_rx) = h.authorized_tab(DAPP_URL).await;

    let subscribed = call(&h.background, &tab, "pub(accounts.subscribe)", json!({}))
        .await
        .unwrap();
    assert_eq!(subscribed, json!(true));
    let initial = tab_rx.recv().await.unwrap().subscription.unwrap();
    assert_eq!(initial[0]["address"], json!(ALICE));

    h.call(
        "pri(authorize.update)",
        json!({ "url": "dapp.example.com", "authorizedAccounts": [] }),
    )
    .await
    .unwrap();
    assert_eq!(tab_rx.recv().await.unwrap().subscription, Some(json!([])));

    // later account changes stay filtered by the current grant
    h.call("pri(accounts.edit)", json!({ "address": ALICE, "name": "Renamed" }))
        .await
        .unwrap();
    assert_eq!(tab_rx.recv().await.unwrap().subscription, Some(json!([])));

    let listed = call(&h.background, &tab, "pub(accounts.list)", json!({}))
        .await
        .unwrap();
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_rejected_origin_stays_blocked() {
    let h = harness();
    let (tab, _rx) = Port::new(PortKind::Content {
        url: DAPP_URL.to_string(),
    });

    let background = h.background.clone();
    let port = tab.clone();
    let task = tokio::spawn(async move {
        call(&background, &port, "pub(authorize.tab)", json!({ "origin": "Example dApp" })).await
    });
    let id = h.next_request_id(|state| state.auth_requests.subscribe()).await;
    h.call("pri(authorize.reject)", json!({ "id": id })).await.unwrap();

    let response = task.await.unwrap().unwrap();
    assert_eq!(response, json!({ "authorizedAccounts": [], "result": false }));

    let err = call(&h.background, &tab, "pub(authorize.tab)", json!({ "origin": "Example dApp" }))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("The source {} is not allowed to interact with this extension", DAPP_URL)
    );

    h.call("pri(authorize.remove)", json!("dapp.example.com")).await.unwrap();
    assert!(h.background.state().auth_urls().is_empty());
}

#[tokio::test]
async fn test_ignored_authorization_gets_no_answer() {
    let h = harness();
    let (tab, _rx) = Port::new(PortKind::Content {
        url: DAPP_URL.to_string(),
    });

    let background = h.background.clone();
    let port = tab.clone();
    let task = tokio::spawn(async move {
        call(&background, &port, "pub(authorize.tab)", json!({ "origin": "Example dApp" })).await
    });
    let id = h.next_request_id(|state| state.auth_requests.subscribe()).await;
    h.call("pri(authorize.ignore)", json!({ "id": id })).await.unwrap();

    assert_eq!(task.await.unwrap().unwrap_err(), Error::Dismissed);
    assert!(h.background.state().auth_urls().is_empty());
}

// ============================================================================
// Metadata
// ============================================================================

fn metadata_def() -> Value {
    json!({
        "chain": "Westend",
        "genesisHash": "0xe143f23803ac50e8f6f8e62695d1ce9e4e1d68aa36c1cd2cfd15340213f3423e",
        "icon": "polkadot",
        "ss58Format": 42,
        "specVersion": 9430,
        "tokenDecimals": 12,
        "tokenSymbol": "WND",
        "types": {}
    })
}

#[tokio::test]
async fn test_metadata_provide_approve_and_reject() {
    let h = harness();
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let background = h.background.clone();
    let port = tab.clone();
    let task = tokio::spawn(async move {
        call(&background, &port, "pub(metadata.provide)", metadata_def()).await
    });
    let mut requests = h.background.state().meta_requests.subscribe();
    let id = requests.wait_for(|r| !r.is_empty()).await.unwrap()[0].id.clone();

    h.call("pri(metadata.approve)", json!({ "id": id })).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), json!(true));

    let known = call(&h.background, &tab, "pub(metadata.list)", Value::Null)
        .await
        .unwrap();
    assert_eq!(known[0]["specVersion"], json!(9430));
    let stored = h
        .call(
            "pri(metadata.get)",
            json!("0xe143f23803ac50e8f6f8e62695d1ce9e4e1d68aa36c1cd2cfd15340213f3423e"),
        )
        .await
        .unwrap();
    assert_eq!(stored["chain"], json!("Westend"));

    let background = h.background.clone();
    let port = tab.clone();
    let task = tokio::spawn(async move {
        call(&background, &port, "pub(metadata.provide)", metadata_def()).await
    });
    let id = requests.wait_for(|r| !r.is_empty()).await.unwrap()[0].id.clone();
    h.call("pri(metadata.reject)", json!({ "id": id })).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap_err().to_string(), "Rejected");
}

// ============================================================================
// Signing
// ============================================================================

#[tokio::test]
async fn test_sign_bytes_once() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let (id, task) = h.queue_bytes_sign(&tab, "0x48656c6c6f").await;
    let approved = h
        .call(
            "pri(signing.approve.password)",
            json!({ "id": id, "password": PASSWORD, "savePass": false }),
        )
        .await
        .unwrap();
    assert_eq!(approved, json!(true));

    let response = task.await.unwrap().unwrap();
    assert_eq!(response["id"], json!(id));
    let signature = sr25519::Signature::from_raw(signature_bytes(&response).try_into().unwrap());
    assert!(sr25519::Pair::verify(
        &signature,
        wrap_bytes(b"Hello"),
        &alice().public()
    ));

    let err = h
        .call(
            "pri(signing.approve.password)",
            json!({ "id": id, "password": PASSWORD, "savePass": false }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unable to find request");
    assert!(h.background.keyring().lock().await.get_pair(ALICE).unwrap().is_locked());
}

#[tokio::test]
async fn test_wrong_signing_password_can_be_retried() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let (id, task) = h.queue_bytes_sign(&tab, "0x48656c6c6f").await;
    let err = h
        .call(
            "pri(signing.approve.password)",
            json!({ "id": id, "password": "typo", "savePass": false }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unable to decode using the supplied passphrase");
    assert!(h.background.state().sign_requests.contains(&id));
    assert!(!task.is_finished());

    let approved = h
        .call(
            "pri(signing.approve.password)",
            json!({ "id": id, "password": PASSWORD, "savePass": false }),
        )
        .await
        .unwrap();
    assert_eq!(approved, json!(true));

    let response = task.await.unwrap().unwrap();
    let signature = sr25519::Signature::from_raw(signature_bytes(&response).try_into().unwrap());
    assert!(sr25519::Pair::verify(
        &signature,
        wrap_bytes(b"Hello"),
        &alice().public()
    ));
}

#[tokio::test]
async fn test_sign_extrinsic_prefixes_signature() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let background = h.background.clone();
    let port = tab.clone();
    let payload = json!({
        "address": ALICE,
        "blockHash": format!("0x{}", "00".repeat(32)),
        "blockNumber": "0x00000001",
        "era": "0x00",
        "genesisHash": format!("0x{}", "11".repeat(32)),
        "method": "0x0500",
        "nonce": "0x00",
        "specVersion": "0x00000001",
        "tip": "0x00",
        "transactionVersion": "0x00000001",
        "signedExtensions": ["CheckSpecVersion"],
        "version": 4
    });
    let task = tokio::spawn(async move {
        call(&background, &port, "pub(extrinsic.sign)", payload).await
    });
    let id = h.next_request_id(|state| state.sign_requests.subscribe()).await;

    h.call(
        "pri(signing.approve.password)",
        json!({ "id": id, "password": PASSWORD, "savePass": false }),
    )
    .await
    .unwrap();

    let response = task.await.unwrap().unwrap();
    let bytes = signature_bytes(&response);
    assert_eq!(bytes.len(), 65);
    assert_eq!(bytes[0], 1);

    let signature = sr25519::Signature::from_raw(bytes[1..].try_into().unwrap());
    assert!(sr25519::Pair::verify(
        &signature,
        [0x05, 0x00, 0x01, 0x00, 0x00, 0x00],
        &alice().public()
    ));
}

#[tokio::test]
async fn test_sign_from_unauthorized_account() {
    let h = harness();
    h.add_alice().await;
    h.call(
        "pri(accounts.create.suri)",
        json!({ "name": "Bob", "suri": "//Bob", "password": PASSWORD }),
    )
    .await
    .unwrap();
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let bob = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    let err = call(
        &h.background,
        &tab,
        "pub(bytes.sign)",
        json!({ "address": bob, "data": "0x00", "type": "bytes" }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::AccountNotAuthorized(..)));
    assert!(h.background.state().sign_requests.is_empty());
}

#[tokio::test]
async fn test_cancel_signing_once() {
    let h = harness();
    let state = h.background.state();

    let request: SigningRequest = serde_json::from_value(json!({
        "account": { "address": ALICE, "type": "sr25519", "name": "Alice" },
        "id": "s1",
        "request": { "payload": { "address": ALICE, "data": "0x00", "type": "bytes" } },
        "url": DAPP_URL
    }))
    .unwrap();
    let pending = state.sign_requests.create("s1", request, 0).unwrap();

    let cancelled = h.call("pri(signing.cancel)", json!({ "id": "s1" })).await.unwrap();
    assert_eq!(cancelled, json!(true));
    assert_eq!(pending.await.unwrap().unwrap_err().to_string(), "Cancelled");

    let err = h.call("pri(signing.cancel)", json!({ "id": "s1" })).await.unwrap_err();
    assert_eq!(err.to_string(), "Unable to find request");
}

#[tokio::test]
async fn test_saved_password_expires() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let (id, task) = h.queue_bytes_sign(&tab, "0x01").await;
    let locked = h.call("pri(signing.isLocked)", json!({ "id": id })).await.unwrap();
    assert_eq!(locked, json!({ "isLocked": true, "remainingTime": 0 }));

    h.call(
        "pri(signing.approve.password)",
        json!({ "id": id, "password": PASSWORD, "savePass": true }),
    )
    .await
    .unwrap();
    task.await.unwrap().unwrap();

    // within the window: no password needed
    h.clock.advance(60_000);
    let (id, task) = h.queue_bytes_sign(&tab, "0x02").await;
    let status = h.call("pri(signing.isLocked)", json!({ "id": id })).await.unwrap();
    assert_eq!(status["isLocked"], json!(false));
    assert_eq!(status["remainingTime"], json!(PASSWORD_EXPIRY_MS - 60_000));
    let approved = h
        .call("pri(signing.approve.password)", json!({ "id": id, "savePass": false }))
        .await
        .unwrap();
    assert_eq!(approved, json!(true));
    task.await.unwrap().unwrap();

    // savePass=false locked the pair again, so the next one needs a password
    let (id, task) = h.queue_bytes_sign(&tab, "0x03").await;
    let approved = h
        .call("pri(signing.approve.password)", json!({ "id": id, "savePass": false }))
        .await
        .unwrap();
    assert_eq!(approved, json!(false));
    assert_eq!(
        task.await.unwrap().unwrap_err().to_string(),
        "Password needed to unlock the account"
    );
}

#[tokio::test]
async fn test_saved_password_lapses_after_expiry() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let (id, task) = h.queue_bytes_sign(&tab, "0x01").await;
    h.call(
        "pri(signing.approve.password)",
        json!({ "id": id, "password": PASSWORD, "savePass": true }),
    )
    .await
    .unwrap();
    task.await.unwrap().unwrap();

    h.clock.advance(PASSWORD_EXPIRY_MS + 1);
    let (id, task) = h.queue_bytes_sign(&tab, "0x02").await;
    let status = h.call("pri(signing.isLocked)", json!({ "id": id })).await.unwrap();
    assert_eq!(status, json!({ "isLocked": true, "remainingTime": 0 }));

    let approved = h
        .call("pri(signing.approve.password)", json!({ "id": id, "savePass": false }))
        .await
        .unwrap();
    assert_eq!(approved, json!(false));
    assert_eq!(
        task.await.unwrap().unwrap_err().to_string(),
        "Password needed to unlock the account"
    );
}

#[tokio::test]
async fn test_disconnect_drops_pending_requests() {
    let h = harness();
    h.add_alice().await;
    let (tab, _rx) = h.authorized_tab(DAPP_URL).await;

    let (_id, task) = h.queue_bytes_sign(&tab, "0x01").await;
    h.background.disconnect(&tab);

    assert_eq!(task.await.unwrap().unwrap_err(), Error::Dismissed);
    assert!(h.background.state().sign_requests.is_empty());
    assert!(tab.is_closed());
}

// ============================================================================
// Window / settings
// ============================================================================

#[tokio::test]
async fn test_window_open_allow_list() {
    let h = harness();

    let opened = h.call("pri(window.open)", json!("/account/create")).await.unwrap();
    assert_eq!(opened, json!(true));
    assert_eq!(
        h.opener.opened(),
        vec!["chrome-extension://wallet/index.html#/account/create".to_string()]
    );

    let refused = h
        .call("pri(window.open)", json!("https://evil.example"))
        .await
        .unwrap();
    assert_eq!(refused, json!(false));
    assert_eq!(h.opener.opened().len(), 1);
}

#[tokio::test]
async fn test_notification_setting() {
    let h = harness();

    h.call("pri(settings.notification)", json!("window")).await.unwrap();
    assert_eq!(
        serde_json::to_value(h.background.state().notification()).unwrap(),
        json!("window")
    );
    assert!(h
        .call("pri(settings.notification)", json!("banner"))
        .await
        .is_err());
}
