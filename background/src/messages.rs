//! Port wire protocol
//!
//! Inbound frames are `{ id, message, request }`; outbound frames carry the
//! same id with exactly one of `response`, `error` or `subscription`.
//! `pri(*)` kinds come from the extension popup, `pub(*)` kinds from dApp
//! content ports.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub request: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Value>,
}

impl TransportResponse {
    pub fn response(id: &str, value: Value) -> Self {
        Self {
            id: id.to_string(),
            response: Some(value),
            error: None,
            subscription: None,
        }
    }

    pub fn error(id: &str, error: &Error) -> Self {
        Self {
            id: id.to_string(),
            response: None,
            error: Some(error.to_string()),
            subscription: None,
        }
    }

    pub fn subscription(id: &str, value: Value) -> Self {
        Self {
            id: id.to_string(),
            response: None,
            error: None,
            subscription: Some(value),
        }
    }
}

/// Decode a request payload into the shape its message kind expects
pub fn payload<T: DeserializeOwned>(request: Value) -> Result<T> {
    Ok(serde_json::from_value(request)?)
}

/// Like [`payload`], but an absent request decodes to the default value
pub fn payload_or_default<T: DeserializeOwned + Default>(request: Value) -> Result<T> {
    if request.is_null() {
        return Ok(T::default());
    }
    payload(request)
}

/// Privileged messages, accepted only from the extension popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionMessage {
    #[serde(rename = "pri(accounts.create.external)")]
    AccountsCreateExternal,
    #[serde(rename = "pri(accounts.create.hardware)")]
    AccountsCreateHardware,
    #[serde(rename = "pri(accounts.create.suri)")]
    AccountsCreateSuri,
    #[serde(rename = "pri(accounts.edit)")]
    AccountsEdit,
    #[serde(rename = "pri(accounts.tie)")]
    AccountsTie,
    #[serde(rename = "pri(accounts.show)")]
    AccountsShow,
    #[serde(rename = "pri(accounts.changePassword)")]
    AccountsChangePassword,
    #[serde(rename = "pri(accounts.updateMeta)")]
    AccountsUpdateMeta,
    #[serde(rename = "pri(accounts.forget)")]
    AccountsForget,
    #[serde(rename = "pri(accounts.export)")]
    AccountsExport,
    #[serde(rename = "pri(accounts.batchExport)")]
    AccountsBatchExport,
    #[serde(rename = "pri(accounts.validate)")]
    AccountsValidate,
    #[serde(rename = "pri(accounts.subscribe)")]
    AccountsSubscribe,
    #[serde(rename = "pri(json.restore)")]
    JsonRestore,
    #[serde(rename = "pri(json.batchRestore)")]
    JsonBatchRestore,
    #[serde(rename = "pri(json.account.info)")]
    JsonAccountInfo,
    #[serde(rename = "pri(seed.create)")]
    SeedCreate,
    #[serde(rename = "pri(seed.validate)")]
    SeedValidate,
    #[serde(rename = "pri(derivation.validate)")]
    DerivationValidate,
    #[serde(rename = "pri(derivation.create)")]
    DerivationCreate,
    #[serde(rename = "pri(authorize.approve)")]
    AuthorizeApprove,
    #[serde(rename = "pri(authorize.reject)")]
    AuthorizeReject,
    #[serde(rename = "pri(authorize.ignore)")]
    AuthorizeIgnore,
    #[serde(rename = "pri(authorize.remove)")]
    AuthorizeRemove,
    #[serde(rename = "pri(authorize.update)")]
    AuthorizeUpdate,
    #[serde(rename = "pri(authorize.list)")]
    AuthorizeList,
    #[serde(rename = "pri(authorize.requests)")]
    AuthorizeRequests,
    #[serde(rename = "pri(metadata.approve)")]
    MetadataApprove,
    #[serde(rename = "pri(metadata.reject)")]
    MetadataReject,
    #[serde(rename = "pri(metadata.get)")]
    MetadataGet,
    #[serde(rename = "pri(metadata.list)")]
    MetadataList,
    #[serde(rename = "pri(metadata.update)")]
    MetadataUpdate,
    #[serde(rename = "pri(metadata.requests)")]
    MetadataRequests,
    #[serde(rename = "pri(signing.approve.password)")]
    SigningApprovePassword,
    #[serde(rename = "pri(signing.approve.signature)")]
    SigningApproveSignature,
    #[serde(rename = "pri(signing.cancel)")]
    SigningCancel,
    #[serde(rename = "pri(signing.isLocked)")]
    SigningIsLocked,
    #[serde(rename = "pri(signing.requests)")]
    SigningRequests,
    #[serde(rename = "pri(window.open)")]
    WindowOpen,
    #[serde(rename = "pri(settings.notification)")]
    SettingsNotification,
    #[serde(rename = "pri(ping)")]
    Ping,
}

/// Messages from dApp content ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TabsMessage {
    #[serde(rename = "pub(authorize.tab)")]
    AuthorizeTab,
    #[serde(rename = "pub(accounts.list)")]
    AccountsList,
    #[serde(rename = "pub(accounts.subscribe)")]
    AccountsSubscribe,
    #[serde(rename = "pub(bytes.sign)")]
    BytesSign,
    #[serde(rename = "pub(extrinsic.sign)")]
    ExtrinsicSign,
    #[serde(rename = "pub(metadata.list)")]
    MetadataList,
    #[serde(rename = "pub(metadata.provide)")]
    MetadataProvide,
    #[serde(rename = "pub(ping)")]
    Ping,
}

/// A wire tag, resolved to the handler family it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Extension(ExtensionMessage),
    Tabs(TabsMessage),
}

impl Message {
    /// Resolve a wire tag; unknown tags are an error, never a no-op
    pub fn parse(tag: &str) -> Result<Self> {
        serde_json::from_value(Value::String(tag.to_string()))
            .map_err(|_| Error::UnhandledMessage(tag.to_string()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(tag)) => f.write_str(&tag),
            _ => Err(fmt::Error),
        }
    }
}
