//! Request and response payloads, one per message kind

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use wallet_keyring::{AccountJson, AccountMeta, KeypairType, KeyringPairJson, KeyringPairsJson};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccountCreateExternal {
    pub address: String,
    #[serde(default)]
    pub genesis_hash: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccountCreateHardware {
    pub account_index: u32,
    pub address: String,
    pub address_offset: u32,
    #[serde(default)]
    pub genesis_hash: Option<String>,
    pub hardware_type: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccountCreateSuri {
    pub name: String,
    #[serde(default)]
    pub genesis_hash: Option<String>,
    pub password: String,
    pub suri: String,
    #[serde(default, rename = "type")]
    pub kind: Option<KeypairType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestAccountEdit {
    pub address: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccountTie {
    pub address: String,
    #[serde(default)]
    pub genesis_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccountShow {
    pub address: String,
    pub is_showing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccountChangePassword {
    pub address: String,
    pub old_pass: String,
    pub new_pass: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestUpdateMeta {
    pub address: String,
    pub meta: AccountMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestAccountForget {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestAccountExport {
    pub address: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAccountExport {
    pub exported_json: KeyringPairJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestAccountBatchExport {
    pub addresses: Vec<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAccountsExport {
    pub exported_json: KeyringPairsJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestAccountValidate {
    pub address: String,
    pub password: String,
}

// ============================================================================
// JSON backups, seeds, derivation
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RequestJsonRestore {
    pub file: KeyringPairJson,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestBatchRestore {
    pub file: KeyringPairsJson,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseJsonGetAccountInfo {
    pub address: String,
    pub name: Option<String>,
    pub genesis_hash: Option<String>,
    #[serde(rename = "type")]
    pub kind: KeypairType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestSeedCreate {
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<KeypairType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseSeedCreate {
    pub address: String,
    pub seed: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestSeedValidate {
    pub suri: String,
    #[serde(default, rename = "type")]
    pub kind: Option<KeypairType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSeedValidate {
    pub address: String,
    pub suri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDeriveValidate {
    pub parent_address: String,
    pub parent_password: String,
    pub suri: String,
}

pub type ResponseDeriveValidate = ResponseSeedValidate;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDeriveCreate {
    #[serde(default)]
    pub genesis_hash: Option<String>,
    pub name: String,
    pub parent_address: String,
    pub parent_password: String,
    pub password: String,
    pub suri: String,
}

// ============================================================================
// Authorization
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAuthorizeTab {
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub authorized_accounts: Vec<String>,
    pub result: bool,
}

/// Persisted decision for one origin host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlInfo {
    pub id: String,
    pub origin: String,
    pub url: String,
    pub authorized_accounts: Vec<String>,
    pub is_allowed: bool,
    #[serde(default)]
    pub count: u64,
}

pub type AuthUrls = BTreeMap<String, AuthUrlInfo>;

#[derive(Debug, Clone, Deserialize)]
pub struct RequestById {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAuthorizeApprove {
    pub id: String,
    pub authorized_accounts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAuthorizeUpdate {
    pub authorized_accounts: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseAuthorizeList {
    pub list: AuthUrls,
}

// ============================================================================
// Metadata
// ============================================================================

/// Fields a chain-specific signed extension contributes to the payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtDef {
    #[serde(default)]
    pub extrinsic: Map<String, Value>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDef {
    pub chain: String,
    pub genesis_hash: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub ss58_format: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub spec_version: u32,
    #[serde(default)]
    pub token_decimals: u32,
    #[serde(default)]
    pub token_symbol: String,
    #[serde(default)]
    pub types: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_extensions: Option<BTreeMap<String, ExtDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_calls: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedMetadataKnown {
    pub genesis_hash: String,
    pub spec_version: u32,
}

// ============================================================================
// Signing
// ============================================================================

/// Extrinsic payload as produced by a dApp's signer. Numeric fields are
/// hex strings; unknown fields feed chain-specific signed extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerPayloadJson {
    pub address: String,
    pub block_hash: String,
    pub block_number: String,
    pub era: String,
    pub genesis_hash: String,
    pub method: String,
    pub nonce: String,
    pub spec_version: String,
    pub tip: String,
    pub transaction_version: String,
    pub signed_extensions: Vec<String>,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_signed_transaction: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerPayloadRaw {
    pub address: String,
    pub data: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SigningPayload {
    Json(SignerPayloadJson),
    Raw(SignerPayloadRaw),
}

impl SigningPayload {
    pub fn address(&self) -> &str {
        match self {
            SigningPayload::Json(payload) => &payload.address,
            SigningPayload::Raw(payload) => &payload.address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSign {
    pub payload: SigningPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSigning {
    pub id: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSigningApprovePassword {
    pub id: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub save_pass: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSigningApproveSignature {
    pub id: String,
    pub signature: String,
    #[serde(default)]
    pub signed_transaction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSigningIsLocked {
    pub is_locked: bool,
    pub remaining_time: u64,
}

// ============================================================================
// dApp side
// ============================================================================

/// Account as exposed to an authorised dApp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedAccount {
    pub address: String,
    pub genesis_hash: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: KeypairType,
}

impl From<&AccountJson> for InjectedAccount {
    fn from(account: &AccountJson) -> Self {
        Self {
            address: account.address.clone(),
            genesis_hash: account.meta.genesis_hash().map(str::to_string),
            name: account.meta.name().map(str::to_string),
            kind: account.kind,
        }
    }
}
