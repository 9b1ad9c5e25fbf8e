//! Per-request signing payload encoder
//!
//! A [`TypeRegistry`] is built for one signing request from the target
//! chain's metadata and is never shared between requests.

use codec::{Compact, Encode};
use serde_json::Value;
use sp_core::hashing::blake2_256;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{ExtDef, MetadataDef, SignerPayloadJson};

/// Payloads above this size are signed as their blake2-256 hash
pub const MAX_UNHASHED_PAYLOAD: usize = 256;

const BYTES_PREFIX: &[u8] = b"<Bytes>";
const BYTES_SUFFIX: &[u8] = b"</Bytes>";

/// Built-in extensions that add nothing to the signed payload
const EMPTY_EXTENSIONS: [&str; 6] = [
    "CheckNonZeroSender",
    "CheckWeight",
    "PrevalidateAttests",
    "CheckBlockGasLimit",
    "StorageWeightReclaim",
    "CheckOnlySudoAccount",
];

const BUILTIN_EXTENSIONS: [&str; 9] = [
    "CheckMortality",
    "CheckEra",
    "CheckNonce",
    "ChargeTransactionPayment",
    "ChargeAssetTxPayment",
    "CheckMetadataHash",
    "CheckSpecVersion",
    "CheckTxVersion",
    "CheckGenesis",
];

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    chain: Option<String>,
    ss58_format: u16,
    signed_extensions: Vec<String>,
    user_extensions: BTreeMap<String, ExtDef>,
}

impl TypeRegistry {
    pub fn new(ss58_format: u16) -> Self {
        Self {
            chain: None,
            ss58_format,
            signed_extensions: Vec::new(),
            user_extensions: BTreeMap::new(),
        }
    }

    /// Registry for a chain; falls back to defaults when the chain is unknown
    pub fn for_chain(def: Option<&MetadataDef>, default_ss58: u16) -> Self {
        match def {
            Some(def) => Self {
                chain: Some(def.chain.clone()),
                ss58_format: def.ss58_format,
                signed_extensions: Vec::new(),
                user_extensions: def.user_extensions.clone().unwrap_or_default(),
            },
            None => Self::new(default_ss58),
        }
    }

    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref()
    }

    pub fn ss58_format(&self) -> u16 {
        self.ss58_format
    }

    pub fn signed_extensions(&self) -> &[String] {
        &self.signed_extensions
    }

    fn is_known(&self, name: &str) -> bool {
        BUILTIN_EXTENSIONS.contains(&name)
            || EMPTY_EXTENSIONS.contains(&name)
            || self.user_extensions.contains_key(name)
    }

    pub fn set_signed_extensions(
        &mut self,
        names: &[String],
        user_extensions: Option<&BTreeMap<String, ExtDef>>,
    ) {
        if let Some(user_extensions) = user_extensions {
            self.user_extensions
                .extend(user_extensions.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        for name in names {
            if !self.is_known(name) {
                tracing::warn!("Unknown signed extension {}, treated as empty", name);
            }
        }

        self.signed_extensions = names.to_vec();
    }

    /// SCALE signing payload: `method ‖ extra… ‖ additional…`
    pub fn encode_payload(&self, payload: &SignerPayloadJson) -> Result<Vec<u8>> {
        let mut extra = Vec::new();
        let mut additional = Vec::new();

        for name in &self.signed_extensions {
            self.encode_extension(name, payload, &mut extra, &mut additional)?;
        }

        let mut out = hex_bytes("method", &payload.method)?;
        out.extend(extra);
        out.extend(additional);
        Ok(out)
    }

    fn encode_extension(
        &self,
        name: &str,
        payload: &SignerPayloadJson,
        extra: &mut Vec<u8>,
        additional: &mut Vec<u8>,
    ) -> Result<()> {
        match name {
            "CheckMortality" | "CheckEra" => {
                extra.extend(hex_bytes("era", &payload.era)?);
                additional.extend(hex_bytes("blockHash", &payload.block_hash)?);
            }
            "CheckNonce" => {
                let nonce = hex_number("nonce", &payload.nonce)?;
                let nonce = u64::try_from(nonce)
                    .map_err(|_| Error::Encoding(format!("nonce {} out of range", nonce)))?;
                Compact(nonce).encode_to(extra);
            }
            "ChargeTransactionPayment" => {
                Compact(hex_number("tip", &payload.tip)?).encode_to(extra);
            }
            "ChargeAssetTxPayment" => {
                Compact(hex_number("tip", &payload.tip)?).encode_to(extra);
                extra.extend(encode_asset_id(payload.asset_id.as_ref())?);
            }
            "CheckMetadataHash" => {
                extra.push(payload.mode.unwrap_or(0));
                match &payload.metadata_hash {
                    Some(hash) => {
                        additional.push(1);
                        additional.extend(hex_bytes("metadataHash", hash)?);
                    }
                    None => additional.push(0),
                }
            }
            "CheckSpecVersion" => {
                additional.extend(hex_u32("specVersion", &payload.spec_version)?.to_le_bytes());
            }
            "CheckTxVersion" => {
                additional.extend(
                    hex_u32("transactionVersion", &payload.transaction_version)?.to_le_bytes(),
                );
            }
            "CheckGenesis" => {
                additional.extend(hex_bytes("genesisHash", &payload.genesis_hash)?);
            }
            other => {
                if let Some(def) = self.user_extensions.get(other) {
                    for field in def.extrinsic.keys() {
                        extra.extend(user_field(other, field, payload)?);
                    }
                    for field in def.payload.keys() {
                        additional.extend(user_field(other, field, payload)?);
                    }
                }
            }
        }
        Ok(())
    }
}

fn user_field(extension: &str, field: &str, payload: &SignerPayloadJson) -> Result<Vec<u8>> {
    match payload.extra.get(field) {
        Some(Value::String(value)) => hex_bytes(field, value),
        _ => Err(Error::Encoding(format!(
            "{} requires hex field {}",
            extension, field
        ))),
    }
}

fn encode_asset_id(asset_id: Option<&Value>) -> Result<Vec<u8>> {
    match asset_id {
        None | Some(Value::Null) => Ok(vec![0]),
        Some(Value::String(hex)) => {
            let mut out = vec![1];
            out.extend(hex_bytes("assetId", hex)?);
            Ok(out)
        }
        Some(Value::Number(n)) => {
            let id = n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| Error::Encoding(format!("assetId {} out of range", n)))?;
            let mut out = vec![1];
            id.encode_to(&mut out);
            Ok(out)
        }
        Some(other) => Err(Error::Encoding(format!("Unsupported assetId {}", other))),
    }
}

pub fn hex_bytes(field: &str, value: &str) -> Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| Error::Encoding(format!("{}: {}", field, e)))
}

fn hex_number(field: &str, value: &str) -> Result<u128> {
    match value.strip_prefix("0x") {
        Some("") => Ok(0),
        Some(digits) => u128::from_str_radix(digits, 16),
        None => value.parse::<u128>(),
    }
    .map_err(|e| Error::Encoding(format!("{}: {}", field, e)))
}

fn hex_u32(field: &str, value: &str) -> Result<u32> {
    let n = hex_number(field, value)?;
    u32::try_from(n).map_err(|_| Error::Encoding(format!("{} {} out of range", field, n)))
}

/// Bytes actually handed to the signer
pub fn signable(payload: Vec<u8>) -> Vec<u8> {
    if payload.len() > MAX_UNHASHED_PAYLOAD {
        blake2_256(&payload).to_vec()
    } else {
        payload
    }
}

/// Wrap raw data in `<Bytes>…</Bytes>` unless it already is
pub fn wrap_bytes(data: &[u8]) -> Vec<u8> {
    if data.starts_with(BYTES_PREFIX) && data.ends_with(BYTES_SUFFIX) {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len() + BYTES_PREFIX.len() + BYTES_SUFFIX.len());
    out.extend_from_slice(BYTES_PREFIX);
    out.extend_from_slice(data);
    out.extend_from_slice(BYTES_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    const GENESIS: &str = "0x91b171bb158e2d3848fa23a9f1c25182fb8e20313b2c1eb49219da7a70ce90c3";
    const BLOCK: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

    fn payload() -> SignerPayloadJson {
        SignerPayloadJson {
            address: "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string(),
            block_hash: BLOCK.to_string(),
            block_number: "0x00000010".to_string(),
            era: "0x0500".to_string(),
            genesis_hash: GENESIS.to_string(),
            method: "0x0403".to_string(),
            nonce: "0x00000005".to_string(),
            spec_version: "0x000024d6".to_string(),
            tip: "0x00000000000000000000000000000000".to_string(),
            transaction_version: "0x00000019".to_string(),
            signed_extensions: Vec::new(),
            version: 4,
            asset_id: None,
            metadata_hash: None,
            mode: None,
            with_signed_transaction: None,
            extra: Map::new(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standard_extension_order() {
        let mut registry = TypeRegistry::new(0);
        registry.set_signed_extensions(
            &names(&[
                "CheckNonZeroSender",
                "CheckSpecVersion",
                "CheckTxVersion",
                "CheckGenesis",
                "CheckMortality",
                "CheckNonce",
                "CheckWeight",
                "ChargeTransactionPayment",
            ]),
            None,
        );

        let encoded = registry.encode_payload(&payload()).unwrap();

        let mut expected = vec![0x04, 0x03]; // method
        expected.extend([0x05, 0x00]); // era
        expected.push(5 << 2); // compact nonce
        expected.push(0); // compact tip
        expected.extend(0x24d6u32.to_le_bytes());
        expected.extend(0x19u32.to_le_bytes());
        expected.extend(hex_bytes("", GENESIS).unwrap());
        expected.extend(hex_bytes("", BLOCK).unwrap());
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_metadata_hash_and_asset() {
        let mut registry = TypeRegistry::new(0);
        registry.set_signed_extensions(&names(&["ChargeAssetTxPayment", "CheckMetadataHash"]), None);

        let mut p = payload();
        p.asset_id = Some(json!(7));
        p.mode = Some(1);
        p.metadata_hash = Some(BLOCK.to_string());

        let encoded = registry.encode_payload(&p).unwrap();
        let mut expected = vec![0x04, 0x03, 0x00, 0x01, 7, 0, 0, 0, 0x01, 0x01];
        expected.extend(hex_bytes("", BLOCK).unwrap());
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_user_extension_fields() {
        let mut user = BTreeMap::new();
        let mut def = ExtDef::default();
        def.extrinsic.insert("feeToken".to_string(), json!("u8"));
        def.payload.insert("chainTag".to_string(), json!("u16"));
        user.insert("ChargeFeeToken".to_string(), def);

        let mut registry = TypeRegistry::new(0);
        registry.set_signed_extensions(&names(&["ChargeFeeToken", "SomethingNew"]), Some(&user));

        let mut p = payload();
        assert!(registry.encode_payload(&p).is_err());

        p.extra.insert("feeToken".to_string(), json!("0x02"));
        p.extra.insert("chainTag".to_string(), json!("0xaabb"));
        assert_eq!(
            registry.encode_payload(&p).unwrap(),
            vec![0x04, 0x03, 0x02, 0xaa, 0xbb]
        );
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = TypeRegistry::new(0);
        a.set_signed_extensions(&names(&["CheckNonce"]), None);
        let b = TypeRegistry::new(2);

        assert_eq!(b.encode_payload(&payload()).unwrap(), vec![0x04, 0x03]);
        assert_eq!(a.encode_payload(&payload()).unwrap(), vec![0x04, 0x03, 5 << 2]);
    }

    #[test]
    fn test_signable_hashes_long_payloads() {
        let short = vec![1u8; MAX_UNHASHED_PAYLOAD];
        assert_eq!(signable(short.clone()), short);

        let long = vec![1u8; MAX_UNHASHED_PAYLOAD + 1];
        assert_eq!(signable(long.clone()), blake2_256(&long).to_vec());
    }

    #[test]
    fn test_wrap_bytes() {
        assert_eq!(wrap_bytes(b"hi"), b"<Bytes>hi</Bytes>".to_vec());
        assert_eq!(wrap_bytes(b"<Bytes>hi</Bytes>"), b"<Bytes>hi</Bytes>".to_vec());
    }
}
