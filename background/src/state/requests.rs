use serde::{Deserialize, Serialize};
use wallet_keyring::AccountJson;

use crate::types::{MetadataDef, RequestAuthorizeTab, RequestSign};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub id: String,
    pub request: RequestAuthorizeTab,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub id: String,
    pub request: MetadataDef,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub account: AccountJson,
    pub id: String,
    pub request: RequestSign,
    pub url: String,
}
