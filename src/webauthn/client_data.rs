use crate::encoding;
use crate::error::{AuthError, Result};
use crate::types::ChallengeContext;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The `clientDataJSON` a browser collects and the authenticator signs over (by hash)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "encoding::base64url")]
    pub challenge: Vec<u8>,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    /// Parse raw client data and check it belongs to `context`
    pub fn parse(raw: &[u8], context: ChallengeContext) -> Result<Self> {
        let data: CollectedClientData = serde_json::from_slice(raw)
            .map_err(|e| AuthError::MalformedPayload(format!("clientDataJSON: {e}")))?;
        if data.kind != context.client_data_type() {
            return Err(AuthError::MalformedPayload(format!(
                "clientDataJSON type {:?}, expected {:?}",
                data.kind,
                context.client_data_type()
            )));
        }
        Ok(data)
    }

    pub fn new(context: ChallengeContext, challenge: &[u8], origin: &str) -> Self {
        Self {
            kind: context.client_data_type().to_string(),
            challenge: challenge.to_vec(),
            origin: origin.to_string(),
            cross_origin: false,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AuthError::Internal(format!("clientDataJSON encoding failed: {e}")))
    }
}

/// SHA-256 of the raw client data, the form in which it is signed
pub fn client_data_hash(raw: &[u8]) -> [u8; 32] {
    Sha256::digest(raw).into()
}
