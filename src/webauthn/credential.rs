//! Credential payloads as submitted by clients, and their validated forms.
//!
//! The `*Json` structs mirror `PublicKeyCredential.toJSON()`. Converting them
//! into [`RegistrationCredential`] / [`AssertionCredential`] decodes every
//! field and rejects anything structurally wrong, so the ceremony engine only
//! ever sees well-formed input.

use super::authenticator_data::AuthenticatorData;
use super::client_data::CollectedClientData;
use crate::encoding;
use crate::error::{AuthError, Result};
use crate::types::{ChallengeContext, CredentialId};
use serde::{Deserialize, Serialize};

/// The credential `type`; only public-key credentials exist
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "public-key")]
    PublicKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Wire form of the result of `navigator.credentials.create()`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponseJson {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub response: AttestationResponseJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponseDataJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Wire form of the result of `navigator.credentials.get()`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponseJson {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub response: AssertionResponseDataJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

/// A newly created credential, validated on ingress
#[derive(Clone, Debug)]
pub struct RegistrationCredential {
    pub id: CredentialId,
    pub client_data: CollectedClientData,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub transports: Vec<String>,
}

impl RegistrationCredential {
    /// Parse and validate the JSON a client posts to registration-finish
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: RegistrationResponseJson = serde_json::from_str(json)
            .map_err(|e| AuthError::MalformedPayload(format!("registration credential: {e}")))?;
        Self::try_from(wire)
    }

    /// The challenge the client claims to be answering
    pub fn client_challenge(&self) -> &[u8] {
        &self.client_data.challenge
    }
}

impl TryFrom<RegistrationResponseJson> for RegistrationCredential {
    type Error = AuthError;

    fn try_from(wire: RegistrationResponseJson) -> Result<Self> {
        let id = credential_id(&wire.id, &wire.raw_id)?;
        let client_data_json = encoding::decode(&wire.response.client_data_json, "clientDataJSON")?;
        let client_data = CollectedClientData::parse(&client_data_json, ChallengeContext::Registration)?;
        let attestation_object =
            encoding::decode(&wire.response.attestation_object, "attestationObject")?;

        Ok(Self {
            id,
            client_data,
            client_data_json,
            attestation_object,
            transports: wire.response.transports,
        })
    }
}

/// A signed assertion, validated on ingress
#[derive(Clone, Debug)]
pub struct AssertionCredential {
    pub credential_id: CredentialId,
    pub client_data: CollectedClientData,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: AuthenticatorData,
    /// Exactly the bytes the authenticator signed over
    pub raw_authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

impl AssertionCredential {
    /// Parse and validate the JSON a client posts to authentication-finish
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: AssertionResponseJson = serde_json::from_str(json)
            .map_err(|e| AuthError::MalformedPayload(format!("assertion: {e}")))?;
        Self::try_from(wire)
    }

    /// The challenge the client claims to be answering
    pub fn client_challenge(&self) -> &[u8] {
        &self.client_data.challenge
    }

    /// The payload covered by the signature: `authenticatorData || SHA-256(clientDataJSON)`
    pub fn signed_payload(&self) -> Vec<u8> {
        let mut payload = self.raw_authenticator_data.clone();
        payload.extend_from_slice(&super::client_data::client_data_hash(&self.client_data_json));
        payload
    }
}

impl TryFrom<AssertionResponseJson> for AssertionCredential {
    type Error = AuthError;

    fn try_from(wire: AssertionResponseJson) -> Result<Self> {
        let credential_id = credential_id(&wire.id, &wire.raw_id)?;
        let client_data_json = encoding::decode(&wire.response.client_data_json, "clientDataJSON")?;
        let client_data =
            CollectedClientData::parse(&client_data_json, ChallengeContext::Authentication)?;
        let raw_authenticator_data =
            encoding::decode(&wire.response.authenticator_data, "authenticatorData")?;
        let authenticator_data = AuthenticatorData::parse(&raw_authenticator_data)?;
        let signature = encoding::decode(&wire.response.signature, "signature")?;
        if signature.is_empty() {
            return Err(AuthError::MalformedPayload("signature is empty".to_string()));
        }
        let user_handle = match wire.response.user_handle.as_deref() {
            None | Some("") => None,
            Some(handle) => Some(encoding::decode(handle, "userHandle")?),
        };

        Ok(Self {
            credential_id,
            client_data,
            client_data_json,
            authenticator_data,
            raw_authenticator_data,
            signature,
            user_handle,
        })
    }
}

fn credential_id(id: &str, raw_id: &str) -> Result<CredentialId> {
    let raw = encoding::decode(raw_id, "rawId")?;
    if encoding::decode(id, "id")? != raw {
        return Err(AuthError::MalformedPayload("id and rawId differ".to_string()));
    }
    CredentialId::new(raw)
}
