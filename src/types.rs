use crate::crypto::cose::PublicKeyMaterial;
use crate::encoding;
use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest identity accepted, the WebAuthn user handle limit
pub const MAX_IDENTITY_LEN: usize = 64;

/// Longest credential id accepted
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Caller-supplied identity handle, e.g. a username
///
/// Identities are case-sensitive and compared byte for byte: `"Alice"` and
/// `"alice"` are two different identities. The user handle given to
/// authenticators is the identity's UTF-8 encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(AuthError::MalformedPayload("identity is empty".to_string()));
        }
        if value.len() > MAX_IDENTITY_LEN {
            return Err(AuthError::MalformedPayload(format!(
                "identity exceeds {MAX_IDENTITY_LEN} bytes"
            )));
        }
        Ok(Self(value))
    }

    /// Recover an identity from the user handle an authenticator returned
    pub fn from_user_handle(handle: &[u8]) -> Result<Self> {
        let value = std::str::from_utf8(handle)
            .map_err(|_| AuthError::MalformedPayload("user handle is not UTF-8".to_string()))?;
        Self::new(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn user_handle(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl TryFrom<String> for Identity {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque credential identifier chosen by the authenticator
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialId(Vec<u8>);

impl CredentialId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > MAX_CREDENTIAL_ID_LEN {
            return Err(AuthError::MalformedPayload(format!(
                "credential id length {} outside 1..={MAX_CREDENTIAL_ID_LEN}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<String> for CredentialId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(encoding::decode(&value, "credential id")?)
    }
}

impl From<CredentialId> for String {
    fn from(id: CredentialId) -> Self {
        encoding::encode(id.0)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::encode(&self.0))
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({self})")
    }
}

/// Which ceremony a challenge was issued for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeContext {
    Registration,
    Authentication,
}

impl ChallengeContext {
    /// The collected client data `type` expected for this context
    pub fn client_data_type(self) -> &'static str {
        match self {
            ChallengeContext::Registration => "webauthn.create",
            ChallengeContext::Authentication => "webauthn.get",
        }
    }
}

/// Single-use random challenge
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge(#[serde(with = "encoding::base64url")] Vec<u8>);

impl Challenge {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({} bytes)", self.0.len())
    }
}

/// COSE algorithm identifiers this crate can verify
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CoseAlgorithm {
    /// ECDSA with SHA-256 on P-256
    Es256,
    /// EdDSA on Ed25519
    EdDsa,
    /// ECDSA with SHA-256 on secp256k1
    Es256k,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
}

impl CoseAlgorithm {
    pub fn id(self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Es256k => -47,
            CoseAlgorithm::Rs256 => -257,
        }
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = AuthError;

    fn try_from(id: i64) -> Result<Self> {
        match id {
            -7 => Ok(CoseAlgorithm::Es256),
            -8 => Ok(CoseAlgorithm::EdDsa),
            -47 => Ok(CoseAlgorithm::Es256k),
            -257 => Ok(CoseAlgorithm::Rs256),
            other => Err(AuthError::RegistrationRejected(format!(
                "unsupported algorithm {other}"
            ))),
        }
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

/// A registered public-key credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub identity: Identity,
    pub credential_id: CredentialId,
    pub public_key: PublicKeyMaterial,
    /// Last observed authenticator sign counter; 0 when unsupported
    pub sign_count: u32,
    #[serde(default)]
    pub transports: Vec<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn descriptor(&self) -> CredentialDescriptor {
        CredentialDescriptor {
            kind: PUBLIC_KEY.to_string(),
            id: self.credential_id.clone(),
            transports: self.transports.clone(),
        }
    }
}

const PUBLIC_KEY: &str = "public-key";

/// Relying party entity in creation options
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RpEntity {
    pub id: String,
    pub name: String,
}

/// User entity in creation options
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle, base64url of the identity's UTF-8 bytes
    #[serde(with = "encoding::base64url")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CredentialParameters {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: CoseAlgorithm,
}

/// Reference to a credential in `allowCredentials` / `excludeCredentials`
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: CredentialId,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: crate::config::UserVerification,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationExtensions {
    pub cred_props: bool,
}

/// Parameters returned by registration-start, ready for `navigator.credentials.create`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: Challenge,
    pub rp: RpEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<CredentialParameters>,
    /// Milliseconds
    pub timeout: u64,
    pub attestation: String,
    pub authenticator_selection: AuthenticatorSelection,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub extensions: CreationExtensions,
}

impl CreationOptions {
    pub fn accepted_algorithms(&self) -> Vec<CoseAlgorithm> {
        self.pub_key_cred_params.iter().map(|p| p.alg).collect()
    }
}

/// Parameters for `navigator.credentials.get`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: Challenge,
    /// Milliseconds
    pub timeout: u64,
    pub rp_id: String,
    pub user_verification: crate::config::UserVerification,
    /// Empty for the discoverable flow, letting the authenticator choose
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow_credentials: Vec<CredentialDescriptor>,
}

/// Returned by authentication-start
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationStart {
    /// Per-attempt session token; only set for the discoverable flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub public_key: RequestOptions,
}

impl AuthenticationStart {
    /// Target for finishing a discoverable attempt, `None` when identity-scoped
    pub fn discoverable_target(&self) -> Option<AuthenticationTarget> {
        self.session_id
            .map(|session_id| AuthenticationTarget::Discoverable { session_id })
    }
}

/// Whose authentication attempt an assertion belongs to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthenticationTarget {
    /// The identity named at authentication-start
    Identity(Identity),
    /// A discoverable attempt; the identity comes from the assertion's user handle
    Discoverable { session_id: Uuid },
}

/// Result of a successful registration-finish
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub identity: Identity,
    pub credential_id: CredentialId,
}

/// Result of a successful authentication-finish
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOutcome {
    pub identity: Identity,
    pub credential_id: CredentialId,
    pub registered_at: DateTime<Utc>,
    pub sign_count: u32,
}
