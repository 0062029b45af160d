//! Software authenticator (testing and demos only)
//!
//! Plays the client and authenticator side of both ceremonies with real
//! keys: it answers [`CreationOptions`] with a `none` attestation and
//! [`RequestOptions`] with a genuinely signed assertion. Keys live in process
//! memory and are never protected, so this must not stand in for a real
//! authenticator outside of tests.

use crate::crypto::cose::PublicKeyMaterial;
use crate::encoding;
use crate::error::{AuthError, Result};
use crate::types::{ChallengeContext, CoseAlgorithm, CreationOptions, RequestOptions};
use crate::webauthn::attestation::AttestationObject;
use crate::webauthn::authenticator_data::{
    rp_id_hash, AttestedCredentialData, AuthenticatorData, FLAG_AT, FLAG_UP, FLAG_UV,
};
use crate::webauthn::client_data::{client_data_hash, CollectedClientData};
use crate::webauthn::credential::{
    AssertionResponseDataJson, AssertionResponseJson, AttestationResponseJson, CredentialType,
    RegistrationResponseJson,
};
use k256::ecdsa::signature::{SignatureEncoding, Signer};
use rand::RngCore;
use rsa::traits::PublicKeyParts;

const CREDENTIAL_ID_LEN: usize = 16;
const RSA_MODULUS_BITS: usize = 2048;

#[derive(Clone)]
enum SoftKey {
    Es256(p256::ecdsa::SigningKey),
    Es256k(k256::ecdsa::SigningKey),
    EdDsa(ed25519_dalek::SigningKey),
    Rs256(rsa::pkcs1v15::SigningKey<sha2::Sha256>),
}

impl SoftKey {
    fn generate(alg: CoseAlgorithm) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let key = match alg {
            CoseAlgorithm::Es256 => SoftKey::Es256(p256::ecdsa::SigningKey::random(&mut rng)),
            CoseAlgorithm::Es256k => SoftKey::Es256k(k256::ecdsa::SigningKey::random(&mut rng)),
            CoseAlgorithm::EdDsa => {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                SoftKey::EdDsa(ed25519_dalek::SigningKey::from_bytes(&seed))
            }
            CoseAlgorithm::Rs256 => {
                let private_key = rsa::RsaPrivateKey::new(&mut rng, RSA_MODULUS_BITS)
                    .map_err(|e| AuthError::Internal(format!("RSA key generation failed: {e}")))?;
                SoftKey::Rs256(rsa::pkcs1v15::SigningKey::new(private_key))
            }
        };
        Ok(key)
    }

    fn public_key(&self) -> PublicKeyMaterial {
        match self {
            SoftKey::Es256(key) => PublicKeyMaterial::Es256 {
                sec1: key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            },
            SoftKey::Es256k(key) => PublicKeyMaterial::Es256k {
                sec1: key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            },
            SoftKey::EdDsa(key) => PublicKeyMaterial::EdDsa {
                x: key.verifying_key().to_bytes().to_vec(),
            },
            SoftKey::Rs256(key) => {
                let private_key: &rsa::RsaPrivateKey = key.as_ref();
                PublicKeyMaterial::Rs256 {
                    n: private_key.n().to_bytes_be(),
                    e: private_key.e().to_bytes_be(),
                }
            }
        }
    }

    /// DER for ECDSA, 64 raw bytes for Ed25519, PKCS#1 v1.5 for RSA
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SoftKey::Es256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            SoftKey::Es256k(key) => {
                let signature: k256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            SoftKey::EdDsa(key) => ed25519_dalek::Signer::sign(key, message).to_bytes().to_vec(),
            SoftKey::Rs256(key) => key.sign(message).to_vec(),
        }
    }
}

#[derive(Clone)]
struct SoftCredential {
    id: Vec<u8>,
    user_handle: Vec<u8>,
    key: SoftKey,
    counter: u32,
}

/// In-memory passkey authenticator bound to one relying party and origin
///
/// Cloning copies every key and counter, which models a cloned authenticator.
///
/// # Example
/// ```rust
/// use passkey_ceremony::crypto::soft::SoftAuthenticator;
/// use passkey_ceremony::{CeremonyConfig, CeremonyEngine, CoseAlgorithm, RegistrationCredential};
///
/// let engine = CeremonyEngine::in_memory(CeremonyConfig::default()).unwrap();
/// let mut authenticator = SoftAuthenticator::new("localhost", "http://localhost:5173");
///
/// let options = engine.start_registration("alice").unwrap();
/// let response = authenticator.create(&options, CoseAlgorithm::Es256).unwrap();
/// let credential = RegistrationCredential::try_from(response).unwrap();
/// engine.finish_registration("alice", credential).unwrap();
/// ```
#[derive(Clone)]
pub struct SoftAuthenticator {
    rp_id: String,
    origin: String,
    credentials: Vec<SoftCredential>,
    counter_enabled: bool,
    user_verifying: bool,
}

impl SoftAuthenticator {
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            origin: origin.into(),
            credentials: Vec::new(),
            counter_enabled: true,
            user_verifying: true,
        }
    }

    /// Report the origin the "browser" is on
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Always report a sign counter of zero
    pub fn without_counter(mut self) -> Self {
        self.counter_enabled = false;
        self
    }

    /// Report user presence but never user verification
    pub fn without_user_verification(mut self) -> Self {
        self.user_verifying = false;
        self
    }

    /// Ids of every credential this authenticator holds, oldest first
    pub fn credential_ids(&self) -> Vec<Vec<u8>> {
        self.credentials.iter().map(|c| c.id.clone()).collect()
    }

    /// Answer `navigator.credentials.create()`
    ///
    /// # Errors
    /// - `RegistrationRejected` - `alg` was not offered, or an excluded credential is held
    pub fn create(
        &mut self,
        options: &CreationOptions,
        alg: CoseAlgorithm,
    ) -> Result<RegistrationResponseJson> {
        if !options.accepted_algorithms().contains(&alg) {
            return Err(AuthError::RegistrationRejected(format!(
                "algorithm {} not offered",
                alg.id()
            )));
        }
        let excluded = options
            .exclude_credentials
            .iter()
            .any(|d| self.credentials.iter().any(|c| c.id == d.id.as_bytes()));
        if excluded {
            return Err(AuthError::RegistrationRejected(
                "authenticator already holds an excluded credential".to_string(),
            ));
        }

        let mut id = vec![0u8; CREDENTIAL_ID_LEN];
        rand::thread_rng().fill_bytes(&mut id);
        let key = SoftKey::generate(alg)?;

        let auth_data = AuthenticatorData {
            rp_id_hash: rp_id_hash(&self.rp_id),
            flags: self.flags() | FLAG_AT,
            sign_count: 0,
            attested_credential: Some(AttestedCredentialData {
                aaguid: [0u8; 16],
                credential_id: id.clone(),
                public_key_cose: key.public_key().to_cose()?,
            }),
        };
        let attestation = AttestationObject::none(auth_data.to_bytes()?).to_bytes()?;
        let client_data = CollectedClientData::new(
            ChallengeContext::Registration,
            options.challenge.as_bytes(),
            &self.origin,
        )
        .to_json()?;

        self.credentials.push(SoftCredential {
            id: id.clone(),
            user_handle: options.user.id.clone(),
            key,
            counter: 0,
        });

        Ok(RegistrationResponseJson {
            id: encoding::encode(&id),
            raw_id: encoding::encode(&id),
            kind: CredentialType::PublicKey,
            response: AttestationResponseJson {
                client_data_json: encoding::encode(client_data),
                attestation_object: encoding::encode(attestation),
                transports: vec!["internal".to_string()],
            },
            authenticator_attachment: Some("platform".to_string()),
        })
    }

    /// Answer `navigator.credentials.get()`
    ///
    /// Uses the first held credential named in `allowCredentials`, or the
    /// newest credential when the list is empty.
    ///
    /// # Errors
    /// - `UserNotFound` - no usable credential is held
    pub fn get(&mut self, options: &RequestOptions) -> Result<AssertionResponseJson> {
        let flags = self.flags();
        let counter_enabled = self.counter_enabled;
        let rp_hash = rp_id_hash(&self.rp_id);
        let origin = self.origin.clone();

        let selected = match options.allow_credentials.is_empty() {
            true => self.credentials.last_mut(),
            false => self.credentials.iter_mut().find(|c| {
                options
                    .allow_credentials
                    .iter()
                    .any(|d| d.id.as_bytes() == c.id.as_slice())
            }),
        };
        let credential = selected.ok_or(AuthError::UserNotFound)?;

        if counter_enabled {
            credential.counter = credential.counter.wrapping_add(1);
        }
        let auth_data = AuthenticatorData {
            rp_id_hash: rp_hash,
            flags,
            sign_count: credential.counter,
            attested_credential: None,
        }
        .to_bytes()?;
        let client_data = CollectedClientData::new(
            ChallengeContext::Authentication,
            options.challenge.as_bytes(),
            &origin,
        )
        .to_json()?;

        let mut payload = auth_data.clone();
        payload.extend_from_slice(&client_data_hash(&client_data));
        let signature = credential.key.sign(&payload);

        Ok(AssertionResponseJson {
            id: encoding::encode(&credential.id),
            raw_id: encoding::encode(&credential.id),
            kind: CredentialType::PublicKey,
            response: AssertionResponseDataJson {
                client_data_json: encoding::encode(client_data),
                authenticator_data: encoding::encode(auth_data),
                signature: encoding::encode(signature),
                user_handle: Some(encoding::encode(&credential.user_handle)),
            },
            authenticator_attachment: Some("platform".to_string()),
        })
    }

    fn flags(&self) -> u8 {
        if self.user_verifying {
            FLAG_UP | FLAG_UV
        } else {
            FLAG_UP
        }
    }
}

impl std::fmt::Debug for SoftAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthenticator")
            .field("rp_id", &self.rp_id)
            .field("origin", &self.origin)
            .field("credentials", &self.credentials.len())
            .field("keys", &"[REDACTED]")
            .finish()
    }
}
