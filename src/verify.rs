//! Registration structure checks and assertion signature verification.

use crate::config::CeremonyConfig;
use crate::crypto::cose::PublicKeyMaterial;
use crate::error::{AuthError, Result};
use crate::types::{Challenge, CredentialRecord};
use crate::webauthn::attestation::AttestationObject;
use crate::webauthn::authenticator_data::{rp_id_hash, AuthenticatorData};
use crate::webauthn::credential::{AssertionCredential, RegistrationCredential};

/// Key material accepted from a registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedKey {
    pub public_key: PublicKeyMaterial,
    pub sign_count: u32,
    pub aaguid: [u8; 16],
    pub backup_eligible: bool,
}

/// Checks submitted credentials against one relying party configuration
pub struct Verifier<'a> {
    config: &'a CeremonyConfig,
    rp_id_hash: [u8; 32],
}

impl<'a> Verifier<'a> {
    pub fn new(config: &'a CeremonyConfig) -> Self {
        Self {
            config,
            rp_id_hash: rp_id_hash(&config.relying_party.id),
        }
    }

    /// Check a newly created credential is well formed and bound to this relying party
    ///
    /// No statement is made about the authenticator itself: only the `none`
    /// attestation format is accepted.
    ///
    /// # Errors
    /// Every failure is `RegistrationRejected` with the reason.
    pub fn verify_attestation_structure(
        &self,
        credential: &RegistrationCredential,
    ) -> Result<AttestedKey> {
        let client_data = &credential.client_data;
        if !self.config.is_allowed_origin(&client_data.origin) {
            return Err(rejected(format!("origin {:?} is not allowed", client_data.origin)));
        }
        if client_data.cross_origin {
            return Err(rejected("cross-origin registration"));
        }

        let object = AttestationObject::parse(&credential.attestation_object).map_err(as_rejection)?;
        if !object.is_self_asserted() {
            return Err(rejected(format!("attestation format {:?} is not supported", object.fmt)));
        }

        let auth_data = AuthenticatorData::parse(&object.auth_data).map_err(as_rejection)?;
        if auth_data.rp_id_hash != self.rp_id_hash {
            return Err(rejected("relying party id hash mismatch"));
        }
        if !auth_data.user_present() {
            return Err(rejected("user presence not asserted"));
        }
        if self.config.user_verification.is_required() && !auth_data.user_verified() {
            return Err(rejected("user verification required"));
        }
        let Some(attested) = &auth_data.attested_credential else {
            return Err(rejected("no attested credential data"));
        };
        if attested.credential_id != credential.id.as_bytes() {
            return Err(rejected("credential id differs from attested credential data"));
        }

        let public_key = PublicKeyMaterial::from_cose(&attested.public_key_cose)?;
        if !self.config.algorithms.contains(&public_key.algorithm()) {
            return Err(rejected(format!(
                "algorithm {} was not offered",
                public_key.algorithm().id()
            )));
        }

        Ok(AttestedKey {
            public_key,
            sign_count: auth_data.sign_count,
            aaguid: attested.aaguid,
            backup_eligible: auth_data.backup_eligible(),
        })
    }

    /// Verify an assertion against a stored credential and the consumed challenge
    ///
    /// Checks, in order: the embedded challenge, the origin and relying party
    /// binding, the user presence and verification flags, then the signature
    /// over `authenticatorData || SHA-256(clientDataJSON)`.
    ///
    /// # Returns
    /// The sign counter the authenticator reported.
    ///
    /// # Errors
    /// - `ChallengeMismatch` - the signed client data names a different challenge
    /// - `OriginMismatch` - origin not allowed, cross-origin, or wrong RP id hash
    /// - `UserVerificationFailed` - missing user presence, or verification when required
    /// - `SignatureInvalid` - the signature does not verify against `record.public_key`
    pub fn verify_assertion(
        &self,
        record: &CredentialRecord,
        assertion: &AssertionCredential,
        expected_challenge: &Challenge,
    ) -> Result<u32> {
        if assertion.client_challenge() != expected_challenge.as_bytes() {
            return Err(AuthError::ChallengeMismatch);
        }

        let client_data = &assertion.client_data;
        if !self.config.is_allowed_origin(&client_data.origin) || client_data.cross_origin {
            return Err(AuthError::OriginMismatch);
        }
        let auth_data = &assertion.authenticator_data;
        if auth_data.rp_id_hash != self.rp_id_hash {
            return Err(AuthError::OriginMismatch);
        }

        if !auth_data.user_present() {
            return Err(AuthError::UserVerificationFailed);
        }
        if self.config.user_verification.is_required() && !auth_data.user_verified() {
            return Err(AuthError::UserVerificationFailed);
        }

        record
            .public_key
            .verify(&assertion.signed_payload(), &assertion.signature)?;
        Ok(auth_data.sign_count)
    }
}

fn rejected(reason: impl Into<String>) -> AuthError {
    AuthError::RegistrationRejected(reason.into())
}

fn as_rejection(err: AuthError) -> AuthError {
    match err {
        AuthError::RegistrationRejected(reason) | AuthError::MalformedPayload(reason) => {
            AuthError::RegistrationRejected(reason)
        }
        other => other,
    }
}
