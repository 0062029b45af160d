//! The four-phase registration and authentication protocol.

use crate::config::{CeremonyConfig, CredentialPolicy};
use crate::error::{AuthError, CeremonyPhase, Result};
use crate::store::{
    CeremonySession, CeremonyState, ChallengeStore, ChallengeSubject, CredentialStore,
    MemoryCredentialStore,
};
use crate::types::{
    AuthenticationOutcome, AuthenticationStart, AuthenticationTarget, AuthenticatorSelection,
    Challenge, ChallengeContext, CreationExtensions, CreationOptions, CredentialDescriptor,
    CredentialParameters, CredentialRecord, Identity, RegistrationOutcome, RequestOptions,
    RpEntity, UserEntity,
};
use crate::verify::Verifier;
use crate::webauthn::credential::{AssertionCredential, RegistrationCredential};
use chrono::{Duration, Utc};
use uuid::Uuid;

/// `tracing` target for security events such as sign counter rollbacks
pub const SECURITY_TARGET: &str = "passkey_ceremony::security";

/// Runs registration and authentication ceremonies
///
/// Every method takes `&self`; the engine is meant to be shared (e.g. in an
/// `Arc`) across concurrent request handlers.
///
/// Each `start_authentication(None)` holds a session until it is finished or
/// expires, so unauthenticated clients can make the challenge store grow for
/// up to one timeout. Expired sessions are swept automatically every
/// [`SWEEP_INTERVAL`](crate::store::challenge::SWEEP_INTERVAL) issues; hosts
/// that want a tighter bound should rate-limit that endpoint and can watch
/// [`pending_challenges`](Self::pending_challenges).
///
/// # Example
/// ```rust
/// use passkey_ceremony::{AuthError, CeremonyConfig, CeremonyEngine};
///
/// let engine = CeremonyEngine::in_memory(CeremonyConfig::default()).unwrap();
/// let options = engine.start_registration("alice").unwrap();
/// assert_eq!(options.user.name, "alice");
/// assert_eq!(options.challenge.len(), 32);
///
/// // Nobody has registered yet
/// let err = engine.start_authentication(Some("alice")).unwrap_err();
/// assert!(matches!(err, AuthError::UserNotFound));
/// ```
pub struct CeremonyEngine<S = MemoryCredentialStore> {
    config: CeremonyConfig,
    challenges: ChallengeStore,
    credentials: S,
}

impl CeremonyEngine<MemoryCredentialStore> {
    /// Engine backed by the non-durable in-memory credential store
    pub fn in_memory(config: CeremonyConfig) -> Result<Self> {
        tracing::warn!("credentials are kept in memory and will not survive a restart");
        Self::new(config, MemoryCredentialStore::new())
    }
}

impl<S: CredentialStore> CeremonyEngine<S> {
    pub fn new(config: CeremonyConfig, credentials: S) -> Result<Self> {
        config.validate()?;
        let secs = i64::try_from(config.challenge_timeout_secs)
            .map_err(|e| AuthError::InvalidConfig(format!("challenge timeout: {e}")))?;
        tracing::debug!(
            rp_id = %config.relying_party.id,
            timeout_secs = secs,
            policy = ?config.credential_policy,
            "ceremony engine configured"
        );
        Ok(Self {
            challenges: ChallengeStore::new(Duration::seconds(secs)),
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &CeremonyConfig {
        &self.config
    }

    pub fn credentials(&self) -> &S {
        &self.credentials
    }

    /// Begin registering a credential for `identity`
    ///
    /// Issues a fresh registration challenge, superseding any earlier one for
    /// the same identity.
    ///
    /// # Errors
    /// - `IdentityExists` - the identity already owns a credential under `SinglePerIdentity`
    pub fn start_registration(&self, identity: &str) -> Result<CreationOptions> {
        self.registration_options(identity)
            .inspect_err(|e| log_rejection(CeremonyPhase::RegistrationStart, e))
    }

    /// Complete a registration started with [`start_registration`](Self::start_registration)
    ///
    /// The challenge is consumed before the credential is examined, so a
    /// rejected credential still ends the ceremony.
    ///
    /// # Errors
    /// - `NoChallenge`, `Expired`, `ChallengeMismatch` - challenge not live or not matching
    /// - `RegistrationRejected` - the credential failed structural validation
    /// - `IdentityExists`, `CredentialIdCollision` - the credential store refused it
    pub fn finish_registration(
        &self,
        identity: &str,
        credential: RegistrationCredential,
    ) -> Result<RegistrationOutcome> {
        self.register(identity, credential)
            .inspect_err(|e| log_rejection(CeremonyPhase::RegistrationFinish, e))
    }

    /// Begin an authentication
    ///
    /// With an identity, the challenge is bound to it and the client is told
    /// which credentials are acceptable. Without one (discoverable flow) a
    /// per-attempt session id is returned; it must be passed back through
    /// [`AuthenticationTarget::Discoverable`].
    ///
    /// # Errors
    /// - `UserNotFound` - the identity has no registered credential
    pub fn start_authentication(&self, identity: Option<&str>) -> Result<AuthenticationStart> {
        self.request_options(identity)
            .inspect_err(|e| log_rejection(CeremonyPhase::AuthenticationStart, e))
    }

    /// Complete an authentication and return who signed in
    ///
    /// The challenge is consumed first; identity resolution, signature
    /// verification and the sign counter update follow. Any failure ends the
    /// ceremony.
    ///
    /// # Errors
    /// - `NoChallenge`, `Expired`, `ChallengeMismatch` - challenge not live or not matching
    /// - `UserNotFound` - the credential does not belong to the resolved identity
    /// - `OriginMismatch`, `UserVerificationFailed`, `SignatureInvalid` - verification failed
    /// - `CounterRollback` - possible cloned authenticator
    ///
    /// Use [`AuthError::for_caller`] before reporting any of these to a client.
    pub fn finish_authentication(
        &self,
        target: &AuthenticationTarget,
        assertion: AssertionCredential,
    ) -> Result<AuthenticationOutcome> {
        self.authenticate(target, assertion)
            .inspect_err(|e| log_rejection(CeremonyPhase::AuthenticationFinish, e))
    }

    /// Where the ceremony for `identity` stands in `context`
    pub fn ceremony_state(&self, identity: &str, context: ChallengeContext) -> Result<CeremonyState> {
        let identity = Identity::new(identity)?;
        Ok(self
            .challenges
            .state(&ChallengeSubject::Identity(identity), context))
    }

    /// Drop expired challenges now instead of waiting for the next sweep
    pub fn purge_expired_challenges(&self) -> usize {
        let purged = self.challenges.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "purged expired challenges");
        }
        purged
    }

    /// Challenges currently held, including expired ones not yet swept
    pub fn pending_challenges(&self) -> usize {
        self.challenges.pending()
    }

    fn registration_options(&self, identity: &str) -> Result<CreationOptions> {
        let identity = Identity::new(identity)?;
        let existing = self
            .credentials
            .find_by_identity(&identity)?
            .unwrap_or_default();

        let exclude_credentials = match self.config.credential_policy {
            CredentialPolicy::SinglePerIdentity if !existing.is_empty() => {
                return Err(AuthError::IdentityExists);
            }
            CredentialPolicy::SinglePerIdentity => Vec::new(),
            CredentialPolicy::MultiplePerIdentity => {
                existing.iter().map(CredentialRecord::descriptor).collect()
            }
        };

        let challenge = self.challenges.issue(
            ChallengeSubject::Identity(identity.clone()),
            ChallengeContext::Registration,
        );
        tracing::debug!(%identity, "registration challenge issued");

        Ok(CreationOptions {
            challenge,
            rp: RpEntity {
                id: self.config.relying_party.id.clone(),
                name: self.config.relying_party.name.clone(),
            },
            user: UserEntity {
                id: identity.user_handle(),
                name: identity.to_string(),
                display_name: identity.to_string(),
            },
            pub_key_cred_params: self
                .config
                .algorithms
                .iter()
                .map(|&alg| CredentialParameters {
                    kind: "public-key".to_string(),
                    alg,
                })
                .collect(),
            timeout: self.config.timeout_ms(),
            attestation: "none".to_string(),
            authenticator_selection: AuthenticatorSelection {
                resident_key: "required".to_string(),
                require_resident_key: true,
                user_verification: self.config.user_verification,
            },
            exclude_credentials,
            extensions: CreationExtensions { cred_props: true },
        })
    }

    fn register(
        &self,
        identity: &str,
        credential: RegistrationCredential,
    ) -> Result<RegistrationOutcome> {
        let identity = Identity::new(identity)?;
        self.challenges.consume(
            &ChallengeSubject::Identity(identity.clone()),
            ChallengeContext::Registration,
            credential.client_challenge(),
        )?;
        tracing::debug!(%identity, "registration challenge consumed");

        let attested = Verifier::new(&self.config).verify_attestation_structure(&credential)?;
        let record = CredentialRecord {
            identity: identity.clone(),
            credential_id: credential.id.clone(),
            public_key: attested.public_key,
            sign_count: attested.sign_count,
            transports: credential.transports,
            registered_at: Utc::now(),
            last_used_at: None,
        };
        let algorithm = record.public_key.algorithm();
        self.credentials
            .register(record, self.config.credential_policy)?;

        tracing::info!(
            %identity,
            credential_id = %credential.id,
            ?algorithm,
            aaguid = %hex::encode(attested.aaguid),
            backup_eligible = attested.backup_eligible,
            "credential registered"
        );
        Ok(RegistrationOutcome {
            identity,
            credential_id: credential.id,
        })
    }

    fn request_options(&self, identity: Option<&str>) -> Result<AuthenticationStart> {
        let Some(identity) = identity else {
            let session_id = Uuid::new_v4();
            let challenge = self.challenges.issue(
                ChallengeSubject::Session(session_id),
                ChallengeContext::Authentication,
            );
            tracing::debug!(%session_id, "discoverable authentication challenge issued");
            return Ok(self.authentication_start(Some(session_id), challenge, Vec::new()));
        };

        let identity = Identity::new(identity)?;
        let records = self
            .credentials
            .find_by_identity(&identity)?
            .ok_or(AuthError::UserNotFound)?;
        let allowed = records.iter().map(|r| r.credential_id.clone()).collect();
        let challenge = self.challenges.issue_bound(
            ChallengeSubject::Identity(identity.clone()),
            ChallengeContext::Authentication,
            allowed,
        );
        tracing::debug!(%identity, "authentication challenge issued");
        let descriptors = records.iter().map(CredentialRecord::descriptor).collect();
        Ok(self.authentication_start(None, challenge, descriptors))
    }

    fn authentication_start(
        &self,
        session_id: Option<Uuid>,
        challenge: Challenge,
        allow_credentials: Vec<CredentialDescriptor>,
    ) -> AuthenticationStart {
        AuthenticationStart {
            session_id,
            public_key: RequestOptions {
                challenge,
                timeout: self.config.timeout_ms(),
                rp_id: self.config.relying_party.id.clone(),
                user_verification: self.config.user_verification,
                allow_credentials,
            },
        }
    }

    fn authenticate(
        &self,
        target: &AuthenticationTarget,
        assertion: AssertionCredential,
    ) -> Result<AuthenticationOutcome> {
        let subject = match target {
            AuthenticationTarget::Identity(identity) => ChallengeSubject::Identity(identity.clone()),
            AuthenticationTarget::Discoverable { session_id } => ChallengeSubject::Session(*session_id),
        };
        let session = self.challenges.consume(
            &subject,
            ChallengeContext::Authentication,
            assertion.client_challenge(),
        )?;
        tracing::debug!(credential_id = %assertion.credential_id, "authentication challenge consumed");

        let record = self.resolve_credential(target, &session, &assertion)?;
        let sign_count =
            Verifier::new(&self.config).verify_assertion(&record, &assertion, &session.challenge)?;

        if let Err(e) = self
            .credentials
            .update_sign_counter(&record.credential_id, sign_count)
        {
            if let AuthError::CounterRollback { stored, presented } = e {
                tracing::error!(
                    target: SECURITY_TARGET,
                    identity = %record.identity,
                    credential_id = %record.credential_id,
                    stored,
                    presented,
                    "sign counter rollback, possible cloned authenticator"
                );
            }
            return Err(e);
        }

        tracing::info!(
            identity = %record.identity,
            credential_id = %record.credential_id,
            sign_count,
            "authentication succeeded"
        );
        Ok(AuthenticationOutcome {
            identity: record.identity,
            credential_id: record.credential_id,
            registered_at: record.registered_at,
            sign_count,
        })
    }

    /// Find the asserted credential and check it belongs to the attempt's identity
    fn resolve_credential(
        &self,
        target: &AuthenticationTarget,
        session: &CeremonySession,
        assertion: &AssertionCredential,
    ) -> Result<CredentialRecord> {
        let record = self
            .credentials
            .find_by_credential_id(&assertion.credential_id)?
            .ok_or(AuthError::UserNotFound)?;

        match target {
            AuthenticationTarget::Identity(identity) => {
                if record.identity != *identity
                    || !session.allowed_credentials.contains(&record.credential_id)
                {
                    return Err(AuthError::UserNotFound);
                }
                if let Some(handle) = &assertion.user_handle {
                    if *handle != identity.user_handle() {
                        return Err(AuthError::UserNotFound);
                    }
                }
            }
            AuthenticationTarget::Discoverable { .. } => {
                let handle = assertion
                    .user_handle
                    .as_deref()
                    .ok_or(AuthError::UserNotFound)?;
                let claimed =
                    Identity::from_user_handle(handle).map_err(|_| AuthError::UserNotFound)?;
                if record.identity != claimed {
                    return Err(AuthError::UserNotFound);
                }
            }
        }
        Ok(record)
    }
}

fn log_rejection(phase: CeremonyPhase, err: &AuthError) {
    match err {
        // Logged with full context on the security target where it happens.
        AuthError::CounterRollback { .. } => {}
        AuthError::Internal(_) | AuthError::InvalidConfig(_) => {
            tracing::error!(?phase, error = %err, "ceremony failed");
        }
        _ if err.is_security_relevant() => tracing::warn!(
            target: SECURITY_TARGET,
            ?phase,
            kind = ?err.kind(),
            error = %err,
            "ceremony rejected"
        ),
        _ => tracing::warn!(?phase, kind = ?err.kind(), error = %err, "ceremony rejected"),
    }
}

impl<S> std::fmt::Debug for CeremonyEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyEngine")
            .field("config", &self.config)
            .field("challenges", &self.challenges)
            .finish_non_exhaustive()
    }
}
