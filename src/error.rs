use serde::Serialize;
use thiserror::Error;

/// Ceremony, store and verification errors
///
/// Every variant is a recoverable, caller-facing failure. The stable
/// [`ErrorKind`] of an error is available through [`AuthError::kind`], and the
/// projection that is safe to hand to an untrusted caller through
/// [`AuthError::for_caller`].
///
/// # Example
/// ```rust
/// use passkey_ceremony::{AuthError, ErrorKind, Result};
///
/// fn handle(result: Result<()>) {
///     match result {
///         Ok(()) => println!("ceremony complete"),
///         Err(AuthError::Expired) => println!("challenge expired, start again"),
///         Err(e) if e.kind() == ErrorKind::InternalError => println!("internal error"),
///         Err(e) => println!("rejected: {e}"),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum AuthError {
    /// No live challenge exists for the identity and ceremony context
    ///
    /// This error occurs when:
    /// - The ceremony was never started
    /// - The challenge was already consumed by an earlier finish call
    /// - An expired challenge was already reaped
    #[error("No active challenge for this ceremony")]
    NoChallenge,

    /// The challenge existed but its timeout elapsed before it was consumed
    #[error("Challenge has expired")]
    Expired,

    /// The presented challenge does not equal the issued one
    ///
    /// This error occurs when:
    /// - The client echoed a different or superseded challenge
    /// - The challenge embedded in signed client data differs from the consumed one
    #[error("Challenge does not match the issued challenge")]
    ChallengeMismatch,

    /// The identity already owns a credential and the policy forbids another
    #[error("Identity already has a registered credential")]
    IdentityExists,

    /// No usable credential is registered for the identity
    #[error("No credential registered for this identity")]
    UserNotFound,

    /// The credential id is already bound to a different identity
    #[error("Credential id is already registered")]
    CredentialIdCollision,

    /// The submitted credential failed structural validation
    ///
    /// This error occurs when:
    /// - The attestation object is not well-formed CBOR
    /// - The attestation format is not `none`
    /// - The relying-party hash, origin or flags are wrong
    /// - The public key uses an unsupported algorithm
    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    /// The assertion signature does not verify against the stored public key
    #[error("Assertion signature is invalid")]
    SignatureInvalid,

    /// The origin or relying-party binding in the signed payload is not the configured one
    #[error("Origin or relying party mismatch")]
    OriginMismatch,

    /// The authenticator did not report the user presence or verification required
    #[error("User presence or verification not asserted")]
    UserVerificationFailed,

    /// The reported sign counter did not advance past the stored value
    ///
    /// Indicates a possibly cloned authenticator.
    #[error("Sign counter rollback: stored {stored}, presented {presented}")]
    CounterRollback { stored: u32, presented: u32 },

    /// A payload failed ingress validation
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The ceremony configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected failure, e.g. a credential backend being unavailable
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, machine-readable error kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoChallenge,
    Expired,
    ChallengeMismatch,
    IdentityExists,
    UserNotFound,
    CredentialIdCollision,
    RegistrationRejected,
    SignatureInvalid,
    OriginMismatch,
    UserVerificationFailed,
    CounterRollback,
    /// Caller-facing only: every authentication failure is reported as this kind.
    AuthenticationFailed,
    InternalError,
}

/// Which ceremony call produced an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CeremonyPhase {
    RegistrationStart,
    RegistrationFinish,
    AuthenticationStart,
    AuthenticationFinish,
}

impl CeremonyPhase {
    pub fn is_authentication(self) -> bool {
        matches!(
            self,
            CeremonyPhase::AuthenticationStart | CeremonyPhase::AuthenticationFinish
        )
    }
}

/// Error shape handed to the transport collaborator
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::NoChallenge => ErrorKind::NoChallenge,
            AuthError::Expired => ErrorKind::Expired,
            AuthError::ChallengeMismatch => ErrorKind::ChallengeMismatch,
            AuthError::IdentityExists => ErrorKind::IdentityExists,
            AuthError::UserNotFound => ErrorKind::UserNotFound,
            AuthError::CredentialIdCollision => ErrorKind::CredentialIdCollision,
            AuthError::RegistrationRejected(_) => ErrorKind::RegistrationRejected,
            AuthError::SignatureInvalid => ErrorKind::SignatureInvalid,
            AuthError::OriginMismatch => ErrorKind::OriginMismatch,
            AuthError::UserVerificationFailed => ErrorKind::UserVerificationFailed,
            AuthError::CounterRollback { .. } => ErrorKind::CounterRollback,
            AuthError::MalformedPayload(_)
            | AuthError::InvalidConfig(_)
            | AuthError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether this error should be treated as a security event
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            AuthError::CounterRollback { .. }
                | AuthError::SignatureInvalid
                | AuthError::OriginMismatch
        )
    }

    /// Project this error into the shape shown to the caller
    ///
    /// Internal failures never carry detail. During authentication every
    /// other failure collapses into `AuthenticationFailed`, so an unknown
    /// identity is indistinguishable from a bad signature.
    ///
    /// # Example
    /// ```rust
    /// use passkey_ceremony::{AuthError, CeremonyPhase, ErrorKind};
    ///
    /// let unknown = AuthError::UserNotFound.for_caller(CeremonyPhase::AuthenticationStart);
    /// let forged = AuthError::SignatureInvalid.for_caller(CeremonyPhase::AuthenticationFinish);
    /// assert_eq!(unknown, forged);
    /// assert_eq!(unknown.kind, ErrorKind::AuthenticationFailed);
    /// ```
    pub fn for_caller(&self, phase: CeremonyPhase) -> CallerError {
        let kind = self.kind();
        if kind == ErrorKind::InternalError {
            return CallerError {
                kind,
                message: "internal error".to_string(),
            };
        }
        if phase.is_authentication() {
            return CallerError {
                kind: ErrorKind::AuthenticationFailed,
                message: "authentication failed".to_string(),
            };
        }
        CallerError {
            kind,
            message: self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = AuthError::Internal("backend at 10.0.0.3 refused connection".to_string());
        let caller = err.for_caller(CeremonyPhase::RegistrationFinish);
        assert_eq!(caller.kind, ErrorKind::InternalError);
        assert_eq!(caller.message, "internal error");

        let err = AuthError::MalformedPayload("missing field `rawId`".to_string());
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert!(!err
            .for_caller(CeremonyPhase::AuthenticationFinish)
            .message
            .contains("rawId"));
    }

    #[test]
    fn test_authentication_errors_are_uniform() {
        let phase = CeremonyPhase::AuthenticationFinish;
        let errors = [
            AuthError::UserNotFound,
            AuthError::SignatureInvalid,
            AuthError::ChallengeMismatch,
            AuthError::OriginMismatch,
            AuthError::NoChallenge,
            AuthError::CounterRollback {
                stored: 9,
                presented: 3,
            },
        ];
        let expected = AuthError::UserNotFound.for_caller(phase);
        for err in errors {
            assert_eq!(err.for_caller(phase), expected, "{err:?}");
        }
    }

    #[test]
    fn test_registration_errors_keep_kind() {
        let caller = AuthError::IdentityExists.for_caller(CeremonyPhase::RegistrationStart);
        assert_eq!(caller.kind, ErrorKind::IdentityExists);

        let caller = AuthError::RegistrationRejected("unsupported algorithm -37".to_string())
            .for_caller(CeremonyPhase::RegistrationFinish);
        assert_eq!(caller.kind, ErrorKind::RegistrationRejected);
        assert!(caller.message.contains("-37"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CounterRollback).unwrap();
        assert_eq!(json, "\"counter_rollback\"");
    }

    #[test]
    fn test_counter_rollback_is_security_relevant() {
        let err = AuthError::CounterRollback {
            stored: 4,
            presented: 4,
        };
        assert!(err.is_security_relevant());
        assert!(!AuthError::Expired.is_security_relevant());
    }
}
