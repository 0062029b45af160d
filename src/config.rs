use crate::error::{AuthError, Result};
use crate::types::CoseAlgorithm;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default challenge lifetime in seconds
pub const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 60;

/// Longest challenge lifetime accepted, one day
pub const MAX_CHALLENGE_TIMEOUT_SECS: u64 = 86_400;

/// Relying party identity presented to authenticators
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RelyingParty {
    /// RP ID, the registrable domain credentials are scoped to (e.g. `example.com`)
    pub id: String,
    /// Human-readable name shown in the authenticator prompt
    pub name: String,
}

impl Default for RelyingParty {
    fn default() -> Self {
        Self {
            id: "localhost".to_string(),
            name: "WebAuthn Demo".to_string(),
        }
    }
}

/// How many credentials a single identity may own
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPolicy {
    /// One credential per identity; registering again fails with `IdentityExists`.
    #[default]
    SinglePerIdentity,
    /// Credentials accumulate; existing ones are excluded at registration-start.
    MultiplePerIdentity,
}

/// Authenticator user verification requirement
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserVerification {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl UserVerification {
    pub fn is_required(self) -> bool {
        self == UserVerification::Required
    }
}

/// Configuration for registration and authentication ceremonies
///
/// All fields have defaults matching a local development deployment, so a
/// partial JSON/TOML document is enough to override just what differs.
///
/// # Security Note
/// Attestation is always requested as `none`: registered keys are
/// self-asserted and no statement is made about the authenticator device.
///
/// # Example
/// ```rust
/// use passkey_ceremony::{CeremonyConfig, CredentialPolicy};
///
/// let config: CeremonyConfig = serde_json::from_str(r#"{
///     "relying_party": { "id": "example.com", "name": "Example" },
///     "origins": ["https://example.com"],
///     "credential_policy": "multiple_per_identity"
/// }"#).unwrap();
/// assert_eq!(config.challenge_timeout_secs, 60);
/// assert_eq!(config.credential_policy, CredentialPolicy::MultiplePerIdentity);
/// config.validate().unwrap();
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CeremonyConfig {
    pub relying_party: RelyingParty,
    /// Origins allowed to appear in collected client data, e.g. `https://example.com`
    pub origins: Vec<String>,
    /// Challenge lifetime in seconds
    ///
    /// Also sent to the client as the ceremony timeout. 60 to 120 seconds is
    /// the usual range.
    pub challenge_timeout_secs: u64,
    pub user_verification: UserVerification,
    pub credential_policy: CredentialPolicy,
    /// Algorithms offered at registration, in preference order
    pub algorithms: Vec<CoseAlgorithm>,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            relying_party: RelyingParty::default(),
            origins: vec!["http://localhost:5173".to_string()],
            challenge_timeout_secs: DEFAULT_CHALLENGE_TIMEOUT_SECS,
            user_verification: UserVerification::default(),
            credential_policy: CredentialPolicy::default(),
            algorithms: vec![
                CoseAlgorithm::Es256,
                CoseAlgorithm::EdDsa,
                CoseAlgorithm::Es256k,
                CoseAlgorithm::Rs256,
            ],
        }
    }
}

impl CeremonyConfig {
    /// Build a configuration from environment variables
    ///
    /// Environment variables:
    /// - `PASSKEY_RP_ID` - Relying Party ID (default: "localhost")
    /// - `PASSKEY_RP_NAME` - RP display name (default: "WebAuthn Demo")
    /// - `PASSKEY_RP_ORIGINS` - comma separated origins (default: "http://localhost:5173")
    /// - `PASSKEY_CHALLENGE_TIMEOUT_SECS` - challenge lifetime (default: 60)
    /// - `PASSKEY_USER_VERIFICATION` - required, preferred or discouraged
    /// - `PASSKEY_CREDENTIAL_POLICY` - single_per_identity or multiple_per_identity
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("PASSKEY_RP_ID") {
            config.relying_party.id = id;
        }
        if let Ok(name) = std::env::var("PASSKEY_RP_NAME") {
            config.relying_party.name = name;
        }
        if let Ok(origins) = std::env::var("PASSKEY_RP_ORIGINS") {
            config.origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(secs) = std::env::var("PASSKEY_CHALLENGE_TIMEOUT_SECS") {
            config.challenge_timeout_secs = secs.parse().map_err(|e| {
                AuthError::InvalidConfig(format!("PASSKEY_CHALLENGE_TIMEOUT_SECS: {e}"))
            })?;
        }
        if let Ok(uv) = std::env::var("PASSKEY_USER_VERIFICATION") {
            config.user_verification = parse_keyword(&uv, "PASSKEY_USER_VERIFICATION")?;
        }
        if let Ok(policy) = std::env::var("PASSKEY_CREDENTIAL_POLICY") {
            config.credential_policy = parse_keyword(&policy, "PASSKEY_CREDENTIAL_POLICY")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.relying_party.id.trim().is_empty() {
            return Err(AuthError::InvalidConfig("relying party id is empty".to_string()));
        }
        if self.origins.is_empty() {
            return Err(AuthError::InvalidConfig("no allowed origins".to_string()));
        }
        for origin in &self.origins {
            let url = Url::parse(origin)
                .map_err(|e| AuthError::InvalidConfig(format!("origin {origin:?}: {e}")))?;
            if !url.has_host() {
                return Err(AuthError::InvalidConfig(format!("origin {origin:?} has no host")));
            }
        }
        if self.challenge_timeout_secs > MAX_CHALLENGE_TIMEOUT_SECS {
            return Err(AuthError::InvalidConfig(format!(
                "challenge timeout exceeds {MAX_CHALLENGE_TIMEOUT_SECS} seconds"
            )));
        }
        if self.algorithms.is_empty() {
            return Err(AuthError::InvalidConfig("no algorithms offered".to_string()));
        }
        Ok(())
    }

    /// Ceremony timeout in milliseconds, as sent to clients
    pub fn timeout_ms(&self) -> u64 {
        self.challenge_timeout_secs.saturating_mul(1000)
    }

    /// Whether `origin` (as reported in client data) is allowed
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        let Some(presented) = serialized_origin(origin) else {
            return false;
        };
        self.origins
            .iter()
            .filter_map(|o| serialized_origin(o))
            .any(|allowed| allowed == presented)
    }
}

fn serialized_origin(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

fn parse_keyword<T: serde::de::DeserializeOwned>(value: &str, var: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|e| AuthError::InvalidConfig(format!("{var}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CeremonyConfig::default();
        config.validate().unwrap();
        assert_eq!(config.relying_party.id, "localhost");
        assert_eq!(config.timeout_ms(), 60_000);
        assert_eq!(config.credential_policy, CredentialPolicy::SinglePerIdentity);
    }

    #[test]
    fn test_origin_matching_normalizes() {
        let config = CeremonyConfig {
            origins: vec!["https://Example.com:443/".to_string()],
            ..CeremonyConfig::default()
        };
        assert!(config.is_allowed_origin("https://example.com"));
        assert!(!config.is_allowed_origin("https://evil.example.com"));
        assert!(!config.is_allowed_origin("http://example.com"));
        assert!(!config.is_allowed_origin("not a url"));
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let config = CeremonyConfig {
            origins: vec!["localhost:5173".to_string()],
            ..CeremonyConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let config = CeremonyConfig {
            origins: vec![],
            ..CeremonyConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_empty_rp_id() {
        let mut config = CeremonyConfig::default();
        config.relying_party.id = "  ".to_string();
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_huge_timeout() {
        let config = CeremonyConfig {
            challenge_timeout_secs: MAX_CHALLENGE_TIMEOUT_SECS + 1,
            ..CeremonyConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_keyword() {
        let uv: UserVerification = parse_keyword("Required", "X").unwrap();
        assert_eq!(uv, UserVerification::Required);
        let policy: Result<CredentialPolicy> = parse_keyword("sometimes", "X");
        assert!(matches!(policy, Err(AuthError::InvalidConfig(msg)) if msg.starts_with("X")));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CeremonyConfig =
            serde_json::from_str(r#"{"challenge_timeout_secs": 120, "algorithms": [-7]}"#).unwrap();
        assert_eq!(config.challenge_timeout_secs, 120);
        assert_eq!(config.algorithms, vec![CoseAlgorithm::Es256]);
        assert_eq!(config.relying_party, RelyingParty::default());
    }
}
