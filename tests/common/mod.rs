#![allow(dead_code)]

use passkey_ceremony::crypto::soft::SoftAuthenticator;
use passkey_ceremony::{
    AssertionCredential, AuthenticationOutcome, AuthenticationTarget, CeremonyConfig,
    CeremonyEngine, CoseAlgorithm, Identity, RegistrationCredential, RegistrationOutcome, Result,
};

pub const RP_ID: &str = "localhost";
pub const ORIGIN: &str = "http://localhost:5173";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn engine() -> CeremonyEngine {
    engine_with(CeremonyConfig::default())
}

pub fn engine_with(config: CeremonyConfig) -> CeremonyEngine {
    init_tracing();
    CeremonyEngine::in_memory(config).unwrap()
}

pub fn authenticator() -> SoftAuthenticator {
    SoftAuthenticator::new(RP_ID, ORIGIN)
}

pub fn target(identity: &str) -> AuthenticationTarget {
    AuthenticationTarget::Identity(Identity::new(identity).unwrap())
}

/// Start a registration and create the credential without finishing the ceremony
pub fn registration_credential(
    engine: &CeremonyEngine,
    authenticator: &mut SoftAuthenticator,
    identity: &str,
    alg: CoseAlgorithm,
) -> Result<RegistrationCredential> {
    let options = engine.start_registration(identity)?;
    let created = authenticator.create(&options, alg)?;
    let json = serde_json::to_string(&created).unwrap();
    RegistrationCredential::from_json(&json)
}

/// Run a full registration ceremony, going through the JSON wire format
pub fn register(
    engine: &CeremonyEngine,
    authenticator: &mut SoftAuthenticator,
    identity: &str,
    alg: CoseAlgorithm,
) -> Result<RegistrationOutcome> {
    let credential = registration_credential(engine, authenticator, identity, alg)?;
    engine.finish_registration(identity, credential)
}

/// Produce an identity-scoped assertion without finishing the ceremony
pub fn sign_in_assertion(
    engine: &CeremonyEngine,
    authenticator: &mut SoftAuthenticator,
    identity: &str,
) -> Result<AssertionCredential> {
    let start = engine.start_authentication(Some(identity))?;
    let signed = authenticator.get(&start.public_key)?;
    let json = serde_json::to_string(&signed).unwrap();
    AssertionCredential::from_json(&json)
}

/// Run a full identity-scoped authentication ceremony
pub fn sign_in(
    engine: &CeremonyEngine,
    authenticator: &mut SoftAuthenticator,
    identity: &str,
) -> Result<AuthenticationOutcome> {
    let assertion = sign_in_assertion(engine, authenticator, identity)?;
    engine.finish_authentication(&target(identity), assertion)
}
