// demos/ceremony_walkthrough.rs

use passkey_ceremony::crypto::soft::SoftAuthenticator;
use passkey_ceremony::{
    AssertionCredential, AuthenticationTarget, CeremonyConfig, CeremonyEngine, CeremonyPhase,
    CoseAlgorithm, Identity, RegistrationCredential,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Passkey Ceremony Walkthrough");

    // 1. Setup the ceremony engine (PASSKEY_* variables override the defaults)
    let config = CeremonyConfig::from_env()?;
    let origin = config.origins[0].clone();
    let engine = CeremonyEngine::in_memory(config)?;
    let mut authenticator = SoftAuthenticator::new(&engine.config().relying_party.id, origin);

    // 2. Registration: the options go to navigator.credentials.create()
    println!("\nRegistering alice...");
    let options = engine.start_registration("alice")?;
    println!("Creation options: {}", serde_json::to_string_pretty(&options)?);

    let created = authenticator.create(&options, CoseAlgorithm::Es256)?;
    let posted = serde_json::to_string(&created)?;
    let credential = RegistrationCredential::from_json(&posted)?;
    let registered = engine.finish_registration("alice", credential)?;
    println!("Registered credential {} for {}", registered.credential_id, registered.identity);

    // 3. Authentication with a username
    println!("\nSigning in as alice...");
    let start = engine.start_authentication(Some("alice"))?;
    let signed = authenticator.get(&start.public_key)?;
    let assertion = AssertionCredential::from_json(&serde_json::to_string(&signed)?)?;
    let target = AuthenticationTarget::Identity(Identity::new("alice")?);
    let outcome = engine.finish_authentication(&target, assertion.clone())?;
    println!("Authentication successful!");
    println!("   Identity: {}", outcome.identity);
    println!("   Credential: {}", outcome.credential_id);
    println!("   Registered at: {}", outcome.registered_at);
    println!("   Sign count: {}", outcome.sign_count);

    // 4. Replaying the same assertion fails: its challenge is gone
    println!("\nReplaying the assertion...");
    match engine.finish_authentication(&target, assertion) {
        Ok(_) => println!("Replay accepted (this should never happen)"),
        Err(e) => {
            let shown = e.for_caller(CeremonyPhase::AuthenticationFinish);
            println!("Replay rejected: {e}");
            println!("   Caller sees: {}", serde_json::to_string(&shown)?);
        }
    }

    // 5. Discoverable sign-in: no username, the authenticator picks the credential
    println!("\nSigning in without a username...");
    let start = engine.start_authentication(None)?;
    let target = start
        .discoverable_target()
        .ok_or("discoverable start without a session id")?;
    let signed = authenticator.get(&start.public_key)?;
    let outcome = engine.finish_authentication(&target, AssertionCredential::try_from(signed)?)?;
    println!("Signed in as {} (sign count {})", outcome.identity, outcome.sign_count);

    // 6. Unknown users are indistinguishable from failed signatures
    println!("\nSigning in as bob...");
    if let Err(e) = engine.start_authentication(Some("bob")) {
        let shown = e.for_caller(CeremonyPhase::AuthenticationStart);
        println!("Internal: {e}");
        println!("   Caller sees: {}", serde_json::to_string(&shown)?);
    }

    Ok(())
}
