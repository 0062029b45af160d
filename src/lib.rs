//! # passkey-ceremony
//!
//! A Rust library for **passkey (WebAuthn) registration and authentication ceremonies**.
//! Provides the server side of public-key challenge/response: clients register a
//! public key bound to an identity, then prove possession of the private key by
//! signing a single-use, server-issued challenge.
//!
//! ## Features
//!
//! - **Four-phase ceremony engine** - registration-start/finish and authentication-start/finish
//! - **Single-use challenges** - 32 random bytes, superseded on re-issue, expired after a timeout
//! - **Real signature verification** - ES256 (P-256), ES256K (secp256k1), EdDSA (Ed25519) and RS256
//! - **Discoverable credentials** - username-less sign-in via the authenticator's user handle
//! - **Clone detection** - sign counter rollbacks fail the ceremony and are logged as security events
//! - **Pluggable credential storage** - implement [`CredentialStore`] for your database
//! - **Enumeration-safe errors** - [`AuthError::for_caller`] makes unknown users look like bad signatures
//!
//! ## Quick Start
//!
//! ```rust
//! use passkey_ceremony::crypto::soft::SoftAuthenticator;
//! use passkey_ceremony::{
//!     AssertionCredential, AuthenticationTarget, CeremonyConfig, CeremonyEngine, CoseAlgorithm,
//!     Identity, RegistrationCredential,
//! };
//!
//! let engine = CeremonyEngine::in_memory(CeremonyConfig::default()).unwrap();
//! // Stands in for the browser and the user's authenticator
//! let mut authenticator = SoftAuthenticator::new("localhost", "http://localhost:5173");
//!
//! // Registration
//! let options = engine.start_registration("alice").unwrap();
//! let created = authenticator.create(&options, CoseAlgorithm::Es256).unwrap();
//! let credential = RegistrationCredential::try_from(created).unwrap();
//! engine.finish_registration("alice", credential).unwrap();
//!
//! // Authentication
//! let start = engine.start_authentication(Some("alice")).unwrap();
//! let signed = authenticator.get(&start.public_key).unwrap();
//! let assertion = AssertionCredential::try_from(signed).unwrap();
//! let target = AuthenticationTarget::Identity(Identity::new("alice").unwrap());
//!
//! match engine.finish_authentication(&target, assertion) {
//!     Ok(outcome) => println!("signed in as {}", outcome.identity),
//!     Err(e) => println!("Authentication failed: {}", e),
//! }
//! ```
//!
//! In a real deployment the options are serialized to JSON for
//! `navigator.credentials.create()` / `.get()`, and the browser's response is
//! read back with [`RegistrationCredential::from_json`] and
//! [`AssertionCredential::from_json`].
//!
//! ## Examples
//!
//! See the [ceremony walkthrough](demos/ceremony_walkthrough.rs) for both flows,
//! including the discoverable one:
//!
//! ```bash
//! cargo run --example ceremony_walkthrough
//! ```

pub mod ceremony;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod store;
pub mod types;
pub mod verify;
pub mod webauthn;

// Re-export main types for easier access
pub use ceremony::{CeremonyEngine, SECURITY_TARGET};
pub use config::{CeremonyConfig, CredentialPolicy, RelyingParty, UserVerification};
pub use crypto::challenge::generate_challenge;
pub use crypto::cose::PublicKeyMaterial;
pub use error::{AuthError, CallerError, CeremonyPhase, ErrorKind, Result};
pub use store::{CeremonyState, CredentialStore, MemoryCredentialStore};
pub use types::{
    AuthenticationOutcome, AuthenticationStart, AuthenticationTarget, Challenge, ChallengeContext,
    CoseAlgorithm, CreationOptions, CredentialId, CredentialRecord, Identity, RegistrationOutcome,
    RequestOptions,
};
pub use webauthn::{AssertionCredential, RegistrationCredential};
