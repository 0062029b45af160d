//! WebAuthn data structures: collected client data, authenticator data,
//! attestation objects, and the credential payloads clients submit.

pub mod attestation;
pub mod authenticator_data;
pub mod client_data;
pub mod credential;

pub use attestation::AttestationObject;
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData};
pub use client_data::CollectedClientData;
pub use credential::{
    AssertionCredential, AssertionResponseJson, RegistrationCredential, RegistrationResponseJson,
};
