pub mod challenge;
pub mod cose;
pub mod ecdsa;
pub mod rs256;
#[cfg(feature = "soft-authenticator")]
pub mod soft;

// Re-export main types for easier access
pub use challenge::generate_challenge;
pub use cose::PublicKeyMaterial;
