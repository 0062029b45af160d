use crate::error::{AuthError, Result};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sha2::Sha256;

/// Smallest RSA modulus accepted at registration
pub const MIN_MODULUS_BITS: usize = 2048;

/// Build an RSA public key from big-endian modulus and exponent bytes
///
/// # Errors
/// - `RegistrationRejected` - the key is invalid or its modulus is shorter than 2048 bits
pub fn rsa_public_key(modulus: &[u8], exponent: &[u8]) -> Result<RsaPublicKey> {
    build_key(modulus, exponent).map_err(AuthError::RegistrationRejected)
}

/// Verify an RS256 (RSASSA-PKCS1-v1_5, SHA-256) signature
///
/// # Arguments
/// * `modulus` - Big-endian RSA modulus `n`
/// * `exponent` - Big-endian public exponent `e`
/// * `message` - Raw bytes that were signed
/// * `signature` - Signature bytes, as long as the modulus
///
/// # Returns
/// * `Ok(())` if signature is valid
/// * `Err(AuthError::SignatureInvalid)` if the signature is malformed or does not verify
pub fn verify_rs256(modulus: &[u8], exponent: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let public_key = build_key(modulus, exponent)
        .map_err(|e| AuthError::Internal(format!("stored RSA key unusable: {e}")))?;
    let signature = Signature::try_from(signature).map_err(|_| AuthError::SignatureInvalid)?;

    VerifyingKey::<Sha256>::new(public_key)
        .verify(message, &signature)
        .map_err(|_| AuthError::SignatureInvalid)
}

fn build_key(modulus: &[u8], exponent: &[u8]) -> std::result::Result<RsaPublicKey, String> {
    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from_bytes_be(exponent),
    )
    .map_err(|e| format!("RSA key is invalid: {e}"))?;
    if key.size() * 8 < MIN_MODULUS_BITS {
        return Err(format!("RSA modulus is {} bits", key.size() * 8));
    }
    Ok(key)
}
