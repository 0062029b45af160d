use crate::error::{AuthError, Result};
use k256::ecdsa::signature::Verifier;

/// Verify an ES256 (P-256, SHA-256) signature
///
/// # Arguments
/// * `public_key_sec1` - SEC1-encoded public key
/// * `message` - Raw bytes that were signed
/// * `signature_der` - DER-encoded signature bytes
///
/// # Returns
/// * `Ok(())` if signature is valid
/// * `Err(AuthError::SignatureInvalid)` if the signature is malformed or does not verify
pub fn verify_es256(public_key_sec1: &[u8], message: &[u8], signature_der: &[u8]) -> Result<()> {
    let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key_sec1)
        .map_err(|e| AuthError::Internal(format!("stored P-256 key unusable: {e}")))?;
    let signature =
        p256::ecdsa::Signature::from_der(signature_der).map_err(|_| AuthError::SignatureInvalid)?;
    let signature = signature.normalize_s().unwrap_or(signature);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| AuthError::SignatureInvalid)
}

/// Verify an ES256K (secp256k1, SHA-256) signature
///
/// High-S signatures are normalized first, since `k256` only accepts low-S
/// and authenticators are not required to produce them.
pub fn verify_es256k(public_key_sec1: &[u8], message: &[u8], signature_der: &[u8]) -> Result<()> {
    let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key_sec1)
        .map_err(|e| AuthError::Internal(format!("stored secp256k1 key unusable: {e}")))?;
    let signature =
        k256::ecdsa::Signature::from_der(signature_der).map_err(|_| AuthError::SignatureInvalid)?;
    let signature = signature.normalize_s().unwrap_or(signature);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| AuthError::SignatureInvalid)
}
