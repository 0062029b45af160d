use crate::types::Challenge;
use rand::RngCore;

/// Number of random bytes in every issued challenge
pub const CHALLENGE_LEN: usize = 32;

/// Generate a cryptographically secure random challenge
///
/// Returns 32 random bytes from the thread-local CSPRNG.
///
/// # Example
/// ```rust
/// use passkey_ceremony::crypto::challenge::generate_challenge;
///
/// let challenge = generate_challenge();
/// assert_eq!(challenge.len(), 32);
/// ```
pub fn generate_challenge() -> Challenge {
    let mut bytes = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    Challenge::from_bytes(bytes.to_vec())
}
