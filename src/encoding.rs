//! Unpadded URL-safe base64, the only encoding used for bytes on the wire.
//!
//! Challenges, user handles, credential ids, client data and signatures all
//! go through these helpers, so registration and login can never disagree
//! about how a value was encoded.

use crate::error::{AuthError, Result};
use base64::prelude::*;

/// Encode bytes as unpadded URL-safe base64
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded URL-safe base64
///
/// Padded or standard-alphabet input is rejected.
///
/// # Example
/// ```rust
/// use passkey_ceremony::encoding;
///
/// let bytes = encoding::decode("YWxpY2U", "user handle").unwrap();
/// assert_eq!(bytes, b"alice");
/// assert!(encoding::decode("YWxpY2U=", "user handle").is_err());
/// ```
pub fn decode(value: &str, field: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| AuthError::MalformedPayload(format!("{field} is not base64url: {e}")))
}

/// Serde adapter for `Vec<u8>` fields carried as base64url strings
pub mod base64url {
    use base64::prelude::*;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64_URL_SAFE_NO_PAD.decode(s).map_err(D::Error::custom)
    }
}
