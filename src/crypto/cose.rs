//! COSE_Key parsing into algorithm-tagged public key material.

use crate::crypto::ecdsa::{verify_es256, verify_es256k};
use crate::crypto::rs256::{rsa_public_key, verify_rs256};
use crate::encoding;
use crate::error::{AuthError, Result};
use crate::types::CoseAlgorithm;
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

const KTY: i64 = 1;
const ALG: i64 = 3;
const CRV: i64 = -1;
const X: i64 = -2;
const Y: i64 = -3;
const N: i64 = -1;
const E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;
const CRV_SECP256K1: i64 = 8;

/// A credential public key, tagged with the algorithm it verifies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "alg", rename_all = "snake_case")]
pub enum PublicKeyMaterial {
    /// Uncompressed SEC1 P-256 point
    Es256 {
        #[serde(with = "encoding::base64url")]
        sec1: Vec<u8>,
    },
    /// Uncompressed SEC1 secp256k1 point
    Es256k {
        #[serde(with = "encoding::base64url")]
        sec1: Vec<u8>,
    },
    /// 32-byte Ed25519 public key
    EdDsa {
        #[serde(with = "encoding::base64url")]
        x: Vec<u8>,
    },
    /// Big-endian RSA modulus and public exponent
    Rs256 {
        #[serde(with = "encoding::base64url")]
        n: Vec<u8>,
        #[serde(with = "encoding::base64url")]
        e: Vec<u8>,
    },
}

impl PublicKeyMaterial {
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            PublicKeyMaterial::Es256 { .. } => CoseAlgorithm::Es256,
            PublicKeyMaterial::Es256k { .. } => CoseAlgorithm::Es256k,
            PublicKeyMaterial::EdDsa { .. } => CoseAlgorithm::EdDsa,
            PublicKeyMaterial::Rs256 { .. } => CoseAlgorithm::Rs256,
        }
    }

    /// Parse and validate a CBOR-encoded COSE_Key
    ///
    /// The key must name its algorithm and carry the key type that algorithm
    /// requires. Elliptic curve keys must name the matching curve and decode
    /// to a valid point; RSA keys need a modulus of at least 2048 bits.
    ///
    /// # Errors
    /// - `RegistrationRejected` - malformed CBOR, unsupported algorithm or curve, invalid key
    pub fn from_cose(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| rejected(format!("COSE key is not CBOR: {e}")))?;
        let Value::Map(entries) = value else {
            return Err(rejected("COSE key is not a map"));
        };

        let kty = int_field(&entries, KTY).ok_or_else(|| rejected("COSE key has no kty"))?;
        let alg = int_field(&entries, ALG).ok_or_else(|| rejected("COSE key has no alg"))?;
        let alg = CoseAlgorithm::try_from(alg)?;

        match (alg, kty) {
            (CoseAlgorithm::Es256, KTY_EC2) => {
                require_curve(&entries, alg, CRV_P256)?;
                let sec1 = ec2_point(&entries)?;
                p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| rejected("P-256 point is not on the curve"))?;
                Ok(PublicKeyMaterial::Es256 { sec1 })
            }
            (CoseAlgorithm::Es256k, KTY_EC2) => {
                require_curve(&entries, alg, CRV_SECP256K1)?;
                let sec1 = ec2_point(&entries)?;
                k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| rejected("secp256k1 point is not on the curve"))?;
                Ok(PublicKeyMaterial::Es256k { sec1 })
            }
            (CoseAlgorithm::EdDsa, KTY_OKP) => {
                require_curve(&entries, alg, CRV_ED25519)?;
                let x = coordinate(&entries, X)?;
                ed25519_dalek::VerifyingKey::from_bytes(&x)
                    .map_err(|_| rejected("Ed25519 key is not a valid point"))?;
                Ok(PublicKeyMaterial::EdDsa { x: x.to_vec() })
            }
            (CoseAlgorithm::Rs256, KTY_RSA) => {
                let n = bytes_field(&entries, N)?;
                let e = bytes_field(&entries, E)?;
                rsa_public_key(&n, &e)?;
                Ok(PublicKeyMaterial::Rs256 { n, e })
            }
            (alg, kty) => Err(rejected(format!(
                "algorithm {} does not match kty {kty}",
                alg.id()
            ))),
        }
    }

    /// Encode as a CBOR COSE_Key
    pub fn to_cose(&self) -> Result<Vec<u8>> {
        let int = |i: i64| Value::Integer(i.into());
        let mut entries = Vec::with_capacity(5);
        match self {
            PublicKeyMaterial::Es256 { sec1 } | PublicKeyMaterial::Es256k { sec1 } => {
                let crv = if matches!(self, PublicKeyMaterial::Es256 { .. }) {
                    CRV_P256
                } else {
                    CRV_SECP256K1
                };
                if sec1.len() != 65 {
                    return Err(AuthError::Internal("EC2 key is not an uncompressed point".to_string()));
                }
                entries.push((int(KTY), int(KTY_EC2)));
                entries.push((int(ALG), int(self.algorithm().id())));
                entries.push((int(CRV), int(crv)));
                entries.push((int(X), Value::Bytes(sec1[1..33].to_vec())));
                entries.push((int(Y), Value::Bytes(sec1[33..65].to_vec())));
            }
            PublicKeyMaterial::EdDsa { x } => {
                entries.push((int(KTY), int(KTY_OKP)));
                entries.push((int(ALG), int(self.algorithm().id())));
                entries.push((int(CRV), int(CRV_ED25519)));
                entries.push((int(X), Value::Bytes(x.clone())));
            }
            PublicKeyMaterial::Rs256 { n, e } => {
                entries.push((int(KTY), int(KTY_RSA)));
                entries.push((int(ALG), int(self.algorithm().id())));
                entries.push((int(N), Value::Bytes(n.clone())));
                entries.push((int(E), Value::Bytes(e.clone())));
            }
        }
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Map(entries), &mut buf)
            .map_err(|e| AuthError::Internal(format!("COSE key encoding failed: {e}")))?;
        Ok(buf)
    }

    /// Verify `signature` over `message` with this key
    ///
    /// ECDSA signatures are expected DER encoded, Ed25519 signatures as 64 raw
    /// bytes, RSA signatures as long as the modulus.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            PublicKeyMaterial::Es256 { sec1 } => verify_es256(sec1, message, signature),
            PublicKeyMaterial::Es256k { sec1 } => verify_es256k(sec1, message, signature),
            PublicKeyMaterial::EdDsa { x } => {
                let x: [u8; 32] = x
                    .as_slice()
                    .try_into()
                    .map_err(|_| AuthError::Internal("stored Ed25519 key is not 32 bytes".to_string()))?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&x)
                    .map_err(|e| AuthError::Internal(format!("stored Ed25519 key unusable: {e}")))?;
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| AuthError::SignatureInvalid)?;
                key.verify_strict(message, &signature)
                    .map_err(|_| AuthError::SignatureInvalid)
            }
            PublicKeyMaterial::Rs256 { n, e } => verify_rs256(n, e, message, signature),
        }
    }
}

fn rejected(reason: impl Into<String>) -> AuthError {
    AuthError::RegistrationRejected(reason.into())
}

fn field(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == i128::from(label) => Some(v),
        _ => None,
    })
}

fn int_field(entries: &[(Value, Value)], label: i64) -> Option<i64> {
    match field(entries, label)? {
        Value::Integer(i) => i64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

fn require_curve(entries: &[(Value, Value)], alg: CoseAlgorithm, expected: i64) -> Result<()> {
    match int_field(entries, CRV) {
        Some(crv) if crv == expected => Ok(()),
        Some(crv) => Err(rejected(format!(
            "algorithm {} does not match crv {crv}",
            alg.id()
        ))),
        None => Err(rejected("COSE key has no crv")),
    }
}

fn bytes_field(entries: &[(Value, Value)], label: i64) -> Result<Vec<u8>> {
    match field(entries, label) {
        Some(Value::Bytes(b)) if !b.is_empty() => Ok(b.clone()),
        _ => Err(rejected(format!("COSE key has no parameter {label}"))),
    }
}

fn coordinate(entries: &[(Value, Value)], label: i64) -> Result<[u8; 32]> {
    match field(entries, label) {
        Some(Value::Bytes(b)) => b
            .as_slice()
            .try_into()
            .map_err(|_| rejected(format!("COSE coordinate {label} is {} bytes", b.len()))),
        _ => Err(rejected(format!("COSE key has no coordinate {label}"))),
    }
}

fn ec2_point(entries: &[(Value, Value)]) -> Result<Vec<u8>> {
    let x = coordinate(entries, X)?;
    let y = coordinate(entries, Y)?;
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    Ok(sec1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn cose_map(entries: Vec<(i64, Value)>) -> Vec<u8> {
        let map = Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Integer(k.into()), v))
                .collect(),
        );
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_p256_key_roundtrip() {
        let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let material = PublicKeyMaterial::Es256 {
            sec1: point.as_bytes().to_vec(),
        };

        let parsed = PublicKeyMaterial::from_cose(&material.to_cose().unwrap()).unwrap();
        assert_eq!(parsed, material);
        assert_eq!(parsed.algorithm(), CoseAlgorithm::Es256);
    }

    #[test]
    fn test_rsa_key_parse_and_verify() {
        use rsa::pkcs1v15::SigningKey;
        use rsa::signature::{SignatureEncoding, Signer};
        use rsa::traits::PublicKeyParts;

        let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let bytes = cose_map(vec![
            (KTY, Value::Integer(KTY_RSA.into())),
            (ALG, Value::Integer((-257).into())),
            (N, Value::Bytes(private_key.n().to_bytes_be())),
            (E, Value::Bytes(private_key.e().to_bytes_be())),
        ]);
        let parsed = PublicKeyMaterial::from_cose(&bytes).unwrap();
        assert_eq!(parsed.algorithm(), CoseAlgorithm::Rs256);
        assert_eq!(PublicKeyMaterial::from_cose(&parsed.to_cose().unwrap()).unwrap(), parsed);

        let signature = SigningKey::<sha2::Sha256>::new(private_key).sign(b"signed payload");
        parsed.verify(b"signed payload", &signature.to_vec()).unwrap();
        assert!(matches!(
            parsed.verify(b"tampered payload", &signature.to_vec()),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_rsa_key_without_exponent_is_rejected() {
        let bytes = cose_map(vec![
            (KTY, Value::Integer(KTY_RSA.into())),
            (ALG, Value::Integer((-257).into())),
            (N, Value::Bytes(vec![0xAA; 256])),
        ]);
        let err = PublicKeyMaterial::from_cose(&bytes).unwrap_err();
        assert!(matches!(err, AuthError::RegistrationRejected(msg) if msg.contains("-2")));
    }

    #[test]
    fn test_rsa_algorithm_needs_rsa_key_type() {
        let bytes = cose_map(vec![
            (KTY, Value::Integer(KTY_EC2.into())),
            (ALG, Value::Integer((-257).into())),
            (CRV, Value::Integer(CRV_P256.into())),
            (X, Value::Bytes(vec![0x11; 32])),
            (Y, Value::Bytes(vec![0x22; 32])),
        ]);
        let err = PublicKeyMaterial::from_cose(&bytes).unwrap_err();
        assert!(matches!(err, AuthError::RegistrationRejected(msg) if msg.contains("kty 2")));
    }

    #[test]
    fn test_curve_must_match_algorithm() {
        let bytes = cose_map(vec![
            (KTY, Value::Integer(KTY_EC2.into())),
            (ALG, Value::Integer((-7).into())),
            (CRV, Value::Integer(CRV_SECP256K1.into())),
            (X, Value::Bytes(vec![0x11; 32])),
            (Y, Value::Bytes(vec![0x22; 32])),
        ]);
        assert!(matches!(
            PublicKeyMaterial::from_cose(&bytes),
            Err(AuthError::RegistrationRejected(_))
        ));
    }

    #[test]
    fn test_point_off_curve_is_rejected() {
        // Same shape as a real P-256 key, but (0x11.., 0x22..) is not on the curve.
        let bytes = cose_map(vec![
            (KTY, Value::Integer(KTY_EC2.into())),
            (ALG, Value::Integer((-7).into())),
            (CRV, Value::Integer(CRV_P256.into())),
            (X, Value::Bytes(vec![0x11; 32])),
            (Y, Value::Bytes(vec![0x22; 32])),
        ]);
        let err = PublicKeyMaterial::from_cose(&bytes).unwrap_err();
        assert!(matches!(err, AuthError::RegistrationRejected(msg) if msg.contains("curve")));
    }

    #[test]
    fn test_not_a_map() {
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Text("key".into()), &mut buf).unwrap();
        assert!(matches!(
            PublicKeyMaterial::from_cose(&buf),
            Err(AuthError::RegistrationRejected(_))
        ));
        assert!(PublicKeyMaterial::from_cose(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn test_ed25519_verify() {
        use ed25519_dalek::Signer;

        let signing_key = ed25519_dalek::SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        let material = PublicKeyMaterial::EdDsa {
            x: signing_key.verifying_key().to_bytes().to_vec(),
        };
        let parsed = PublicKeyMaterial::from_cose(&material.to_cose().unwrap()).unwrap();
        let signature = signing_key.sign(b"signed payload");

        parsed.verify(b"signed payload", &signature.to_bytes()).unwrap();
        assert!(matches!(
            parsed.verify(b"tampered payload", &signature.to_bytes()),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_serde_tagging() {
        let material = PublicKeyMaterial::EdDsa { x: vec![1, 2, 3] };
        let json = serde_json::to_value(&material).unwrap();
        assert_eq!(json["alg"], "ed_dsa");
        assert_eq!(json["x"], "AQID");
    }
}
