use crate::error::{AuthError, Result};
use sha2::{Digest, Sha256};

/// User present
pub const FLAG_UP: u8 = 0x01;
/// User verified
pub const FLAG_UV: u8 = 0x04;
/// Backup eligible
pub const FLAG_BE: u8 = 0x08;
/// Attested credential data included
pub const FLAG_AT: u8 = 0x40;
/// Extension data included
pub const FLAG_ED: u8 = 0x80;

const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// Credential data present in authenticator data at registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// CBOR COSE_Key, exactly as the authenticator encoded it
    pub public_key_cose: Vec<u8>,
}

/// Parsed `authenticatorData`
///
/// Layout: `rpIdHash (32) | flags (1) | signCount (4, big endian) |
/// [aaguid (16) | credIdLen (2) | credId | COSE key] | [extensions]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "authenticator data is {} bytes, need at least {HEADER_LEN}",
                bytes.len()
            )));
        }
        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut rest = &bytes[HEADER_LEN..];
        let attested_credential = if flags & FLAG_AT != 0 {
            if rest.len() < AAGUID_LEN + 2 {
                return Err(malformed("attested credential data truncated"));
            }
            let mut aaguid = [0u8; AAGUID_LEN];
            aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
            let id_len = u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]) as usize;
            rest = &rest[AAGUID_LEN + 2..];
            if rest.len() < id_len {
                return Err(malformed("credential id truncated"));
            }
            let credential_id = rest[..id_len].to_vec();
            rest = &rest[id_len..];

            let before = rest;
            let _: ciborium::value::Value = ciborium::from_reader(&mut rest)
                .map_err(|e| malformed(format!("credential public key is not CBOR: {e}")))?;
            let consumed = before.len() - rest.len();

            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                public_key_cose: before[..consumed].to_vec(),
            })
        } else {
            None
        };

        if flags & FLAG_ED == 0 && !rest.is_empty() {
            return Err(malformed(format!("{} trailing bytes in authenticator data", rest.len())));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    /// Serialize back to the wire layout (no extensions)
    ///
    /// # Errors
    /// - `Internal` - the credential id does not fit the 16-bit length field
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(HEADER_LEN);
        data.extend_from_slice(&self.rp_id_hash);
        data.push(self.flags);
        data.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(cred) = &self.attested_credential {
            let id_len = u16::try_from(cred.credential_id.len()).map_err(|_| {
                AuthError::Internal(format!(
                    "credential id is {} bytes, longer than the length field allows",
                    cred.credential_id.len()
                ))
            })?;
            data.extend_from_slice(&cred.aaguid);
            data.extend_from_slice(&id_len.to_be_bytes());
            data.extend_from_slice(&cred.credential_id);
            data.extend_from_slice(&cred.public_key_cose);
        }
        Ok(data)
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }
}

pub fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

fn malformed(reason: impl Into<String>) -> AuthError {
    AuthError::MalformedPayload(reason.into())
}
