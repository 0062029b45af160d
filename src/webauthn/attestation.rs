use crate::error::{AuthError, Result};
use ciborium::value::Value;

/// The only attestation statement format accepted
pub const FMT_NONE: &str = "none";

/// Decoded `attestationObject`
#[derive(Clone, Debug, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| malformed(format!("attestation object is not CBOR: {e}")))?;
        let Value::Map(entries) = value else {
            return Err(malformed("attestation object is not a map"));
        };

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data = None;
        for (key, value) in entries {
            match (key, value) {
                (Value::Text(k), Value::Text(v)) if k == "fmt" => fmt = Some(v),
                (Value::Text(k), Value::Map(v)) if k == "attStmt" => att_stmt = Some(v),
                (Value::Text(k), Value::Bytes(v)) if k == "authData" => auth_data = Some(v),
                _ => {}
            }
        }

        Ok(Self {
            fmt: fmt.ok_or_else(|| malformed("attestation object has no fmt"))?,
            att_stmt: att_stmt.ok_or_else(|| malformed("attestation object has no attStmt"))?,
            auth_data: auth_data.ok_or_else(|| malformed("attestation object has no authData"))?,
        })
    }

    /// Build a `none` attestation object around `auth_data`
    pub fn none(auth_data: Vec<u8>) -> Self {
        Self {
            fmt: FMT_NONE.to_string(),
            att_stmt: Vec::new(),
            auth_data,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let map = Value::Map(vec![
            (Value::Text("fmt".to_string()), Value::Text(self.fmt.clone())),
            (Value::Text("attStmt".to_string()), Value::Map(self.att_stmt.clone())),
            (Value::Text("authData".to_string()), Value::Bytes(self.auth_data.clone())),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf)
            .map_err(|e| AuthError::Internal(format!("attestation object encoding failed: {e}")))?;
        Ok(buf)
    }

    /// `none` format with an empty statement
    pub fn is_self_asserted(&self) -> bool {
        self.fmt == FMT_NONE && self.att_stmt.is_empty()
    }
}

fn malformed(reason: impl Into<String>) -> AuthError {
    AuthError::MalformedPayload(reason.into())
}
