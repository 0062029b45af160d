use crate::config::CredentialPolicy;
use crate::error::{AuthError, Result};
use crate::types::{CredentialId, CredentialRecord, Identity};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Storage for registered credentials
///
/// Implementations own their concurrency discipline: mutations for one key
/// must be serialized, and different identities must not contend.
/// Backend failures are reported as `AuthError::Internal`.
pub trait CredentialStore: Send + Sync {
    /// Bind `record` to its identity
    ///
    /// # Errors
    /// - `IdentityExists` - the identity already owns a credential under `SinglePerIdentity`
    /// - `CredentialIdCollision` - the credential id is already registered
    fn register(&self, record: CredentialRecord, policy: CredentialPolicy) -> Result<()>;

    /// All credentials owned by `identity`, `None` if it has none
    fn find_by_identity(&self, identity: &Identity) -> Result<Option<Vec<CredentialRecord>>>;

    fn find_by_credential_id(&self, id: &CredentialId) -> Result<Option<CredentialRecord>>;

    /// Record a new authenticator sign counter
    ///
    /// A pair of zero counters means the authenticator has no counter and is
    /// accepted. Otherwise the counter must strictly increase.
    ///
    /// # Errors
    /// - `CounterRollback` - `counter` did not advance past the stored value
    /// - `UserNotFound` - no such credential
    fn update_sign_counter(&self, id: &CredentialId, counter: u32) -> Result<()>;

    fn credential_count(&self) -> Result<usize>;
}

/// Whether moving from `stored` to `presented` is a rollback
pub fn is_counter_rollback(stored: u32, presented: u32) -> bool {
    !(stored == 0 && presented == 0) && presented <= stored
}

/// Non-durable credential store for development and tests
///
/// Credentials are lost when the process exits.
#[derive(Default)]
pub struct MemoryCredentialStore {
    by_id: DashMap<CredentialId, CredentialRecord>,
    by_identity: DashMap<Identity, Vec<CredentialId>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn register(&self, record: CredentialRecord, policy: CredentialPolicy) -> Result<()> {
        // Lock order: by_id, then by_identity.
        match self.by_id.entry(record.credential_id.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().identity == record.identity
                    && policy == CredentialPolicy::SinglePerIdentity
                {
                    Err(AuthError::IdentityExists)
                } else {
                    Err(AuthError::CredentialIdCollision)
                }
            }
            Entry::Vacant(slot) => {
                let mut owned = self.by_identity.entry(record.identity.clone()).or_default();
                if policy == CredentialPolicy::SinglePerIdentity && !owned.is_empty() {
                    return Err(AuthError::IdentityExists);
                }
                owned.push(record.credential_id.clone());
                drop(owned);
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn find_by_identity(&self, identity: &Identity) -> Result<Option<Vec<CredentialRecord>>> {
        let ids = match self.by_identity.get(identity) {
            Some(ids) => ids.clone(),
            None => return Ok(None),
        };
        let records: Vec<CredentialRecord> = ids
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|r| r.clone()))
            .collect();
        Ok((!records.is_empty()).then_some(records))
    }

    fn find_by_credential_id(&self, id: &CredentialId) -> Result<Option<CredentialRecord>> {
        Ok(self.by_id.get(id).map(|r| r.clone()))
    }

    fn update_sign_counter(&self, id: &CredentialId, counter: u32) -> Result<()> {
        let mut record = self.by_id.get_mut(id).ok_or(AuthError::UserNotFound)?;
        if is_counter_rollback(record.sign_count, counter) {
            return Err(AuthError::CounterRollback {
                stored: record.sign_count,
                presented: counter,
            });
        }
        record.sign_count = counter;
        record.last_used_at = Some(Utc::now());
        Ok(())
    }

    fn credential_count(&self) -> Result<usize> {
        Ok(self.by_id.len())
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("credentials", &self.by_id.len())
            .field("identities", &self.by_identity.len())
            .finish()
    }
}
