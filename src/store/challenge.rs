//! In-memory store for in-flight ceremony sessions.
//!
//! Sessions are short-lived and never need to survive a restart: losing them
//! only forces clients to start the ceremony again.

use crate::crypto::challenge::generate_challenge;
use crate::error::{AuthError, Result};
use crate::types::{Challenge, ChallengeContext, CredentialId, Identity};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Expired sessions are swept once every this many issued challenges
pub const SWEEP_INTERVAL: usize = 1024;

/// Who a challenge was issued to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChallengeSubject {
    Identity(Identity),
    /// Per-attempt token for a discoverable authentication
    Session(Uuid),
}

/// Ceremony progress as seen by the challenge store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CeremonyState {
    /// No ceremony in flight
    Idle,
    /// Challenge issued and still live
    Started,
    /// Challenge issued but its timeout has passed
    Expired,
}

/// An in-flight ceremony: its challenge and what it was bound to at start
#[derive(Clone, Debug)]
pub struct CeremonySession {
    pub challenge: Challenge,
    pub context: ChallengeContext,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Credentials an identity-scoped authentication is restricted to
    pub allowed_credentials: Vec<CredentialId>,
}

impl CeremonySession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

type SessionKey = (ChallengeSubject, ChallengeContext);

/// Issues and tracks single-use challenges per subject and context
///
/// Discoverable authentications get a fresh session per attempt, so abandoned
/// attempts accumulate until they expire and are swept. A sweep runs every
/// [`SWEEP_INTERVAL`] issues; at any moment the store holds at most the
/// sessions issued within one timeout plus one interval's worth.
pub struct ChallengeStore {
    sessions: DashMap<SessionKey, CeremonySession>,
    timeout: Duration,
    issued: AtomicUsize,
}

impl ChallengeStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
            issued: AtomicUsize::new(0),
        }
    }

    /// Issue a fresh challenge, superseding any unconsumed one for the same subject and context
    pub fn issue(&self, subject: ChallengeSubject, context: ChallengeContext) -> Challenge {
        self.issue_bound(subject, context, Vec::new())
    }

    /// Issue a challenge that also records the credentials the ceremony may use
    pub fn issue_bound(
        &self,
        subject: ChallengeSubject,
        context: ChallengeContext,
        allowed_credentials: Vec<CredentialId>,
    ) -> Challenge {
        let challenge = generate_challenge();
        let issued_at = Utc::now();
        let session = CeremonySession {
            challenge: challenge.clone(),
            context,
            issued_at,
            expires_at: issued_at + self.timeout,
            allowed_credentials,
        };
        if self.sessions.insert((subject, context), session).is_some() {
            tracing::debug!(?context, "superseded unconsumed challenge");
        }

        let issued = self.issued.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if issued % SWEEP_INTERVAL == 0 {
            let purged = self.purge_expired();
            tracing::debug!(purged, pending = self.pending(), "swept expired challenges");
        }
        challenge
    }

    /// Consume the live challenge for `subject` and `context`
    ///
    /// Succeeds at most once per issued challenge. Expired sessions are
    /// removed on sight; a mismatching presentation leaves the session in place.
    ///
    /// # Errors
    /// - `NoChallenge` - nothing was issued, or it was already consumed
    /// - `Expired` - the session timed out
    /// - `ChallengeMismatch` - `presented` is not the issued challenge
    pub fn consume(
        &self,
        subject: &ChallengeSubject,
        context: ChallengeContext,
        presented: &[u8],
    ) -> Result<CeremonySession> {
        match self.sessions.entry((subject.clone(), context)) {
            Entry::Vacant(_) => Err(AuthError::NoChallenge),
            Entry::Occupied(entry) => {
                if entry.get().is_expired(Utc::now()) {
                    entry.remove();
                    return Err(AuthError::Expired);
                }
                if entry.get().challenge.as_bytes() != presented {
                    return Err(AuthError::ChallengeMismatch);
                }
                Ok(entry.remove())
            }
        }
    }

    pub fn state(&self, subject: &ChallengeSubject, context: ChallengeContext) -> CeremonyState {
        match self.sessions.get(&(subject.clone(), context)) {
            None => CeremonyState::Idle,
            Some(session) if session.is_expired(Utc::now()) => CeremonyState::Expired,
            Some(_) => CeremonyState::Started,
        }
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        self.sessions.retain(|_, session| {
            let live = !session.is_expired(now);
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    /// Number of sessions currently held, expired or not
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("sessions", &self.sessions.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
