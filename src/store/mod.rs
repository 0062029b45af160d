//! Ceremony state storage
//!
//! - **Challenges** (always in memory): sessions are temporary and expire
//!   after the configured timeout.
//! - **Credentials** (behind [`CredentialStore`]): production deployments
//!   must plug in a durable backend; [`MemoryCredentialStore`] is for
//!   development and tests only.

pub mod challenge;
pub mod credential;

pub use challenge::{CeremonySession, CeremonyState, ChallengeStore, ChallengeSubject};
pub use credential::{CredentialStore, MemoryCredentialStore};
