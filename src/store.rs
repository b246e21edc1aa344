//! The session-scoped token store.
//!
//! A concurrent cache mapping user id → session id → [`TokenRecord`].
//! Concurrent sessions per user are first-class: two devices signed in as
//! the same user hold independent records with independent lifecycles.
//!
//! # Atomicity
//!
//! Every structural update goes through the cache's per-entry compute API,
//! so operations on one user id are serialized: a `put` for a new session
//! cannot be lost to a concurrent `put` for a sibling session, a user entry
//! whose last session was evicted is removed in the same step (no empty
//! inner map ever persists), and a `put` racing `invalidate_all_sessions`
//! resolves to either "record present" or "user fully absent".
//!
//! # Expiry
//!
//! The per-record `expiry` field is authoritative: reads treat a stale
//! record as absent. On top of that the user level carries a maximum-size,
//! write-expiry policy as a memory safety net; it is deliberately coarse
//! and application logic must not rely on it.

use dashmap::DashMap;
use moka::ops::compute::Op;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::config::StoreOptions;
use crate::error::{AuthError, AuthResult};

/// One session's credentials. Owned exclusively by the store; callers get
/// clones and must not hold them across refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Opaque access token.
    pub access_token: String,
    /// Opaque refresh token.
    pub refresh_token: String,
    /// Absolute expiry of the access token, epoch seconds. Authoritative.
    pub expiry: u64,
    /// Session this record belongs to.
    pub session_id: String,
}

impl TokenRecord {
    /// Whether the access token's expiry has passed.
    pub fn is_expired(&self) -> bool {
        epoch_seconds() >= self.expiry
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

type SessionMap = Arc<DashMap<String, TokenRecord>>;

/// Concurrent map-of-maps holding per-(user, session) token pairs.
#[derive(Debug)]
pub struct SessionTokenStore {
    users: Cache<String, SessionMap>,
}

impl Default for SessionTokenStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl SessionTokenStore {
    /// Create a store with the given size/TTL safety net.
    pub fn new(options: StoreOptions) -> Self {
        Self {
            users: Cache::builder()
                .max_capacity(options.max_users)
                .time_to_live(Duration::from_secs(options.write_ttl_secs))
                .build(),
        }
    }

    /// Insert or replace the record for exactly (`user_id`, `session_id`).
    ///
    /// `expires_in_secs` is the provider's relative expiry; the stored
    /// record carries the absolute epoch timestamp.
    pub fn put(
        &self,
        user_id: &str,
        session_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: u64,
    ) {
        let record = TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expiry: epoch_seconds() + expires_in_secs,
            session_id: session_id.to_string(),
        };
        self.users
            .entry(user_id.to_string())
            .and_compute_with(|entry| {
                let sessions = entry
                    .map(|e| e.into_value())
                    .unwrap_or_else(|| Arc::new(DashMap::new()));
                sessions.insert(session_id.to_string(), record);
                // Re-put even when the map existed, so the coarse write-TTL
                // restarts on refresh.
                Op::Put(sessions)
            });
        info!(user = %user_id, session = %session_id, "stored session tokens");
    }

    /// Look up the record for (`user_id`, `session_id`).
    ///
    /// A record past its own `expiry` is treated as absent; the store does
    /// not sweep it eagerly.
    pub fn get(&self, user_id: &str, session_id: &str) -> Option<TokenRecord> {
        let sessions = self.users.get(user_id)?;
        if sessions.is_empty() {
            // Unreachable if the compute-update invariants hold.
            error!(
                user = %user_id,
                "store inconsistency: empty session map persisted"
            );
            return None;
        }
        let record = sessions.get(session_id)?.clone();
        if record.is_expired() {
            debug!(user = %user_id, session = %session_id, "record past expiry, treating as absent");
            return None;
        }
        Some(record)
    }

    /// Remove exactly one session's record. Removing the user's last
    /// session removes the user entry itself. Idempotent: a second call for
    /// the same session is a no-op.
    pub fn invalidate_session(&self, user_id: &str, session_id: &str) {
        self.users
            .entry(user_id.to_string())
            .and_compute_with(|entry| match entry {
                None => Op::Nop,
                Some(e) => {
                    let sessions = e.into_value();
                    if sessions.remove(session_id).is_some() {
                        debug!(user = %user_id, session = %session_id, "session invalidated");
                    }
                    if sessions.is_empty() {
                        Op::Remove
                    } else {
                        Op::Put(sessions)
                    }
                }
            });
    }

    /// Remove every session for a user. Atomic with respect to concurrent
    /// `put` calls for the same user.
    pub fn invalidate_all_sessions(&self, user_id: &str) {
        self.users
            .entry(user_id.to_string())
            .and_compute_with(|entry| match entry {
                None => Op::Nop,
                Some(e) => {
                    let count = e.into_value().len();
                    warn!(user = %user_id, sessions = count, "all sessions invalidated");
                    Op::Remove
                }
            });
    }

    /// Number of live (non-expired) sessions for a user.
    pub fn session_count(&self, user_id: &str) -> usize {
        self.users
            .get(user_id)
            .map(|sessions| sessions.iter().filter(|r| !r.value().is_expired()).count())
            .unwrap_or(0)
    }

    /// Check the no-empty-entry invariant across the whole store.
    ///
    /// A user entry whose session map is empty must never persist; if one
    /// does, this returns [`AuthError::StoreInconsistency`] naming the
    /// user. Unreachable when the compute-update paths hold the invariant;
    /// the test suite asserts it stays that way.
    ///
    /// # Errors
    ///
    /// `StoreInconsistency` for the first leaked empty entry found.
    pub fn verify_consistency(&self) -> AuthResult<()> {
        self.users.run_pending_tasks();
        for (user, sessions) in self.users.iter() {
            if sessions.is_empty() {
                error!(user = %user, "store inconsistency: empty session map persisted");
                return Err(AuthError::StoreInconsistency(format!(
                    "empty session map persisted for user {user}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionTokenStore {
        SessionTokenStore::default()
    }

    #[test]
    fn put_then_get_round_trips() {
        let s = store();
        s.put("alice", "s1", "A1", "R1", 3600);
        let rec = s.get("alice", "s1").expect("record present");
        assert_eq!(rec.access_token, "A1");
        assert_eq!(rec.refresh_token, "R1");
        assert_eq!(rec.session_id, "s1");
        assert!(!rec.is_expired());
    }

    #[test]
    fn sessions_are_independent() {
        let s = store();
        s.put("alice", "s1", "A1", "R1", 3600);
        s.put("alice", "s2", "A2", "R2", 3600);

        let r1 = s.get("alice", "s1").unwrap();
        assert_eq!((r1.access_token.as_str(), r1.refresh_token.as_str()), ("A1", "R1"));

        s.invalidate_session("alice", "s1");
        assert!(s.get("alice", "s1").is_none());

        let r2 = s.get("alice", "s2").unwrap();
        assert_eq!((r2.access_token.as_str(), r2.refresh_token.as_str()), ("A2", "R2"));
    }

    #[test]
    fn last_session_removal_drops_user_entry() {
        let s = store();
        s.put("bob", "s1", "A", "R", 3600);
        s.invalidate_session("bob", "s1");
        assert!(s.get("bob", "s1").is_none());
        assert!(s.verify_consistency().is_ok());
        assert_eq!(s.session_count("bob"), 0);
    }

    #[test]
    fn invalidate_session_is_idempotent() {
        let s = store();
        s.put("bob", "s1", "A", "R", 3600);
        s.invalidate_session("bob", "s1");
        s.invalidate_session("bob", "s1"); // no-op, not an error
        assert!(s.verify_consistency().is_ok());
    }

    #[test]
    fn invalidate_all_removes_every_session() {
        let s = store();
        for i in 0..8 {
            s.put("carol", &format!("s{i}"), "A", "R", 3600);
        }
        s.invalidate_all_sessions("carol");
        for i in 0..8 {
            assert!(s.get("carol", &format!("s{i}")).is_none());
        }
        assert!(s.verify_consistency().is_ok());
    }

    #[test]
    fn injected_empty_entry_surfaces_as_store_inconsistency() {
        let s = store();
        s.put("alice", "s1", "A", "R", 3600);
        // Bypass the compute-update paths to plant the breach the public
        // API can never create.
        s.users.insert("ghost".to_string(), Arc::new(DashMap::new()));

        let err = s.verify_consistency().unwrap_err();
        assert!(matches!(err, AuthError::StoreInconsistency(_)));
        assert!(err.to_string().contains("ghost"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn expired_record_reads_as_absent() {
        let s = store();
        s.put("dave", "s1", "A", "R", 0);
        assert!(s.get("dave", "s1").is_none());
        // The entry still physically exists; only reads mask it.
        assert_eq!(s.session_count("dave"), 0);
    }

    #[test]
    fn replace_in_place_keeps_session_identity() {
        let s = store();
        s.put("erin", "s1", "A-old", "R-old", 3600);
        s.put("erin", "s1", "A-new", "R-new", 3600);
        let rec = s.get("erin", "s1").unwrap();
        assert_eq!(rec.access_token, "A-new");
        assert_eq!(rec.refresh_token, "R-new");
        assert_eq!(rec.session_id, "s1");
        assert_eq!(s.session_count("erin"), 1);
    }
}
