//! Session registry: per-consumer version pins.
//!
//! A session binds a consumer to one historical version. Pins never
//! auto-advance on reload; they change only on explicit re-pin or rollback.
//! The cleanup sweep may remove stale sessions but never rewrites a pin.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    /// Version id the session is pinned to. `None` until first access or an
    /// initial-path pin.
    pub pinned_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    sessions: HashMap<String, SessionState>,
}

impl SessionRegistry {
    pub fn create(&mut self, session_id: &str, pinned_version: Option<String>) -> bool {
        if self.sessions.contains_key(session_id) {
            return false;
        }
        let now = Utc::now();
        self.sessions.insert(
            session_id.to_string(),
            SessionState {
                session_id: session_id.to_string(),
                pinned_version,
                created_at: now,
                last_accessed_at: now,
            },
        );
        true
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    /// Refresh the access time and return the current pin.
    pub fn touch(&mut self, session_id: &str) -> Option<Option<String>> {
        let session = self.sessions.get_mut(session_id)?;
        session.last_accessed_at = Utc::now();
        Some(session.pinned_version.clone())
    }

    pub fn set_pin(&mut self, session_id: &str, version_id: String) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) => {
                session.pinned_version = Some(version_id);
                session.last_accessed_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drop sessions not accessed within `max_age_secs`. Returns how many
    /// were removed.
    pub fn cleanup(&mut self, max_age_secs: u64) -> usize {
        let cutoff = Utc::now() - Duration::seconds(max_age_secs as i64);
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_accessed_at >= cutoff);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_duplicate_id() {
        let mut reg = SessionRegistry::default();
        assert!(reg.create("s1", None));
        assert!(!reg.create("s1", Some("v1".into())));
        // The original session is untouched.
        assert_eq!(reg.get("s1").unwrap().pinned_version, None);
    }

    #[test]
    fn test_touch_updates_access_and_returns_pin() {
        let mut reg = SessionRegistry::default();
        reg.create("s1", Some("v1".into()));
        let before = reg.get("s1").unwrap().last_accessed_at;
        assert_eq!(reg.touch("s1"), Some(Some("v1".into())));
        assert!(reg.get("s1").unwrap().last_accessed_at >= before);
        assert_eq!(reg.touch("missing"), None);
    }

    #[test]
    fn test_cleanup_removes_only_stale() {
        let mut reg = SessionRegistry::default();
        reg.create("old", None);
        reg.create("fresh", None);
        // Backdate one session past any cutoff.
        reg.sessions.get_mut("old").unwrap().last_accessed_at =
            Utc::now() - Duration::seconds(7200);
        let removed = reg.cleanup(3600);
        assert_eq!(removed, 1);
        assert!(reg.get("old").is_none());
        assert!(reg.get("fresh").is_some());
    }

    #[test]
    fn test_set_pin_on_missing_session_fails() {
        let mut reg = SessionRegistry::default();
        assert!(!reg.set_pin("ghost", "v1".into()));
    }
}
