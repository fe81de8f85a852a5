//! The canon store: path-keyed version history with hot reload, session
//! pinning, and change notification.
//!
//! Mutation is confined to the reload path. Parsing and validation run with
//! no lock held; the store lock is taken only to check the content hash and
//! to swap the new version in. Readers clone an `Arc<CanonVersion>` and keep
//! a consistent snapshot for as long as they hold it.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use grimoire_core::{
    parse, resolve, Dependency, MacroDef, Metadata, Reference, Section,
};
use grimoire_validate::{
    validate_resolved, validate_with_semantics, SemanticCritic, ValidationReport,
};
use serde::Serialize;

use crate::session::SessionRegistry;
use crate::version::{content_hash, version_id, CanonVersion};
use crate::{
    ChangeCallback, ChangeEvent, ChangeKind, DocumentHandle, SessionState, StoreConfig, StoreError,
};

pub(crate) struct PathEntry {
    pub current: Arc<CanonVersion>,
    /// Oldest first; the back is always `current`.
    pub history: VecDeque<Arc<CanonVersion>>,
    pub loads: u64,
    pub hits: u64,
    /// Set when the file disappeared. Pins keep resolving, flagged as
    /// removed, until a create event clears this.
    pub removed: bool,
}

pub(crate) enum PathState {
    Loaded(PathEntry),
    Failed { error: String },
}

pub(crate) struct ReloadOutcome {
    pub version: Arc<CanonVersion>,
    pub cache_hit: bool,
    pub existed: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub loads: u64,
    pub hits: u64,
}

pub(crate) fn key_for(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

pub(crate) struct StoreInner {
    pub config: StoreConfig,
    pub entries: RwLock<HashMap<PathBuf, PathState>>,
    pub sessions: Mutex<SessionRegistry>,
    pub callbacks: Mutex<Vec<ChangeCallback>>,
    pub includes: Mutex<HashMap<PathBuf, Result<String, String>>>,
    pub watchers: Mutex<HashMap<PathBuf, notify::RecommendedWatcher>>,
}

/// Path-keyed store of canon versions with filesystem-driven invalidation.
pub struct CanonStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl Default for CanonStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl CanonStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                entries: RwLock::new(HashMap::new()),
                sessions: Mutex::new(SessionRegistry::default()),
                callbacks: Mutex::new(Vec::new()),
                includes: Mutex::new(HashMap::new()),
                watchers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Load a path, or return the cached version when the content hash is
    /// unchanged. With `use_cache` false the pipeline always runs and a new
    /// version is published.
    pub fn load_or_get(&self, path: &Path, use_cache: bool) -> Result<Arc<CanonVersion>, StoreError> {
        self.inner.reload(path, use_cache).map(|out| out.version)
    }

    /// Current version for a path (loading if necessary), or the session's
    /// pinned version. `Removed` and `LoadFailed` are distinct from a
    /// document that parsed but fails validation; the latter is `Live` with
    /// a failing report.
    pub fn get_document(&self, path: &Path, session: Option<&str>) -> DocumentHandle {
        match session {
            None => self.current_handle(path),
            Some(session_id) => self.session_handle(path, session_id),
        }
    }

    pub fn get_validation_report(&self, path: &Path) -> Option<ValidationReport> {
        self.get_document(path, None)
            .version()
            .map(|v| v.report.clone())
    }

    /// Version history for a path, oldest first.
    pub fn history(&self, path: &Path) -> Vec<Arc<CanonVersion>> {
        let entries = self.inner.entries.read().unwrap();
        match entries.get(&key_for(path)) {
            Some(PathState::Loaded(entry)) => entry.history.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn stats(&self, path: &Path) -> Option<CacheStats> {
        let entries = self.inner.entries.read().unwrap();
        match entries.get(&key_for(path)) {
            Some(PathState::Loaded(entry)) => Some(CacheStats {
                loads: entry.loads,
                hits: entry.hits,
            }),
            _ => None,
        }
    }

    // --- Sessions ---

    /// Create a session, optionally pinned to a path's current version at
    /// creation time. Fails on duplicate id or when the initial path cannot
    /// be loaded.
    pub fn create_session(&self, session_id: &str, initial_path: Option<&Path>) -> bool {
        let pin = match initial_path {
            Some(path) => {
                let handle = self.get_document(path, None);
                match handle.version() {
                    Some(version) => Some(version.id.clone()),
                    None => return false,
                }
            }
            None => None,
        };
        self.inner.sessions.lock().unwrap().create(session_id, pin)
    }

    pub fn session(&self, session_id: &str) -> Option<SessionState> {
        self.inner.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        self.inner.sessions.lock().unwrap().remove(session_id)
    }

    /// Explicitly re-pin a session to a version anywhere in history.
    pub fn repin_session(&self, session_id: &str, version_id: &str) -> bool {
        if self.inner.find_version(version_id).is_none() {
            return false;
        }
        self.inner
            .sessions
            .lock()
            .unwrap()
            .set_pin(session_id, version_id.to_string())
    }

    /// With no target: re-pin to the entry immediately preceding the
    /// session's pin in that path's history. With a target: re-pin to it if
    /// it exists in any watched path's history.
    pub fn rollback_session(&self, session_id: &str, version_id: Option<&str>) -> bool {
        match version_id {
            Some(vid) => self.repin_session(session_id, vid),
            None => {
                let pinned = {
                    let sessions = self.inner.sessions.lock().unwrap();
                    match sessions.get(session_id) {
                        Some(session) => session.pinned_version.clone(),
                        None => return false,
                    }
                };
                let Some(pin) = pinned else { return false };
                let Some(previous) = self.inner.preceding_version(&pin) else {
                    return false;
                };
                self.inner
                    .sessions
                    .lock()
                    .unwrap()
                    .set_pin(session_id, previous)
            }
        }
    }

    /// Remove sessions whose last access is older than `max_age_secs`.
    pub fn cleanup_sessions(&self, max_age_secs: u64) -> usize {
        self.inner.sessions.lock().unwrap().cleanup(max_age_secs)
    }

    // --- Change notification ---

    /// Register a callback invoked after each confirmed reload (and on
    /// removal), once the cache swap is complete. The version is `None` for
    /// delete/move events.
    pub fn on_change(
        &self,
        callback: impl Fn(&ChangeEvent, Option<&CanonVersion>) + Send + Sync + 'static,
    ) {
        self.inner
            .callbacks
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    // --- Includes ---

    /// Content of an include target, resolved relative to the including
    /// file and cached by resolved path. Failures are cached too: an
    /// include that cannot load is local to that include, never a document
    /// failure.
    pub fn include_content(&self, from: &Path, target: &str) -> Result<String, StoreError> {
        let base = from.parent().unwrap_or_else(|| Path::new("."));
        let resolved = key_for(&base.join(target));

        let mut includes = self.inner.includes.lock().unwrap();
        if let Some(cached) = includes.get(&resolved) {
            return cached.clone().map_err(|message| StoreError::Include {
                path: resolved.clone(),
                message,
            });
        }
        let loaded = std::fs::read_to_string(&resolved).map_err(|e| e.to_string());
        if let Err(message) = &loaded {
            tracing::warn!(path = %resolved.display(), error = %message, "include failed to load");
        }
        includes.insert(resolved.clone(), loaded.clone());
        loaded.map_err(|message| StoreError::Include {
            path: resolved,
            message,
        })
    }

    // --- Export ---

    /// Full structural dump for the prompt-assembly layer: metadata,
    /// sections, references, dependencies, and the validation report.
    pub fn export(&self, path: &Path, session: Option<&str>) -> Option<CanonExport> {
        let handle = self.get_document(path, session);
        let removed = handle.is_removed();
        let version = handle.version()?;
        let document = version.document();
        Some(CanonExport {
            path: document.path.clone(),
            version_id: version.id.clone(),
            content_hash: version.content_hash.clone(),
            created_at: version.created_at,
            removed,
            metadata: document.metadata.clone(),
            sections: document.sections.clone(),
            references: version.resolved.references.clone(),
            dependencies: version.resolved.dependencies.clone(),
            macros: version.resolved.macros.clone(),
            valid: version.report.is_valid(),
            report: version.report.clone(),
        })
    }

    // --- Semantic critique (on demand) ---

    /// Re-run validation with the semantic pass over the current version.
    /// The stored report is untouched; critique is an on-demand view.
    pub async fn critique(
        &self,
        path: &Path,
        critic: &dyn SemanticCritic,
    ) -> Option<ValidationReport> {
        let handle = self.get_document(path, None);
        let version = handle.version()?.clone();
        Some(
            validate_with_semantics(
                &version.resolved,
                &self.inner.config.validation,
                critic,
            )
            .await,
        )
    }

    // --- Handles ---

    fn current_handle(&self, path: &Path) -> DocumentHandle {
        let key = key_for(path);
        {
            let entries = self.inner.entries.read().unwrap();
            if let Some(PathState::Loaded(entry)) = entries.get(&key) {
                if entry.removed {
                    return DocumentHandle::Removed(entry.current.clone());
                }
                return DocumentHandle::Live(entry.current.clone());
            }
        }
        match self.inner.reload(&key, true) {
            Ok(out) => DocumentHandle::Live(out.version),
            Err(StoreError::Load { source, .. }) if source.kind() == ErrorKind::NotFound => {
                DocumentHandle::NotFound
            }
            Err(e) => DocumentHandle::LoadFailed(e.to_string()),
        }
    }

    fn session_handle(&self, path: &Path, session_id: &str) -> DocumentHandle {
        let pinned = {
            let mut sessions = self.inner.sessions.lock().unwrap();
            sessions.touch(session_id)
        };
        match pinned {
            None => DocumentHandle::NotFound,
            Some(Some(version_id)) => match self.inner.find_version(&version_id) {
                Some((version, removed)) if removed => DocumentHandle::Removed(version),
                Some((version, _)) => DocumentHandle::Live(version),
                None => DocumentHandle::NotFound,
            },
            Some(None) => {
                // First access binds the session; reloads never re-bind it.
                let handle = self.current_handle(path);
                if let Some(version) = handle.version() {
                    self.inner
                        .sessions
                        .lock()
                        .unwrap()
                        .set_pin(session_id, version.id.clone());
                }
                handle
            }
        }
    }
}

impl StoreInner {
    /// The parse→resolve→validate pipeline plus the cache swap. Parsing runs
    /// with no lock held.
    pub(crate) fn reload(&self, path: &Path, use_cache: bool) -> Result<ReloadOutcome, StoreError> {
        let key = key_for(path);
        let raw = match std::fs::read_to_string(&key) {
            Ok(raw) => raw,
            Err(source) => {
                self.record_read_failure(&key, &source);
                return Err(StoreError::Load { path: key, source });
            }
        };
        let hash = content_hash(&raw);

        if use_cache {
            if let Some(hit) = self.try_cache_hit(&key, &hash) {
                return Ok(hit);
            }
        }

        let document = parse(&key.to_string_lossy(), &raw);
        let resolved = resolve(&document);
        let report = validate_resolved(&resolved, &self.config.validation);

        let mut entries = self.entries.write().unwrap();
        // Another load may have published this content while we parsed.
        if use_cache {
            if let Some(PathState::Loaded(entry)) = entries.get_mut(&key) {
                if entry.current.content_hash == hash {
                    entry.hits += 1;
                    entry.removed = false;
                    return Ok(ReloadOutcome {
                        version: entry.current.clone(),
                        cache_hit: true,
                        existed: true,
                    });
                }
            }
        }

        let (loads, mut history, hits, existed) = match entries.remove(&key) {
            Some(PathState::Loaded(entry)) => {
                (entry.loads, entry.history, entry.hits, true)
            }
            _ => (0, VecDeque::new(), 0, false),
        };
        let created_at: DateTime<Utc> = Utc::now();
        let version = Arc::new(CanonVersion {
            id: version_id(&key, created_at, loads + 1),
            resolved,
            content_hash: hash,
            created_at,
            report,
        });
        history.push_back(version.clone());
        while history.len() > self.config.max_history {
            history.pop_front();
        }
        entries.insert(
            key.clone(),
            PathState::Loaded(PathEntry {
                current: version.clone(),
                history,
                loads: loads + 1,
                hits,
                removed: false,
            }),
        );
        drop(entries);

        // A canon that is itself included elsewhere must be re-read next time.
        self.includes.lock().unwrap().remove(&key);

        tracing::debug!(path = %key.display(), version = %version.id, "canon loaded");
        Ok(ReloadOutcome {
            version,
            cache_hit: false,
            existed,
        })
    }

    fn try_cache_hit(&self, key: &Path, hash: &str) -> Option<ReloadOutcome> {
        let mut entries = self.entries.write().unwrap();
        if let Some(PathState::Loaded(entry)) = entries.get_mut(key) {
            if entry.current.content_hash == hash {
                entry.hits += 1;
                entry.removed = false;
                return Some(ReloadOutcome {
                    version: entry.current.clone(),
                    cache_hit: true,
                    existed: true,
                });
            }
        }
        None
    }

    fn record_read_failure(&self, key: &Path, source: &std::io::Error) {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(key) {
            Some(PathState::Loaded(entry)) => {
                if source.kind() == ErrorKind::NotFound {
                    entry.removed = true;
                }
                // Other read errors keep the last good version.
            }
            _ => {
                entries.insert(
                    key.to_path_buf(),
                    PathState::Failed {
                        error: source.to_string(),
                    },
                );
            }
        }
    }

    /// Entry point for filesystem events; also used directly by tests.
    /// One path's failure never affects another; errors are recorded
    /// per-path and logged.
    pub(crate) fn apply_change(&self, path: &Path, kind: ChangeKind) {
        match kind {
            ChangeKind::Deleted | ChangeKind::Moved => self.apply_removed(path, kind),
            ChangeKind::Created | ChangeKind::Modified => match self.reload(path, true) {
                Ok(out) if out.cache_hit => {
                    // Event without a real content change; nothing to announce.
                }
                Ok(out) => {
                    let kind = if out.existed {
                        ChangeKind::Modified
                    } else {
                        ChangeKind::Created
                    };
                    let event = ChangeEvent {
                        path: key_for(path),
                        kind,
                    };
                    self.notify(&event, Some(&out.version));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "reload failed");
                }
            },
        }
    }

    fn apply_removed(&self, path: &Path, kind: ChangeKind) {
        let key = key_for(path);
        {
            let mut entries = self.entries.write().unwrap();
            match entries.get_mut(&key) {
                Some(PathState::Loaded(entry)) => entry.removed = true,
                _ => return,
            }
        }
        tracing::debug!(path = %key.display(), "canon removed");
        self.notify(&ChangeEvent { path: key, kind }, None);
    }

    fn notify(&self, event: &ChangeEvent, version: Option<&CanonVersion>) {
        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            callback(event, version);
        }
    }

    /// Find a version id anywhere in history; returns it with the owning
    /// path's removed flag.
    pub(crate) fn find_version(&self, version_id: &str) -> Option<(Arc<CanonVersion>, bool)> {
        let entries = self.entries.read().unwrap();
        for state in entries.values() {
            if let PathState::Loaded(entry) = state {
                if let Some(version) = entry.history.iter().find(|v| v.id == version_id) {
                    return Some((version.clone(), entry.removed));
                }
            }
        }
        None
    }

    /// The id of the history entry immediately preceding `version_id` in its
    /// owning path's history, if any.
    pub(crate) fn preceding_version(&self, version_id: &str) -> Option<String> {
        let entries = self.entries.read().unwrap();
        for state in entries.values() {
            if let PathState::Loaded(entry) = state {
                if let Some(idx) = entry.history.iter().position(|v| v.id == version_id) {
                    return if idx > 0 {
                        Some(entry.history[idx - 1].id.clone())
                    } else {
                        None
                    };
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn write_canon(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        // Canonicalize so store keys stay stable once the file is deleted.
        let path = dir.path().canonicalize().unwrap().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_apply_change_notifies_with_new_version_after_swap() {
        let dir = TempDir::new().unwrap();
        let path = write_canon(&dir, "w.md", "# World\nfirst draft of the city.\n");
        let store = CanonStore::default();

        let seen: Arc<StdMutex<Vec<(ChangeKind, Option<String>)>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_change(move |event, version| {
            sink.lock()
                .unwrap()
                .push((event.kind, version.map(|v| v.id.clone())));
        });

        store.inner.apply_change(&path, ChangeKind::Created);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].0, ChangeKind::Created);
            assert!(seen[0].1.is_some());
        }

        // Same content again: hash short-circuit, no announcement.
        store.inner.apply_change(&path, ChangeKind::Modified);
        assert_eq!(seen.lock().unwrap().len(), 1);

        fs::write(&path, "# World\nsecond draft of the city.\n").unwrap();
        store.inner.apply_change(&path, ChangeKind::Modified);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[1].0, ChangeKind::Modified);
        }
    }

    #[test]
    fn test_create_event_on_known_path_reported_as_modified() {
        let dir = TempDir::new().unwrap();
        let path = write_canon(&dir, "w.md", "# World\nfirst draft of the city.\n");
        let store = CanonStore::default();
        store.load_or_get(&path, true).unwrap();

        let seen: Arc<StdMutex<Vec<ChangeKind>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_change(move |event, _| sink.lock().unwrap().push(event.kind));

        fs::write(&path, "# World\nrewritten entirely.\n").unwrap();
        // Atomic replace on some platforms surfaces as Create.
        store.inner.apply_change(&path, ChangeKind::Created);
        assert_eq!(seen.lock().unwrap().as_slice(), &[ChangeKind::Modified]);
    }

    #[test]
    fn test_removed_path_serves_last_version_with_signal() {
        let dir = TempDir::new().unwrap();
        let path = write_canon(&dir, "w.md", "# World\nfirst draft of the city.\n");
        let store = CanonStore::default();
        let v1 = store.load_or_get(&path, true).unwrap();

        let seen: Arc<StdMutex<Vec<(ChangeKind, bool)>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_change(move |event, version| {
            sink.lock().unwrap().push((event.kind, version.is_some()))
        });

        fs::remove_file(&path).unwrap();
        store.inner.apply_change(&path, ChangeKind::Deleted);

        assert_eq!(seen.lock().unwrap().as_slice(), &[(ChangeKind::Deleted, false)]);
        match store.get_document(&path, None) {
            DocumentHandle::Removed(version) => assert_eq!(version.id, v1.id),
            other => panic!("expected Removed, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_event_for_unknown_path_ignored() {
        let dir = TempDir::new().unwrap();
        let store = CanonStore::default();
        let seen: Arc<StdMutex<Vec<ChangeKind>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_change(move |event, _| sink.lock().unwrap().push(event.kind));

        store
            .inner
            .apply_change(&dir.path().join("ghost.md"), ChangeKind::Deleted);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recreated_path_clears_removed_flag() {
        let dir = TempDir::new().unwrap();
        let path = write_canon(&dir, "w.md", "# World\nfirst draft of the city.\n");
        let store = CanonStore::default();
        store.load_or_get(&path, true).unwrap();

        fs::remove_file(&path).unwrap();
        store.inner.apply_change(&path, ChangeKind::Deleted);
        assert!(store.get_document(&path, None).is_removed());

        fs::write(&path, "# World\nthe city returns.\n").unwrap();
        store.inner.apply_change(&path, ChangeKind::Created);
        match store.get_document(&path, None) {
            DocumentHandle::Live(_) => {}
            other => panic!("expected Live, got {:?}", other),
        }
    }

    #[test]
    fn test_reload_failure_on_one_path_leaves_others_alone() {
        let dir = TempDir::new().unwrap();
        let good = write_canon(&dir, "good.md", "# World\nstable and well formed.\n");
        let store = CanonStore::default();
        store.load_or_get(&good, true).unwrap();

        let missing = dir.path().join("missing.md");
        assert!(store.load_or_get(&missing, true).is_err());

        assert!(matches!(
            store.get_document(&good, None),
            DocumentHandle::Live(_)
        ));
        assert!(matches!(
            store.get_document(&missing, None),
            DocumentHandle::NotFound
        ));
    }
}

/// Structural dump of one version, for the prompt-assembly/session layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonExport {
    pub path: String,
    pub version_id: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub removed: bool,
    pub metadata: Metadata,
    pub sections: Vec<Section>,
    pub references: Vec<Reference>,
    pub dependencies: Vec<Dependency>,
    pub macros: Vec<MacroDef>,
    pub valid: bool,
    pub report: ValidationReport,
}
