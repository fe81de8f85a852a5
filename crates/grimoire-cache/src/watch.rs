//! Filesystem watching. One watcher per watched directory, kept alive inside
//! the store; events are filtered to configured canon extensions and mapped
//! onto the store's change handling.

use std::path::Path;
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};

use crate::store::{key_for, StoreInner};
use crate::{CanonStore, ChangeKind};

impl CanonStore {
    /// Watch a directory for canon file changes. Returns `false`, never an
    /// error, when the path is not an existing directory, is already
    /// watched, or the watcher cannot be set up.
    pub fn watch(&self, dir: &Path) -> bool {
        let key = key_for(dir);
        if !key.is_dir() {
            return false;
        }
        let mut watchers = self.inner.watchers.lock().unwrap();
        if watchers.contains_key(&key) {
            return false;
        }

        // Weak so the watcher thread never keeps a dropped store alive.
        let weak = Arc::downgrade(&self.inner);
        let extensions = self.inner.config.extensions.clone();
        let mut watcher =
            match recommended_watcher(move |res: Result<Event, notify::Error>| {
                let Ok(event) = res else { return };
                let Some(inner) = weak.upgrade() else { return };
                handle_event(&inner, &extensions, event);
            }) {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!(error = %e, "watcher setup failed");
                    return false;
                }
            };
        if let Err(e) = watcher.watch(&key, RecursiveMode::NonRecursive) {
            tracing::warn!(path = %key.display(), error = %e, "watch failed");
            return false;
        }
        watchers.insert(key, watcher);
        true
    }
}

fn handle_event(inner: &Arc<StoreInner>, extensions: &[String], event: Event) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    for path in &event.paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.iter().any(|e| e == ext) {
            continue;
        }
        // Atomic writes (temp + rename) surface as Modify(Name); a rename
        // away from a watched name looks like a removal.
        let kind = match &event.kind {
            EventKind::Remove(_) => ChangeKind::Deleted,
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) if !path.exists() => ChangeKind::Moved,
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => continue,
        };
        inner.apply_change(path, kind);
    }
}
