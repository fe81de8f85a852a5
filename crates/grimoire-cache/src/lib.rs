mod session;
mod store;
mod version;
mod watch;

pub use session::SessionState;
pub use store::{CacheStats, CanonExport, CanonStore};
pub use version::{content_hash, CanonVersion};

use std::path::PathBuf;
use std::sync::Arc;

use grimoire_validate::ValidationConfig;
use serde::{Deserialize, Serialize};

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Versions retained per path; the oldest beyond this are dropped.
    pub max_history: usize,
    /// File extensions the watcher reacts to.
    pub extensions: Vec<String>,
    pub validation: ValidationConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            extensions: vec!["md".to_string(), "canon".to_string()],
            validation: ValidationConfig::default(),
        }
    }
}

/// True I/O failures. Malformed content is never an error; it parses into a
/// document with a low-scoring report instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load include {path}: {message}")]
    Include { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// Descriptor passed to change callbacks after a cache swap completes.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

pub type ChangeCallback = Box<dyn Fn(&ChangeEvent, Option<&CanonVersion>) + Send + Sync>;

/// Outcome of a document request. `Removed` is the explicit signal consumers
/// must handle: the pinned/last version is still served, but its file is
/// gone from disk.
#[derive(Debug, Clone)]
pub enum DocumentHandle {
    Live(Arc<CanonVersion>),
    Removed(Arc<CanonVersion>),
    LoadFailed(String),
    NotFound,
}

impl DocumentHandle {
    pub fn version(&self) -> Option<&Arc<CanonVersion>> {
        match self {
            DocumentHandle::Live(v) | DocumentHandle::Removed(v) => Some(v),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&grimoire_core::Document> {
        self.version().map(|v| v.document())
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, DocumentHandle::Removed(_))
    }
}
