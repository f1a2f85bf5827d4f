// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cached load/save/modify access to the sidecar document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use netloom_fs::{FsError, FsPort};
use thiserror::Error;
use tracing::warn;

use crate::AnnotationsDoc;

/// Errors emitted when persisting annotations.
///
/// Reads never fail — see [`AnnotationsStore::load`].
#[derive(Debug, Error)]
pub enum AnnotationsError {
    /// Serializing the document failed.
    #[error("annotations serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Writing the sidecar failed.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Derives the sidecar path for a primary topology document.
///
/// The convention is fixed: the primary document's extension is replaced
/// with `annotations.json` (`lab.clab.yml` → `lab.clab.annotations.json`);
/// extensionless paths get the suffix appended.
#[must_use]
pub fn annotations_path(primary: &Path) -> PathBuf {
    primary.with_extension("annotations.json")
}

/// Loads, caches, and atomically read-modify-writes the sidecar document.
///
/// Cached per path; the host invalidates the cache after every committed
/// transaction and history restore. All partial updates must go through
/// [`AnnotationsStore::modify`] so concurrent callers cannot lose updates
/// to a stale in-memory copy.
pub struct AnnotationsStore {
    fs: Arc<dyn FsPort>,
    cache: Mutex<HashMap<PathBuf, AnnotationsDoc>>,
}

impl AnnotationsStore {
    /// Creates a store over the given filesystem port.
    #[must_use]
    pub fn new(fs: Arc<dyn FsPort>) -> Self {
        Self {
            fs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the normalized document at `path`.
    ///
    /// Results are cached per path unless `force_fresh` is set or the
    /// cache was cleared. A missing or malformed sidecar reads as an empty
    /// document — the sidecar is optional decoration, not required state.
    pub async fn load(&self, path: &Path, force_fresh: bool) -> AnnotationsDoc {
        if !force_fresh {
            if let Some(doc) = self.lock().get(path).cloned() {
                return doc;
            }
        }
        let doc = match self.fs.read_to_string(path).await {
            Ok(text) => match serde_json::from_str::<AnnotationsDoc>(&text) {
                Ok(mut doc) => {
                    doc.normalize();
                    doc
                }
                Err(err) => treat_parse_failure_as_absent(path, &err),
            },
            Err(FsError::NotFound(_)) => AnnotationsDoc::default(),
            Err(err) => {
                warn!(path = %path.display(), %err, "annotations read failed; treating as absent");
                AnnotationsDoc::default()
            }
        };
        self.lock().insert(path.to_path_buf(), doc.clone());
        doc
    }

    /// Serializes and writes the full document, then updates the cache.
    ///
    /// Deprecated fields are stripped structurally: they are marked
    /// skip-on-serialize in [`AnnotationsDoc`].
    pub async fn save(&self, path: &Path, doc: &AnnotationsDoc) -> Result<(), AnnotationsError> {
        let text = serde_json::to_string_pretty(doc)?;
        self.fs.write(path, &text).await?;
        self.lock().insert(path.to_path_buf(), doc.clone());
        Ok(())
    }

    /// Atomic read-current → apply-`mutator` → write-result cycle.
    ///
    /// This is the only sanctioned path for partial updates: it always
    /// re-reads the backing store first, so a caller holding a stale copy
    /// cannot clobber changes committed since it last loaded. The write is
    /// skipped when the mutator leaves the document unchanged, so a no-op
    /// update never materializes a sidecar file.
    ///
    /// Returns the document as written.
    pub async fn modify<F>(&self, path: &Path, mutator: F) -> Result<AnnotationsDoc, AnnotationsError>
    where
        F: FnOnce(&mut AnnotationsDoc),
    {
        let before = self.load(path, true).await;
        let mut doc = before.clone();
        mutator(&mut doc);
        if doc != before {
            self.save(path, &doc).await?;
        }
        Ok(doc)
    }

    /// Drops every cached document; the next load hits the backing store.
    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, AnnotationsDoc>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Named downgrade policy for unreadable sidecar content.
///
/// A sidecar that fails to parse is treated exactly like a sidecar that
/// does not exist. The next save overwrites it with well-formed content.
fn treat_parse_failure_as_absent(path: &Path, err: &serde_json::Error) -> AnnotationsDoc {
    warn!(path = %path.display(), %err, "malformed annotations sidecar; treating as absent");
    AnnotationsDoc::default()
}
