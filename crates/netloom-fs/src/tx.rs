// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transactional write buffering over any [`FsPort`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{FsError, FsPort};

/// One buffered mutation, in issue order.
#[derive(Debug, Clone)]
enum Staged {
    Write(String),
    Unlink,
}

#[derive(Debug, Default)]
struct TxBuffer {
    /// Mutations in the order they were issued; committed in this order.
    ops: Vec<(PathBuf, Staged)>,
    /// Latest staged state per path, consulted by reads.
    latest: HashMap<PathBuf, Staged>,
}

/// Transactional wrapper around a backing [`FsPort`].
///
/// While a transaction is open, writes and unlinks are buffered instead of
/// applied, and reads transparently observe the buffered state so
/// in-transaction logic sees its own pending changes. `commit` flushes the
/// buffer to the backing store in issue order; `rollback` discards it.
///
/// # Invariants
/// - At most one transaction is open at a time; [`TxFs::begin`] fails with
///   [`FsError::TransactionActive`] otherwise.
/// - A commit error leaves the buffer intact. Callers must treat any commit
///   error as a total rollback of the attempt and call [`TxFs::rollback`];
///   the backing store may have absorbed a prefix of the buffer, which the
///   next committed state overwrites wholesale.
/// - Outside a transaction every operation passes straight through.
pub struct TxFs {
    inner: Arc<dyn FsPort>,
    tx: Mutex<Option<TxBuffer>>,
}

impl TxFs {
    /// Wraps `inner` with transactional buffering.
    #[must_use]
    pub fn new(inner: Arc<dyn FsPort>) -> Self {
        Self {
            inner,
            tx: Mutex::new(None),
        }
    }

    /// Opens a buffering scope.
    ///
    /// # Errors
    /// Returns [`FsError::TransactionActive`] if one is already open.
    pub fn begin(&self) -> Result<(), FsError> {
        let mut tx = self.lock();
        if tx.is_some() {
            return Err(FsError::TransactionActive);
        }
        *tx = Some(TxBuffer::default());
        Ok(())
    }

    /// Flushes all buffered mutations to the backing store in issue order,
    /// then clears the buffer.
    ///
    /// # Errors
    /// Returns [`FsError::NoTransaction`] when no transaction is open. Any
    /// flush failure is returned with the buffer retained; see the type-level
    /// contract for the required caller response.
    pub async fn commit(&self) -> Result<(), FsError> {
        let ops = {
            let tx = self.lock();
            let Some(buffer) = tx.as_ref() else {
                return Err(FsError::NoTransaction);
            };
            buffer.ops.clone()
        };
        for (path, op) in ops {
            match op {
                Staged::Write(contents) => self.inner.write(&path, &contents).await?,
                Staged::Unlink => match self.inner.unlink(&path).await {
                    // Unlinking an already-absent path is a successful delete.
                    Ok(()) | Err(FsError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                },
            }
        }
        *self.lock() = None;
        Ok(())
    }

    /// Discards the buffer without touching the backing store.
    ///
    /// # Errors
    /// Returns [`FsError::NoTransaction`] when no transaction is open.
    pub fn rollback(&self) -> Result<(), FsError> {
        let mut tx = self.lock();
        if tx.is_none() {
            return Err(FsError::NoTransaction);
        }
        *tx = None;
        Ok(())
    }

    /// Reports whether a transaction is currently open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<TxBuffer>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the staged state for `path`, if any. The guard is released
    /// before any await point.
    fn staged(&self, path: &Path) -> Option<Staged> {
        self.lock()
            .as_ref()
            .and_then(|buffer| buffer.latest.get(path).cloned())
    }

    /// Buffers `op` if a transaction is open; reports whether it did.
    fn stage(&self, path: &Path, op: Staged) -> bool {
        let mut tx = self.lock();
        let Some(buffer) = tx.as_mut() else {
            return false;
        };
        buffer.ops.push((path.to_path_buf(), op.clone()));
        buffer.latest.insert(path.to_path_buf(), op);
        true
    }
}

#[async_trait]
impl FsPort for TxFs {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        match self.staged(path) {
            Some(Staged::Write(contents)) => Ok(contents),
            Some(Staged::Unlink) => Err(FsError::NotFound(path.to_path_buf())),
            None => self.inner.read_to_string(path).await,
        }
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError> {
        if self.stage(path, Staged::Write(contents.to_owned())) {
            return Ok(());
        }
        self.inner.write(path, contents).await
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.staged(path) {
            Some(Staged::Write(_)) => true,
            Some(Staged::Unlink) => false,
            None => self.inner.exists(path).await,
        }
    }

    async fn unlink(&self, path: &Path) -> Result<(), FsError> {
        if self.stage(path, Staged::Unlink) {
            return Ok(());
        }
        self.inner.unlink(path).await
    }

    fn basename(&self, path: &Path) -> String {
        self.inner.basename(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemFs;

    fn fixture() -> (Arc<MemFs>, TxFs) {
        let mem = Arc::new(MemFs::new());
        mem.seed("lab.clab.yml", "name: lab\n");
        let tx = TxFs::new(mem.clone());
        (mem, tx)
    }

    #[tokio::test]
    async fn passes_through_outside_a_transaction() {
        let (mem, tx) = fixture();
        assert!(tx.write(Path::new("other.yml"), "name: other\n").await.is_ok());
        assert_eq!(mem.contents(Path::new("other.yml")).as_deref(), Some("name: other\n"));
    }

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let (_mem, tx) = fixture();
        assert!(tx.begin().is_ok());
        assert!(matches!(tx.begin(), Err(FsError::TransactionActive)));
    }

    #[tokio::test]
    async fn buffered_writes_are_visible_inside_but_not_outside() {
        let (mem, tx) = fixture();
        assert!(tx.begin().is_ok());
        assert!(tx.write(Path::new("lab.clab.yml"), "name: edited\n").await.is_ok());

        let inside = tx.read_to_string(Path::new("lab.clab.yml")).await;
        assert!(matches!(inside, Ok(text) if text == "name: edited\n"));
        assert_eq!(mem.contents(Path::new("lab.clab.yml")).as_deref(), Some("name: lab\n"));
    }

    #[tokio::test]
    async fn buffered_unlink_hides_the_path() {
        let (mem, tx) = fixture();
        assert!(tx.begin().is_ok());
        assert!(tx.unlink(Path::new("lab.clab.yml")).await.is_ok());

        assert!(!tx.exists(Path::new("lab.clab.yml")).await);
        let read = tx.read_to_string(Path::new("lab.clab.yml")).await;
        assert!(matches!(read, Err(FsError::NotFound(_))));
        assert!(mem.contents(Path::new("lab.clab.yml")).is_some());
    }

    #[tokio::test]
    async fn rollback_discards_the_buffer() {
        let (mem, tx) = fixture();
        assert!(tx.begin().is_ok());
        assert!(tx.write(Path::new("lab.clab.yml"), "name: edited\n").await.is_ok());
        assert!(tx.rollback().is_ok());

        let read = tx.read_to_string(Path::new("lab.clab.yml")).await;
        assert!(matches!(read, Ok(text) if text == "name: lab\n"));
        assert_eq!(mem.contents(Path::new("lab.clab.yml")).as_deref(), Some("name: lab\n"));
        assert!(!tx.in_transaction());
    }

    #[tokio::test]
    async fn commit_flushes_in_issue_order() {
        let (mem, tx) = fixture();
        assert!(tx.begin().is_ok());
        assert!(tx.write(Path::new("a.yml"), "first\n").await.is_ok());
        assert!(tx.write(Path::new("a.yml"), "second\n").await.is_ok());
        assert!(tx.unlink(Path::new("lab.clab.yml")).await.is_ok());
        assert!(tx.commit().await.is_ok());

        assert_eq!(mem.contents(Path::new("a.yml")).as_deref(), Some("second\n"));
        assert!(mem.contents(Path::new("lab.clab.yml")).is_none());
        assert!(!tx.in_transaction());
    }

    #[tokio::test]
    async fn commit_of_staged_unlink_for_absent_path_succeeds() {
        let (_mem, tx) = fixture();
        assert!(tx.begin().is_ok());
        assert!(tx.unlink(Path::new("never-existed.json")).await.is_ok());
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn commit_without_transaction_is_rejected() {
        let (_mem, tx) = fixture();
        let commit = tx.commit().await;
        assert!(matches!(commit, Err(FsError::NoTransaction)));
        assert!(matches!(tx.rollback(), Err(FsError::NoTransaction)));
    }
}
