// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem port and adapters for Netloom hosts.
//!
//! Everything above this crate talks to storage through [`FsPort`]; the
//! concrete adapter is chosen at the composition root. [`TxFs`] wraps any
//! adapter with begin/commit/rollback write buffering so multi-file
//! mutations land atomically or not at all.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

mod disk;
mod mem;
mod tx;

pub use disk::TokioFs;
pub use mem::MemFs;
pub use tx::TxFs;

/// Errors emitted by filesystem adapters and the transactional wrapper.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path does not exist in the backing store.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// `begin` was called while a transaction was already open.
    #[error("transaction already active")]
    TransactionActive,
    /// `commit`/`rollback` was called with no open transaction.
    #[error("no active transaction")]
    NoTransaction,
}

/// Async storage port for topology and annotation documents.
///
/// One implementation per host environment. All paths are treated as
/// opaque keys; adapters may or may not map them onto a real filesystem.
#[async_trait]
pub trait FsPort: Send + Sync {
    /// Reads the full contents of `path` as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] when the path is absent.
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError>;

    /// Writes `contents` to `path`, creating or replacing it.
    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError>;

    /// Reports whether `path` currently exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Removes `path`.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] when the path is absent.
    async fn unlink(&self, path: &Path) -> Result<(), FsError>;

    /// Returns the final path component as text.
    ///
    /// Adapters for hosts with unusual path schemes may override this.
    fn basename(&self, path: &Path) -> String {
        path.file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
    }
}
