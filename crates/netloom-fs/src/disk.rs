// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Real-filesystem [`FsPort`] adapter backed by `tokio::fs`.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;

use crate::{FsError, FsPort};

/// `tokio::fs`-backed adapter used by the host daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFs;

impl TokioFs {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FsPort for TokioFs {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(FsError::NotFound(path.to_path_buf()))
            }
            Err(err) => Err(FsError::Io(err)),
        }
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), FsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn unlink(&self, path: &Path) -> Result<(), FsError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(FsError::NotFound(path.to_path_buf()))
            }
            Err(err) => Err(FsError::Io(err)),
        }
    }
}
