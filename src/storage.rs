use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use axum::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::repo_types::User;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("users file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("users file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode users: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
    #[error("no user id left after {0}")]
    IdOverflow(u64),
}

/// Whole-collection persistence for user records.
///
/// There is no partial update: callers load everything, mutate the vector and
/// save it back.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<User>, StorageError>;
    async fn save_all(&self, users: &[User]) -> Result<(), StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct UsersDocument {
    users: Vec<User>,
}

/// Stores the collection as a single pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

/// Writes `body` to a uniquely named temp file beside `path`, then moves it
/// into place. With `replace == false` an existing target is left alone and
/// the move fails with `AlreadyExists`.
fn write_document(path: &Path, body: &[u8], replace: bool) -> Result<(), StorageError> {
    let io = |source: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".users-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io)?;
    tmp.write_all(body).map_err(io)?;
    tmp.as_file().sync_all().map_err(io)?;
    if replace {
        tmp.persist(path).map_err(|e| io(e.error))?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| io(e.error))?;
    }
    Ok(())
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn write(&self, users: &[User], replace: bool) -> Result<(), StorageError> {
        let doc = UsersDocument {
            users: users.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&doc).map_err(StorageError::Encode)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_document(&path, &body, replace))
            .await
            .map_err(StorageError::Task)?
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<User>, StorageError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Never clobber: another writer may have created it meanwhile.
                match self.write(&[], false).await {
                    Ok(()) => {
                        info!(path = %self.path.display(), "users file missing; created empty collection");
                        return Ok(Vec::new());
                    }
                    Err(StorageError::Io { source, .. })
                        if source.kind() == ErrorKind::AlreadyExists =>
                    {
                        tokio::fs::read(&self.path)
                            .await
                            .map_err(|e| self.io_err(e))?
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(self.io_err(e)),
        };
        let doc: UsersDocument =
            serde_json::from_slice(&raw).map_err(|source| StorageError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!(count = doc.users.len(), "users loaded");
        Ok(doc.users)
    }

    async fn save_all(&self, users: &[User]) -> Result<(), StorageError> {
        self.write(users, true).await?;
        debug!(count = users.len(), "users saved");
        Ok(())
    }
}
