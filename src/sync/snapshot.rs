use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use super::{remove_if_present, write_atomic, SyncError};

/// Exact bytes (or absence) of a set of files in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    dir: PathBuf,
    files: BTreeMap<String, Option<Vec<u8>>>,
}

impl FileSnapshot {
    pub async fn capture<I, S>(dir: &Path, names: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files = BTreeMap::new();
        for name in names {
            let name = name.into();
            let path = dir.join(&name);
            let contents = match tokio::fs::read(&path).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(SyncError::io("read", &path)(e)),
            };
            files.insert(name, contents);
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Put every captured file back: rewrite the ones that existed, delete
    /// the ones that did not.
    pub async fn restore(&self) -> Result<(), SyncError> {
        if !self.files.is_empty() {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(SyncError::io("create", &self.dir))?;
        }
        for (name, contents) in &self.files {
            match contents {
                Some(bytes) => write_atomic(&self.dir, name, bytes).await?,
                None => {
                    remove_if_present(&self.dir, name).await?;
                }
            }
        }
        Ok(())
    }
}
