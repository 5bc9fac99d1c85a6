//! Filesystem sync engine.
//!
//! # Responsibilities
//! - Make the managed subset of the fragment directory match a rendered set
//! - Leave unmanaged files (`default.conf`, certificate fragments, hand-authored
//!   files) alone
//! - Capture and restore file bytes so a rejected pass leaves no trace
//!
//! # Data Flow
//! ```text
//! Fragments ──► write upstream-*.conf ──► write site-*/redirect-*.conf
//!           ──► delete orphan site-*/redirect-*.conf ──► delete orphan upstream-*.conf
//! ```
//!
//! # Design Decisions
//! - Pools are written first and deleted last, so a reload between any two steps
//!   never sees a site pointing at a missing pool
//! - Unchanged files are not rewritten; an idempotent pass touches nothing
//! - Writes go to `.{name}.tmp` and are renamed into place
//! - An I/O error stops the pass where it is; the caller restores from a snapshot

mod snapshot;

pub use snapshot::FileSnapshot;

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::render::{is_managed_file_name, FragmentKind, Fragments};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub(crate) fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| SyncError::Io {
            action,
            path,
            source,
        }
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        !self.written.is_empty() || !self.deleted.is_empty()
    }
}

/// Names of the managed `.conf` files currently in `dir`.
pub async fn managed_files(dir: &Path) -> Result<BTreeSet<String>, SyncError> {
    let mut names = BTreeSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(SyncError::io("list", dir)(e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(SyncError::io("list", dir))?
    {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_managed_file_name(&name) {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Bring the managed files in `dir` in line with `fragments`.
pub async fn sync(fragments: &Fragments, dir: &Path) -> Result<SyncReport, SyncError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(SyncError::io("create", dir))?;

    let existing = managed_files(dir).await?;
    let desired: BTreeSet<String> = fragments.keys().map(|k| k.file_name()).collect();
    let mut report = SyncReport::default();

    // BTreeMap order puts upstreams first.
    for (key, text) in fragments {
        let name = key.file_name();
        if write_if_changed(dir, &name, text.as_bytes()).await? {
            report.written.push(name);
        } else {
            report.unchanged += 1;
        }
    }

    let (pool_orphans, other_orphans): (Vec<_>, Vec<_>) = existing
        .difference(&desired)
        .cloned()
        .partition(|name| name.starts_with(FragmentKind::Upstream.prefix()));

    for name in other_orphans.into_iter().chain(pool_orphans) {
        remove_if_present(dir, &name).await?;
        report.deleted.push(name);
    }

    debug!(
        written = report.written.len(),
        deleted = report.deleted.len(),
        unchanged = report.unchanged,
        "Fragment directory synced"
    );
    Ok(report)
}

/// Returns `false` when the file already holds `contents`.
pub(crate) async fn write_if_changed(
    dir: &Path,
    name: &str,
    contents: &[u8],
) -> Result<bool, SyncError> {
    let path = dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(current) if current == contents => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::io("read", &path)(e)),
    }
    write_atomic(dir, name, contents).await?;
    Ok(true)
}

pub(crate) async fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> Result<(), SyncError> {
    let path = dir.join(name);
    let tmp = dir.join(format!(".{}.tmp", name));
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(SyncError::io("write", &tmp))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(SyncError::io("rename", &path))?;
    Ok(())
}

/// Returns `false` when there was nothing to remove.
pub(crate) async fn remove_if_present(dir: &Path, name: &str) -> Result<bool, SyncError> {
    let path = dir.join(name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::io("remove", &path)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FragmentKey;

    fn fragments(entries: &[(FragmentKey, &str)]) -> Fragments {
        entries
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_writes_then_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let set = fragments(&[
            (FragmentKey::upstream(1), "upstream api {}\n"),
            (FragmentKey::site(2), "server {}\n"),
        ]);

        let first = sync(&set, dir.path()).await.unwrap();
        assert_eq!(first.written, vec!["upstream-1.conf", "site-2.conf"]);
        assert!(first.changed());

        let second = sync(&set, dir.path()).await.unwrap();
        assert!(!second.changed());
        assert_eq!(second.unchanged, 2);
    }

    #[tokio::test]
    async fn test_orphans_removed_unmanaged_kept() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "site-9.conf",
            "site-legacy.conf",
            "upstream-4.conf",
            "default.conf",
            "acme-a.example.com.conf",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let set = fragments(&[(FragmentKey::redirect(1), "server {}\n")]);
        let report = sync(&set, dir.path()).await.unwrap();

        // Sites and redirects go before pools.
        assert_eq!(
            report.deleted,
            vec!["site-9.conf", "site-legacy.conf", "upstream-4.conf"]
        );
        assert!(dir.path().join("default.conf").exists());
        assert!(dir.path().join("acme-a.example.com.conf").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("redirect-1.conf").exists());
    }

    #[tokio::test]
    async fn test_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let set = fragments(&[(FragmentKey::site(1), "a\n")]);
        sync(&set, dir.path()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["site-1.conf"]);
    }

    #[tokio::test]
    async fn test_missing_directory_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("conf.d");
        let set = fragments(&[(FragmentKey::site(1), "a\n")]);
        sync(&set, &nested).await.unwrap();
        assert!(nested.join("site-1.conf").exists());
    }
}
