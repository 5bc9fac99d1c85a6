//! In-process record store with optional JSON persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::model::{
    AccessList, Certificate, RecordId, Redirection, Site, Snapshot, Upstream,
};
use crate::store::{RecordStore, StoreError, StoreResult};

/// Every table plus the id sequence; this is also the on-disk JSON layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Tables {
    next_id: RecordId,
    sites: BTreeMap<RecordId, Site>,
    upstreams: BTreeMap<RecordId, Upstream>,
    redirections: BTreeMap<RecordId, Redirection>,
    access_lists: BTreeMap<RecordId, AccessList>,
    certificates: BTreeMap<RecordId, Certificate>,
}

impl Tables {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn assign_server_ids(&mut self, upstream: &mut Upstream) {
        let upstream_id = upstream.id;
        for server in &mut upstream.servers {
            self.next_id += 1;
            server.id = self.next_id;
            server.upstream_ref = upstream_id;
        }
    }
}

/// Thread-safe store backed by `BTreeMap`s, saved to `persistence_path` after
/// every mutation when one is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    persistence_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path` if it exists; later mutations are written back to it.
    pub fn load_from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let tables: Tables = serde_json::from_slice(&fs::read(&path)?)?;
            tracing::info!(
                path = ?path,
                sites = tables.sites.len(),
                upstreams = tables.upstreams.len(),
                redirections = tables.redirections.len(),
                certificates = tables.certificates.len(),
                "Loaded record store"
            );
            tables
        } else {
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            persistence_path: Some(path),
        })
    }

    pub fn persistence_path(&self) -> Option<&Path> {
        self.persistence_path.as_deref()
    }

    /// Re-read the backing file. Returns true when its content differed from
    /// the in-memory tables, i.e. the file was edited externally.
    ///
    /// The file is read under the write lock so a save that lands between the
    /// read and the swap cannot be overwritten with older content.
    pub async fn reload_from_disk(&self) -> StoreResult<bool> {
        let Some(path) = &self.persistence_path else {
            return Ok(false);
        };

        let mut tables = self.tables.write().await;
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let loaded: Tables = serde_json::from_slice(&content)?;
        if *tables == loaded {
            return Ok(false);
        }
        *tables = loaded;
        tracing::info!(path = ?path, "Record store reloaded from disk");
        Ok(true)
    }

    /// Apply `change` to a copy of the tables, persist the copy, then publish
    /// it. A rejected change or a failed save leaves memory untouched.
    async fn commit<T, F>(&self, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Tables) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let out = change(&mut next)?;
        self.save(&next).await?;
        *tables = next;
        Ok(out)
    }

    async fn save(&self, tables: &Tables) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(tables)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn not_found(kind: &'static str, id: RecordId) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn conflict(what: &str, key: &str) -> StoreError {
    StoreError::Conflict(format!("{} {} already exists", what, key))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn snapshot(&self) -> StoreResult<Snapshot> {
        let tables = self.tables.read().await;
        Ok(Snapshot {
            sites: tables.sites.values().cloned().collect(),
            upstreams: tables.upstreams.values().cloned().collect(),
            redirections: tables.redirections.values().cloned().collect(),
            access_lists: tables.access_lists.values().cloned().collect(),
        })
    }

    // --- Sites ---

    async fn list_sites(&self) -> StoreResult<Vec<Site>> {
        Ok(self.tables.read().await.sites.values().cloned().collect())
    }

    async fn get_site(&self, id: RecordId) -> StoreResult<Option<Site>> {
        Ok(self.tables.read().await.sites.get(&id).cloned())
    }

    async fn create_site(&self, mut site: Site) -> StoreResult<Site> {
        site.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if tables.sites.values().any(|s| s.domain == site.domain) {
                return Err(conflict("a site for", &site.domain));
            }
            site.id = tables.allocate();
            tables.sites.insert(site.id, site.clone());
            Ok(site)
        })
        .await
    }

    async fn update_site(&self, id: RecordId, mut site: Site) -> StoreResult<Site> {
        site.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if !tables.sites.contains_key(&id) {
                return Err(not_found("site", id));
            }
            if tables
                .sites
                .values()
                .any(|s| s.id != id && s.domain == site.domain)
            {
                return Err(conflict("a site for", &site.domain));
            }
            site.id = id;
            tables.sites.insert(id, site.clone());
            Ok(site)
        })
        .await
    }

    async fn delete_site(&self, id: RecordId) -> StoreResult<()> {
        self.commit(move |tables| {
            tables.sites.remove(&id).ok_or_else(|| not_found("site", id))?;
            Ok(())
        })
        .await
    }

    // --- Upstreams ---

    async fn list_upstreams(&self) -> StoreResult<Vec<Upstream>> {
        Ok(self.tables.read().await.upstreams.values().cloned().collect())
    }

    async fn get_upstream(&self, id: RecordId) -> StoreResult<Option<Upstream>> {
        Ok(self.tables.read().await.upstreams.get(&id).cloned())
    }

    async fn create_upstream(&self, mut upstream: Upstream) -> StoreResult<Upstream> {
        upstream.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if tables.upstreams.values().any(|u| u.name == upstream.name) {
                return Err(conflict("upstream", &upstream.name));
            }
            upstream.id = tables.allocate();
            tables.assign_server_ids(&mut upstream);
            tables.upstreams.insert(upstream.id, upstream.clone());
            Ok(upstream)
        })
        .await
    }

    async fn update_upstream(&self, id: RecordId, mut upstream: Upstream) -> StoreResult<Upstream> {
        upstream.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if !tables.upstreams.contains_key(&id) {
                return Err(not_found("upstream", id));
            }
            if tables
                .upstreams
                .values()
                .any(|u| u.id != id && u.name == upstream.name)
            {
                return Err(conflict("upstream", &upstream.name));
            }
            // Server list is replaced wholesale, matching delete-then-recreate semantics.
            upstream.id = id;
            tables.assign_server_ids(&mut upstream);
            tables.upstreams.insert(id, upstream.clone());
            Ok(upstream)
        })
        .await
    }

    async fn delete_upstream(&self, id: RecordId) -> StoreResult<()> {
        self.commit(move |tables| {
            tables
                .upstreams
                .remove(&id)
                .ok_or_else(|| not_found("upstream", id))?;
            Ok(())
        })
        .await
    }

    // --- Redirections ---

    async fn list_redirections(&self) -> StoreResult<Vec<Redirection>> {
        Ok(self.tables.read().await.redirections.values().cloned().collect())
    }

    async fn get_redirection(&self, id: RecordId) -> StoreResult<Option<Redirection>> {
        Ok(self.tables.read().await.redirections.get(&id).cloned())
    }

    async fn create_redirection(&self, mut redirection: Redirection) -> StoreResult<Redirection> {
        redirection.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if tables
                .redirections
                .values()
                .any(|r| r.domain == redirection.domain)
            {
                return Err(conflict("a redirection for", &redirection.domain));
            }
            redirection.id = tables.allocate();
            tables.redirections.insert(redirection.id, redirection.clone());
            Ok(redirection)
        })
        .await
    }

    async fn update_redirection(
        &self,
        id: RecordId,
        mut redirection: Redirection,
    ) -> StoreResult<Redirection> {
        redirection.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if !tables.redirections.contains_key(&id) {
                return Err(not_found("redirection", id));
            }
            if tables
                .redirections
                .values()
                .any(|r| r.id != id && r.domain == redirection.domain)
            {
                return Err(conflict("a redirection for", &redirection.domain));
            }
            redirection.id = id;
            tables.redirections.insert(id, redirection.clone());
            Ok(redirection)
        })
        .await
    }

    async fn delete_redirection(&self, id: RecordId) -> StoreResult<()> {
        self.commit(move |tables| {
            tables
                .redirections
                .remove(&id)
                .ok_or_else(|| not_found("redirection", id))?;
            Ok(())
        })
        .await
    }

    // --- Access lists ---

    async fn list_access_lists(&self) -> StoreResult<Vec<AccessList>> {
        Ok(self.tables.read().await.access_lists.values().cloned().collect())
    }

    async fn get_access_list(&self, id: RecordId) -> StoreResult<Option<AccessList>> {
        Ok(self.tables.read().await.access_lists.get(&id).cloned())
    }

    async fn create_access_list(&self, mut list: AccessList) -> StoreResult<AccessList> {
        list.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            list.id = tables.allocate();
            tables.access_lists.insert(list.id, list.clone());
            Ok(list)
        })
        .await
    }

    async fn update_access_list(&self, id: RecordId, mut list: AccessList) -> StoreResult<AccessList> {
        list.validate().map_err(StoreError::Invalid)?;
        self.commit(move |tables| {
            if !tables.access_lists.contains_key(&id) {
                return Err(not_found("access list", id));
            }
            list.id = id;
            tables.access_lists.insert(id, list.clone());
            Ok(list)
        })
        .await
    }

    async fn delete_access_list(&self, id: RecordId) -> StoreResult<()> {
        self.commit(move |tables| {
            tables
                .access_lists
                .remove(&id)
                .ok_or_else(|| not_found("access list", id))?;
            Ok(())
        })
        .await
    }

    // --- Certificates ---

    async fn list_certificates(&self) -> StoreResult<Vec<Certificate>> {
        Ok(self.tables.read().await.certificates.values().cloned().collect())
    }

    async fn get_certificate_by_domain(&self, domain: &str) -> StoreResult<Option<Certificate>> {
        Ok(self
            .tables
            .read()
            .await
            .certificates
            .values()
            .find(|c| c.domain == domain)
            .cloned())
    }

    async fn create_certificate(&self, mut certificate: Certificate) -> StoreResult<Certificate> {
        self.commit(move |tables| {
            if tables
                .certificates
                .values()
                .any(|c| c.domain == certificate.domain)
            {
                return Err(conflict("a certificate for", &certificate.domain));
            }
            certificate.id = tables.allocate();
            tables.certificates.insert(certificate.id, certificate.clone());
            Ok(certificate)
        })
        .await
    }

    async fn update_certificate(&self, certificate: Certificate) -> StoreResult<Certificate> {
        self.commit(move |tables| {
            if !tables.certificates.contains_key(&certificate.id) {
                return Err(not_found("certificate", certificate.id));
            }
            tables.certificates.insert(certificate.id, certificate.clone());
            Ok(certificate)
        })
        .await
    }

    async fn delete_certificate(&self, id: RecordId) -> StoreResult<()> {
        self.commit(move |tables| {
            tables
                .certificates
                .remove(&id)
                .ok_or_else(|| not_found("certificate", id))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BalancingMethod, UpstreamServer};

    #[tokio::test]
    async fn test_ids_and_domain_uniqueness() {
        let store = MemoryStore::new();
        let mut site = Site::new("api", "api.example.com");
        site.target_url = Some("http://10.0.0.1:8080".into());

        let created = store.create_site(site.clone()).await.unwrap();
        assert!(created.id > 0);

        let err = store.create_site(site).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upstream_servers_follow_owner() {
        let store = MemoryStore::new();
        let upstream = Upstream::new("api", BalancingMethod::RoundRobin)
            .with_server(UpstreamServer::new("10.0.0.1:8080"))
            .with_server(UpstreamServer::new("10.0.0.2:8080"));

        let created = store.create_upstream(upstream).await.unwrap();
        assert!(created.servers.iter().all(|s| s.upstream_ref == created.id));
        assert_ne!(created.servers[0].id, created.servers[1].id);

        store.delete_upstream(created.id).await.unwrap();
        assert!(store.get_upstream(created.id).await.unwrap().is_none());
        assert!(store.snapshot().await.unwrap().upstreams.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_record_rejected() {
        let store = MemoryStore::new();
        let upstream = Upstream::new("", BalancingMethod::Hash);
        let err = store.create_upstream(upstream).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ref errors) if errors.len() == 2));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = MemoryStore::load_from_file(&path).unwrap();
        let redirection = Redirection::new("old", "old.example.com", "https://new.example.com");
        let created = store.create_redirection(redirection).await.unwrap();

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        let found = loaded.get_redirection(created.id).await.unwrap().unwrap();
        assert_eq!(found.domain, "old.example.com");

        // Ids keep increasing after a reload.
        let next = loaded
            .create_redirection(Redirection::new("b", "b.example.com", "https://c.example.com"))
            .await
            .unwrap();
        assert!(next.id > created.id);
    }

    #[tokio::test]
    async fn test_reload_detects_external_edit_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = MemoryStore::load_from_file(&path).unwrap();
        store
            .create_redirection(Redirection::new("a", "a.example.com", "https://b.example.com"))
            .await
            .unwrap();

        // Our own write is not a change.
        assert!(!store.reload_from_disk().await.unwrap());

        let other = MemoryStore::load_from_file(&path).unwrap();
        other
            .create_redirection(Redirection::new("c", "c.example.com", "https://d.example.com"))
            .await
            .unwrap();

        assert!(store.reload_from_disk().await.unwrap());
        assert_eq!(store.list_redirections().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the store's parent directory should be.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let store = MemoryStore::load_from_file(blocker.join("records.json")).unwrap();

        let err = store
            .create_redirection(Redirection::new("a", "a.example.com", "https://b.example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.list_redirections().await.unwrap().is_empty());
        assert_eq!(store.tables.read().await.next_id, 0);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_record_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = MemoryStore::load_from_file(&path).unwrap();
        let created = store
            .create_redirection(Redirection::new("a", "a.example.com", "https://b.example.com"))
            .await
            .unwrap();

        // Occupy the temp-file slot with a directory so the next write fails.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let mut changed = created.clone();
        changed.target_url = "https://c.example.com".into();
        assert!(store.update_redirection(created.id, changed).await.is_err());
        assert!(store.delete_redirection(created.id).await.is_err());

        let kept = store.get_redirection(created.id).await.unwrap().unwrap();
        assert_eq!(kept.target_url, "https://b.example.com");
    }

    #[tokio::test]
    async fn test_reload_keeps_records_saved_after_earlier_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = std::sync::Arc::new(MemoryStore::load_from_file(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let domain = format!("r{}.example.com", i);
                store
                    .create_redirection(Redirection::new(&domain, &domain, "https://x.example.com"))
                    .await
                    .unwrap();
                store.reload_from_disk().await.unwrap()
            }));
        }
        for handle in handles {
            // Every file state was produced by this store, so no reload sees an external edit.
            assert!(!handle.await.unwrap());
        }

        assert_eq!(store.list_redirections().await.unwrap().len(), 10);
        let on_disk = MemoryStore::load_from_file(&path).unwrap();
        assert_eq!(on_disk.list_redirections().await.unwrap().len(), 10);
    }
}
