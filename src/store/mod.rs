//! Record store interface.
//!
//! # Data Flow
//! ```text
//! admin API mutation
//!     → RecordStore::create_* / update_* / delete_*
//!     → (memory.rs) validate → uniqueness → assign ids → persist JSON
//!
//! Reload Coordinator pass
//!     → RecordStore::snapshot() (single read lock, every table)
//!     → render
//! ```
//!
//! # Design Decisions
//! - The store is the source of truth; the engine never reads its own rendered
//!   output back as input
//! - Deleting an upstream cascades to its servers but not to referencing sites;
//!   dangling references are rejected at render time
//! - Trait object at the seam so a relational backend can replace `MemoryStore`

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    AccessList, Certificate, FieldError, RecordId, Redirection, Site, Snapshot, Upstream,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid record: {}", join_errors(.0))]
    Invalid(Vec<FieldError>),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations the engine needs from the record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every table, read atomically.
    async fn snapshot(&self) -> StoreResult<Snapshot>;

    async fn list_sites(&self) -> StoreResult<Vec<Site>>;
    async fn get_site(&self, id: RecordId) -> StoreResult<Option<Site>>;
    async fn create_site(&self, site: Site) -> StoreResult<Site>;
    async fn update_site(&self, id: RecordId, site: Site) -> StoreResult<Site>;
    async fn delete_site(&self, id: RecordId) -> StoreResult<()>;

    async fn list_upstreams(&self) -> StoreResult<Vec<Upstream>>;
    async fn get_upstream(&self, id: RecordId) -> StoreResult<Option<Upstream>>;
    async fn create_upstream(&self, upstream: Upstream) -> StoreResult<Upstream>;
    async fn update_upstream(&self, id: RecordId, upstream: Upstream) -> StoreResult<Upstream>;
    /// Removes the upstream together with its servers.
    async fn delete_upstream(&self, id: RecordId) -> StoreResult<()>;

    async fn list_redirections(&self) -> StoreResult<Vec<Redirection>>;
    async fn get_redirection(&self, id: RecordId) -> StoreResult<Option<Redirection>>;
    async fn create_redirection(&self, redirection: Redirection) -> StoreResult<Redirection>;
    async fn update_redirection(
        &self,
        id: RecordId,
        redirection: Redirection,
    ) -> StoreResult<Redirection>;
    async fn delete_redirection(&self, id: RecordId) -> StoreResult<()>;

    async fn list_access_lists(&self) -> StoreResult<Vec<AccessList>>;
    async fn get_access_list(&self, id: RecordId) -> StoreResult<Option<AccessList>>;
    async fn create_access_list(&self, list: AccessList) -> StoreResult<AccessList>;
    async fn update_access_list(&self, id: RecordId, list: AccessList) -> StoreResult<AccessList>;
    async fn delete_access_list(&self, id: RecordId) -> StoreResult<()>;

    async fn list_certificates(&self) -> StoreResult<Vec<Certificate>>;
    async fn get_certificate_by_domain(&self, domain: &str) -> StoreResult<Option<Certificate>>;
    async fn create_certificate(&self, certificate: Certificate) -> StoreResult<Certificate>;
    async fn update_certificate(&self, certificate: Certificate) -> StoreResult<Certificate>;
    async fn delete_certificate(&self, id: RecordId) -> StoreResult<()>;
}
