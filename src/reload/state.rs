use std::fmt;

use serde::Serialize;

use crate::model::RecordId;

/// Coordinator phase. `Failed` is transient: the pass reports and returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Idle,
    Syncing,
    Validating,
    Reloading,
    Failed,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassState::Idle => "idle",
            PassState::Syncing => "syncing",
            PassState::Validating => "validating",
            PassState::Reloading => "reloading",
            PassState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What caused a reload pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Site(RecordId),
    Upstream(RecordId),
    Redirection(RecordId),
    AccessList(RecordId),
    Certificate(String),
    MainConfig,
    /// Startup, SIGHUP, store file edits, operator requests.
    External(&'static str),
}

impl Trigger {
    /// Low-cardinality label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Site(_) => "site",
            Trigger::Upstream(_) => "upstream",
            Trigger::Redirection(_) => "redirection",
            Trigger::AccessList(_) => "access_list",
            Trigger::Certificate(_) => "certificate",
            Trigger::MainConfig => "main_config",
            Trigger::External(source) => source,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Site(id) => write!(f, "site {}", id),
            Trigger::Upstream(id) => write!(f, "upstream {}", id),
            Trigger::Redirection(id) => write!(f, "redirection {}", id),
            Trigger::AccessList(id) => write!(f, "access list {}", id),
            Trigger::Certificate(domain) => write!(f, "certificate {}", domain),
            Trigger::MainConfig => f.write_str("main config"),
            Trigger::External(source) => f.write_str(source),
        }
    }
}

/// Record of the most recent finished pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub pass_id: uuid::Uuid,
    pub trigger: String,
    pub success: bool,
    pub message: String,
    pub files_written: usize,
    pub files_deleted: usize,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}
