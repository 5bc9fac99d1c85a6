use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proxy::{GateError, ProcessError};
use crate::render::RenderError;
use crate::store::StoreError;
use crate::sync::SyncError;

/// Outcome reported to callers of every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    /// True only when the proxy was reloaded onto a new configuration.
    pub live_config_changed: bool,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>, live_config_changed: bool) -> Self {
        Self {
            success: true,
            message: message.into(),
            live_config_changed,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            live_config_changed: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to read records: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("failed to write fragments: {0}")]
    Sync(#[from] SyncError),

    /// Raw diagnostic from the proxy's config test.
    #[error("configuration rejected: {0}")]
    Rejected(String),

    #[error("configuration test failed: {0}")]
    Test(ProcessError),

    #[error("reload failed: {0}")]
    Reload(ProcessError),
}

impl From<GateError> for ApplyError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Rejected(diagnostic) => ApplyError::Rejected(diagnostic),
            GateError::Process(e) => ApplyError::Test(e),
        }
    }
}

impl ApplyError {
    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            ApplyError::Store(_) => "store_error",
            ApplyError::Render(_) => "integrity_error",
            ApplyError::Sync(_) => "filesystem_error",
            ApplyError::Rejected(_) => "rejected",
            ApplyError::Test(_) => "test_error",
            ApplyError::Reload(_) => "reload_error",
        }
    }
}

impl From<ApplyError> for OperationResult {
    fn from(err: ApplyError) -> Self {
        OperationResult::failed(err.to_string())
    }
}
