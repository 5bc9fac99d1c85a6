//! Validation gate: nothing is reloaded unless the proxy accepts the tree.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::proxy::controller::ProxyController;
use crate::proxy::process::ProcessError;

#[derive(Debug, Error)]
pub enum GateError {
    /// The proxy refused the configuration; the diagnostic is its raw output.
    #[error("configuration rejected: {0}")]
    Rejected(String),

    #[error("configuration test could not run: {0}")]
    Process(#[from] ProcessError),
}

/// Run the config test once against the whole tree in `fragment_dir`.
pub async fn validate(proxy: &dyn ProxyController, fragment_dir: &Path) -> Result<(), GateError> {
    let output = proxy.config_test(fragment_dir).await?;
    if output.success() {
        debug!("Configuration test passed");
        return Ok(());
    }

    let diagnostic = output.diagnostic().to_string();
    warn!(code = ?output.code, diagnostic = %diagnostic.trim(), "Configuration test failed");
    Err(GateError::Rejected(diagnostic))
}
