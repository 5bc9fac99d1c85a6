//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! manager.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Record store file (JSON):
//!     watcher.rs detects change
//!     → MemoryStore::reload_from_disk
//!     → ReloadCoordinator::render_and_apply
//! ```
//!
//! # Design Decisions
//! - Manager config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AcmeConfig, AdminConfig, LogFormat, ManagerConfig, ObservabilityConfig, PathsConfig,
    ProxyCommandConfig, RenderConfig,
};
