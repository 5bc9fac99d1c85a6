//! Reverse proxy configuration manager.
//!
//! Keeps an nginx fragment directory in step with a record store of sites,
//! upstream pools, redirections, access lists and certificates. Every change
//! is rendered, written, tested by the proxy and reloaded as one pass, and
//! rolled back when the proxy rejects it.

// Records and rendering
pub mod model;
pub mod render;
pub mod store;

// Applying configuration
pub mod proxy;
pub mod reload;
pub mod sync;

// Certificates
pub mod certs;

// Surfaces and cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ManagerConfig;
pub use lifecycle::{Manager, Shutdown};
pub use reload::ReloadCoordinator;
