//! Admin API.
//!
//! Every record mutation is persisted first and then applied through the
//! reload coordinator; the response carries the record and the apply result.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::certs::CertificateEngine;
use crate::reload::ReloadCoordinator;
use crate::store::RecordStore;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn RecordStore>,
    pub coordinator: Arc<ReloadCoordinator>,
    pub certificates: Arc<CertificateEngine>,
    pub api_key: Arc<str>,
    /// Body size for sites submitted without one.
    pub default_body_size: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/sites", get(list_sites).post(create_site))
        .route(
            "/admin/sites/{id}",
            get(get_site).put(update_site).delete(delete_site),
        )
        .route("/admin/upstreams", get(list_upstreams).post(create_upstream))
        .route(
            "/admin/upstreams/{id}",
            get(get_upstream).put(update_upstream).delete(delete_upstream),
        )
        .route(
            "/admin/redirections",
            get(list_redirections).post(create_redirection),
        )
        .route(
            "/admin/redirections/{id}",
            get(get_redirection)
                .put(update_redirection)
                .delete(delete_redirection),
        )
        .route(
            "/admin/access-lists",
            get(list_access_lists).post(create_access_list),
        )
        .route(
            "/admin/access-lists/{id}",
            get(get_access_list)
                .put(update_access_list)
                .delete(delete_access_list),
        )
        .route(
            "/admin/certificates",
            get(list_certificates).post(issue_certificate),
        )
        .route("/admin/certificates/renew-all", post(renew_all_certificates))
        .route(
            "/admin/certificates/{domain}",
            get(get_certificate_status).delete(revoke_certificate),
        )
        .route("/admin/certificates/{domain}/renew", post(renew_certificate))
        .route("/admin/proxy/status", get(get_proxy_status))
        .route("/admin/proxy/validate", post(validate_proxy))
        .route("/admin/proxy/reload", post(reload_proxy))
        .route("/admin/proxy/apply", post(apply_records))
        .route("/admin/proxy/config", get(get_main_config).put(put_main_config))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
