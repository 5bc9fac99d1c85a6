use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::admin::error::AdminError;
use crate::admin::AdminState;
use crate::certs::{CertificateStatusReport, RenewAllReport};
use crate::model::{AccessList, Certificate, RecordId, Redirection, Site, Upstream};
use crate::proxy::ProxyStatus;
use crate::reload::{OperationResult, PassState, PassSummary, Trigger};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub state: PassState,
    pub last_pass: Option<PassSummary>,
}

/// A persisted mutation and what applying it did to the proxy.
#[derive(Serialize)]
pub struct Applied<T> {
    pub record: Option<T>,
    pub apply: OperationResult,
}

#[derive(Deserialize)]
pub struct IssueRequest {
    pub domain: String,
    pub email: String,
}

#[derive(Serialize, Deserialize)]
pub struct MainConfig {
    pub content: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        state: state.coordinator.state(),
        last_pass: state.coordinator.last_pass().map(|p| (*p).clone()),
    })
}

fn not_found(kind: &str, id: RecordId) -> AdminError {
    AdminError::NotFound(format!("{} {} not found", kind, id))
}

fn created<T: Serialize>(record: T, apply: OperationResult) -> Response {
    (
        StatusCode::CREATED,
        Json(Applied {
            record: Some(record),
            apply,
        }),
    )
        .into_response()
}

fn parse<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, AdminError> {
    serde_json::from_value(body).map_err(|e| AdminError::Validation(e.to_string(), Vec::new()))
}

/// Sites submitted without a body size get the configured default.
fn site_from_body(state: &AdminState, mut body: Value) -> Result<Site, AdminError> {
    if let Some(fields) = body.as_object_mut() {
        fields
            .entry("client_max_body_size")
            .or_insert_with(|| Value::String(state.default_body_size.to_string()));
    }
    parse(body)
}

// --- Sites ---

pub async fn list_sites(State(state): State<AdminState>) -> Result<Json<Vec<Site>>, AdminError> {
    Ok(Json(state.store.list_sites().await?))
}

pub async fn get_site(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Site>, AdminError> {
    state
        .store
        .get_site(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("site", id))
}

pub async fn create_site(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Response, AdminError> {
    let site = state.store.create_site(site_from_body(&state, body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Site(site.id))
        .await;
    Ok(created(site, apply))
}

pub async fn update_site(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
    Json(body): Json<Value>,
) -> Result<Json<Applied<Site>>, AdminError> {
    let site = state
        .store
        .update_site(id, site_from_body(&state, body)?)
        .await?;
    let apply = state.coordinator.render_and_apply(Trigger::Site(id)).await;
    Ok(Json(Applied {
        record: Some(site),
        apply,
    }))
}

pub async fn delete_site(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Applied<Site>>, AdminError> {
    state.store.delete_site(id).await?;
    let apply = state.coordinator.render_and_apply(Trigger::Site(id)).await;
    Ok(Json(Applied {
        record: None,
        apply,
    }))
}

// --- Upstreams ---

pub async fn list_upstreams(
    State(state): State<AdminState>,
) -> Result<Json<Vec<Upstream>>, AdminError> {
    Ok(Json(state.store.list_upstreams().await?))
}

pub async fn get_upstream(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Upstream>, AdminError> {
    state
        .store
        .get_upstream(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("upstream", id))
}

pub async fn create_upstream(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Response, AdminError> {
    let upstream = state.store.create_upstream(parse(body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Upstream(upstream.id))
        .await;
    Ok(created(upstream, apply))
}

pub async fn update_upstream(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
    Json(body): Json<Value>,
) -> Result<Json<Applied<Upstream>>, AdminError> {
    let upstream = state.store.update_upstream(id, parse(body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Upstream(id))
        .await;
    Ok(Json(Applied {
        record: Some(upstream),
        apply,
    }))
}

pub async fn delete_upstream(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Applied<Upstream>>, AdminError> {
    state.store.delete_upstream(id).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Upstream(id))
        .await;
    Ok(Json(Applied {
        record: None,
        apply,
    }))
}

// --- Redirections ---

pub async fn list_redirections(
    State(state): State<AdminState>,
) -> Result<Json<Vec<Redirection>>, AdminError> {
    Ok(Json(state.store.list_redirections().await?))
}

pub async fn get_redirection(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Redirection>, AdminError> {
    state
        .store
        .get_redirection(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("redirection", id))
}

pub async fn create_redirection(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Response, AdminError> {
    let redirection = state.store.create_redirection(parse(body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Redirection(redirection.id))
        .await;
    Ok(created(redirection, apply))
}

pub async fn update_redirection(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
    Json(body): Json<Value>,
) -> Result<Json<Applied<Redirection>>, AdminError> {
    let redirection = state.store.update_redirection(id, parse(body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Redirection(id))
        .await;
    Ok(Json(Applied {
        record: Some(redirection),
        apply,
    }))
}

pub async fn delete_redirection(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Applied<Redirection>>, AdminError> {
    state.store.delete_redirection(id).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::Redirection(id))
        .await;
    Ok(Json(Applied {
        record: None,
        apply,
    }))
}

// --- Access lists ---

pub async fn list_access_lists(
    State(state): State<AdminState>,
) -> Result<Json<Vec<AccessList>>, AdminError> {
    Ok(Json(state.store.list_access_lists().await?))
}

pub async fn get_access_list(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<AccessList>, AdminError> {
    state
        .store
        .get_access_list(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("access list", id))
}

pub async fn create_access_list(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Response, AdminError> {
    let list = state.store.create_access_list(parse(body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::AccessList(list.id))
        .await;
    Ok(created(list, apply))
}

pub async fn update_access_list(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
    Json(body): Json<Value>,
) -> Result<Json<Applied<AccessList>>, AdminError> {
    let list = state.store.update_access_list(id, parse(body)?).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::AccessList(id))
        .await;
    Ok(Json(Applied {
        record: Some(list),
        apply,
    }))
}

pub async fn delete_access_list(
    State(state): State<AdminState>,
    Path(id): Path<RecordId>,
) -> Result<Json<Applied<AccessList>>, AdminError> {
    state.store.delete_access_list(id).await?;
    let apply = state
        .coordinator
        .render_and_apply(Trigger::AccessList(id))
        .await;
    Ok(Json(Applied {
        record: None,
        apply,
    }))
}

// --- Certificates ---

/// 200 on success, 422 with the same body on failure.
fn operation_response(result: OperationResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}

pub async fn list_certificates(
    State(state): State<AdminState>,
) -> Result<Json<Vec<Certificate>>, AdminError> {
    Ok(Json(state.store.list_certificates().await?))
}

pub async fn get_certificate_status(
    State(state): State<AdminState>,
    Path(domain): Path<String>,
) -> Result<Json<CertificateStatusReport>, AdminError> {
    Ok(Json(state.certificates.get_certificate_status(&domain).await?))
}

pub async fn issue_certificate(
    State(state): State<AdminState>,
    Json(request): Json<IssueRequest>,
) -> Response {
    operation_response(
        state
            .certificates
            .issue_certificate(&request.domain, &request.email)
            .await,
    )
}

pub async fn renew_certificate(
    State(state): State<AdminState>,
    Path(domain): Path<String>,
) -> Response {
    operation_response(state.certificates.renew_certificate(&domain).await)
}

pub async fn revoke_certificate(
    State(state): State<AdminState>,
    Path(domain): Path<String>,
) -> Response {
    operation_response(state.certificates.revoke_certificate(&domain).await)
}

pub async fn renew_all_certificates(State(state): State<AdminState>) -> Json<RenewAllReport> {
    Json(state.certificates.renew_all_certificates().await)
}

// --- Proxy ---

pub async fn get_proxy_status(State(state): State<AdminState>) -> Json<ProxyStatus> {
    Json(state.coordinator.proxy_status().await)
}

pub async fn validate_proxy(State(state): State<AdminState>) -> Response {
    operation_response(state.coordinator.validate_only().await)
}

pub async fn reload_proxy(State(state): State<AdminState>) -> Response {
    operation_response(state.coordinator.reload_only().await)
}

/// Re-render every record and apply, for use after out-of-band changes.
pub async fn apply_records(State(state): State<AdminState>) -> Response {
    operation_response(
        state
            .coordinator
            .render_and_apply(Trigger::External("admin"))
            .await,
    )
}

pub async fn get_main_config(
    State(state): State<AdminState>,
) -> Result<Json<MainConfig>, AdminError> {
    Ok(Json(MainConfig {
        content: state.coordinator.read_main_config().await?,
    }))
}

pub async fn put_main_config(
    State(state): State<AdminState>,
    Json(config): Json<MainConfig>,
) -> Response {
    operation_response(state.coordinator.save_main_config(&config.content).await)
}
