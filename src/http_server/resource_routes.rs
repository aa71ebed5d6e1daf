//! Resource HTTP Routes
//!
//! Administrative API over the lifecycle manager. Every route needs a
//! bearer token; the principal is loaded from the store per request.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::daemon::{DaemonOperation, DaemonOutcome};
use crate::errors::MasterError;
use crate::lifecycle::{CreateRequest, CreditCardUpdate, OwnerInfo, RemovalReport};
use crate::ownership::{ResourceKind, ResourceRef};
use crate::shared::SweepReport;
use crate::store::{Row, RowId};

use super::state::{master_error, ApiError, ApiState};

/// Resource routes with shared state
pub fn resource_routes(state: ApiState) -> Router {
    Router::new()
        .route("/resources", post(create_handler))
        .route("/resources/:kind/:id", get(get_handler).delete(remove_handler))
        .route("/resources/:kind/:id/owner", get(owner_handler))
        .route("/resources/:kind/:id/disable", post(disable_handler))
        .route("/resources/:kind/:id/enable", post(enable_handler))
        .route("/resources/:kind/:id/password", put(password_handler))
        .route("/credit-cards/:id", put(credit_card_handler))
        .route("/accounts/:id/cancel", post(cancel_handler))
        .route("/disable-logs/:id", delete(remove_disable_log_handler))
        .route("/reconcile", post(reconcile_handler))
        .with_state(state)
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub resource: ResourceRef,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct DisableResponse {
    pub disable_log: RowId,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordResponse {
    pub resource: ResourceRef,
    pub host: RowId,
    pub daemon: DaemonOutcome,
}

fn resource(kind: &str, id: RowId) -> Result<ResourceRef, ApiError> {
    ResourceKind::from_name(kind)
        .map(|kind| ResourceRef::new(kind, id))
        .ok_or_else(|| master_error(MasterError::not_found(format!("unknown resource type '{}'", kind))))
}

// ==================
// Handlers
// ==================

async fn create_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let principal = state.authenticate(&headers)?;
    let resource = state
        .manager
        .create(&principal, request)
        .map_err(master_error)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { resource })))
}

async fn get_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, RowId)>,
) -> Result<Json<Row>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let target = resource(&kind, id)?;
    state
        .manager
        .get(&principal, target)
        .map(Json)
        .map_err(master_error)
}

async fn owner_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, RowId)>,
) -> Result<Json<OwnerInfo>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let target = resource(&kind, id)?;
    state
        .manager
        .owner(&principal, target)
        .map(Json)
        .map_err(master_error)
}

async fn disable_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, RowId)>,
    body: Option<Json<DisableRequest>>,
) -> Result<Json<DisableResponse>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let target = resource(&kind, id)?;
    let reason = body.map(|Json(request)| request.reason).unwrap_or_default();
    let disable_log = state
        .manager
        .disable(&principal, target, &reason)
        .map_err(master_error)?;
    Ok(Json(DisableResponse { disable_log }))
}

async fn enable_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, RowId)>,
) -> Result<StatusCode, ApiError> {
    let principal = state.authenticate(&headers)?;
    let target = resource(&kind, id)?;
    state
        .manager
        .enable(&principal, target)
        .map_err(master_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, RowId)>,
) -> Result<Json<RemovalReport>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let target = resource(&kind, id)?;
    state
        .manager
        .remove(&principal, target)
        .map(Json)
        .map_err(master_error)
}

/// Commit the hash, then push the new password to the host daemon
///
/// A daemon failure leaves the committed change in place and reports a
/// deferred outcome.
async fn password_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, RowId)>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<PasswordResponse>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let target = resource(&kind, id)?;
    let change = state
        .manager
        .set_password(&principal, target, &request.password)
        .map_err(master_error)?;

    let daemon = state
        .daemons
        .push(
            change.host,
            DaemonOperation::SetPassword,
            json!({
                "resource": change.resource,
                "login": change.login,
                "password": request.password,
            }),
        )
        .await;

    Ok(Json(PasswordResponse {
        resource: change.resource,
        host: change.host,
        daemon,
    }))
}

async fn credit_card_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<RowId>,
    Json(update): Json<CreditCardUpdate>,
) -> Result<StatusCode, ApiError> {
    let principal = state.authenticate(&headers)?;
    state
        .manager
        .edit_credit_card(&principal, id, update)
        .map_err(master_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<RowId>,
) -> Result<StatusCode, ApiError> {
    let principal = state.authenticate(&headers)?;
    state
        .manager
        .cancel_account(&principal, id)
        .map_err(master_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_disable_log_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<RowId>,
) -> Result<StatusCode, ApiError> {
    let principal = state.authenticate(&headers)?;
    state
        .manager
        .remove_disable_log(&principal, id)
        .map_err(master_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run the reconciliation sweep now; global operators only
async fn reconcile_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, ApiError> {
    let principal = state.authenticate(&headers)?;
    if !principal.is_global_operator() {
        return Err(master_error(MasterError::deny(format!(
            "{} may not run the reconciliation sweep: not a global operator",
            principal.username
        ))));
    }
    state.manager.reconcile().map(Json).map_err(master_error)
}
