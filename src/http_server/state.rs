//! Shared API state, bearer authentication and error responses

use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::access::Principal;
use crate::auth::{AuthError, TokenManager};
use crate::daemon::DaemonClient;
use crate::errors::MasterError;
use crate::lifecycle::LifecycleManager;
use crate::observability::MetricsRegistry;

/// State handed to every route
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<LifecycleManager>,
    pub tokens: Arc<TokenManager>,
    pub daemons: DaemonClient,
    pub metrics: Arc<MetricsRegistry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn master_error(err: MasterError) -> ApiError {
    (
        status(err.status_code()),
        Json(ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}

pub fn auth_error(err: AuthError) -> ApiError {
    (
        status(err.status_code()),
        Json(ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}

impl ApiState {
    /// Resolve the principal behind the request's bearer token
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let header = headers.get("authorization").and_then(|v| v.to_str().ok());
        let username = self.tokens.username_from_header(header).map_err(auth_error)?;
        self.manager.principal(&username).map_err(master_error)
    }

    /// Resolve the principal behind a raw token
    pub fn authenticate_token(&self, token: &str) -> Result<Principal, ApiError> {
        let username = self.tokens.validate(token).map_err(auth_error)?.sub;
        self.manager.principal(&username).map_err(master_error)
    }
}
