// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthenticatedAgent;
use crate::auth::resolver::IdentityDocument;
use crate::error::ApiError;
use crate::state::AppState;

/// Service status summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// Number of agents hosted by this process.
    pub agents: usize,
}

/// Confirmation returned from the handshake endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthVerifyResponse {
    pub message: String,
    /// DID the caller authenticated as.
    pub req_did: String,
    /// Responder the handshake was addressed to, when one was named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_did: Option<String>,
}

/// Liveness and agent-count probe.
#[utoipa::path(
    get,
    path = "/status",
    tag = "Service",
    responses((status = 200, description = "Service is running", body = StatusResponse))
)]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        agents: state.agents.len(),
    })
}

/// Handshake endpoint. All verification happens in the auth gate; by the
/// time this handler runs the requester is authenticated and the response
/// `authorization` header already carries the handshake result.
#[utoipa::path(
    get,
    path = "/wba/auth",
    tag = "Auth",
    responses(
        (status = 200, description = "Authentication succeeded", body = AuthVerifyResponse),
        (status = 401, description = "Authentication failed")
    )
)]
pub async fn auth_verify(
    Extension(agent): Extension<AuthenticatedAgent>,
) -> Json<AuthVerifyResponse> {
    Json(AuthVerifyResponse {
        message: "Successfully authenticated".to_string(),
        req_did: agent.req_did,
        resp_did: agent.resp_did,
    })
}

/// Serve a hosted agent's published DID document.
#[utoipa::path(
    get,
    path = "/wba/user/{user_id}/did.json",
    tag = "Identity",
    params(("user_id" = String, Path, description = "User segment of the agent's DID")),
    responses(
        (status = 200, description = "DID document", body = IdentityDocument),
        (status = 404, description = "No such agent")
    )
)]
pub async fn did_document(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<IdentityDocument>, ApiError> {
    let suffix = format!(":wba:user:{user_id}");
    let agent = state
        .agents
        .dids()
        .find(|did| did.ends_with(&suffix))
        .and_then(|did| state.agents.get(did))
        .ok_or_else(|| ApiError::not_found("No agent for that user id"))?;

    let document = agent
        .load_document()
        .map_err(|err| ApiError::internal(format!("Failed to load DID document: {err}")))?;
    Ok(Json(document))
}
