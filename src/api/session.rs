// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use alloy::signers::local::PrivateKeySigner;
use axum::{extract::State, http::StatusCode, Json};

use crate::{
    blockchain::{create_signer, signer_from_pem, AvaxClientError},
    error::ApiError,
    models::{ConnectSignerRequest, SessionResponse},
    state::AppState,
};

/// Parse a hex key, or a PEM block when the input looks like one.
fn parse_signer(raw: &str) -> Result<PrivateKeySigner, AvaxClientError> {
    let raw = raw.trim();
    if raw.starts_with("-----BEGIN") {
        signer_from_pem(raw.as_bytes())
    } else {
        create_signer(raw)
    }
}

async fn session_response(state: &AppState) -> SessionResponse {
    let current = state.session.current().await;
    SessionResponse {
        active: current.is_some(),
        address: current.map(|active| active.address.to_string()),
        backend: state.session.backend().to_string(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/session/signer",
    request_body = ConnectSignerRequest,
    tag = "Session",
    responses(
        (status = 200, body = SessionResponse),
        (status = 400, description = "Invalid private key")
    )
)]
pub async fn connect_signer(
    State(state): State<AppState>,
    Json(request): Json<ConnectSignerRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let signer = parse_signer(&request.private_key)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    state.session.activate(signer).await.map_err(|e| match e {
        AvaxClientError::InvalidRpcUrl(_) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        other => ApiError::bad_request(other.to_string()),
    })?;

    Ok(Json(session_response(&state).await))
}

#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "Session",
    responses((status = 200, body = SessionResponse))
)]
pub async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(session_response(&state).await)
}

#[utoipa::path(
    delete,
    path = "/v1/session",
    tag = "Session",
    responses((status = 204, description = "Signer disconnected"))
)]
pub async fn disconnect_signer(State(state): State<AppState>) -> StatusCode {
    state.session.deactivate().await;
    StatusCode::NO_CONTENT
}
