// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    consent::TokenId,
    error::ApiError,
    models::{RedeemTokenRequest, StudyAccessResponse},
    state::AppState,
};

/// Redeem a consent token as the connected signer.
///
/// The registry decides who may read the key behind a token; its refusal
/// reason is returned as-is with `403`.
#[utoipa::path(
    post,
    path = "/v1/access",
    request_body = RedeemTokenRequest,
    tag = "Access",
    responses(
        (status = 200, body = StudyAccessResponse),
        (status = 400, description = "Missing token id"),
        (status = 403, description = "Registry refused access"),
        (status = 409, description = "No wallet identity connected"),
        (status = 422, description = "Wrapped key could not be opened")
    )
)]
pub async fn redeem_token(
    State(state): State<AppState>,
    Json(request): Json<RedeemTokenRequest>,
) -> Result<Json<StudyAccessResponse>, ApiError> {
    let token_id = TokenId::new(request.token_id);
    if token_id.as_str().is_empty() {
        return Err(ApiError::bad_request("token_id must not be empty"));
    }

    let orchestrator = state.session.orchestrator().await?;
    let access = orchestrator.redeem(&token_id).await?;

    Ok(Json(StudyAccessResponse::from(access)))
}
