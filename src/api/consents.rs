// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    blockchain::parse_address,
    consent::{DataKey, GrantState, RecordId},
    error::ApiError,
    models::{GrantAcceptedResponse, GrantConsentRequest, GrantStatusResponse},
    state::AppState,
    store::GrantHandle,
};

#[utoipa::path(
    post,
    path = "/v1/consents",
    request_body = GrantConsentRequest,
    tag = "Consents",
    responses(
        (status = 202, body = GrantAcceptedResponse),
        (status = 400, description = "Malformed record id or doctor address"),
        (status = 409, description = "No wallet identity connected")
    )
)]
pub async fn grant_consent(
    State(state): State<AppState>,
    Json(request): Json<GrantConsentRequest>,
) -> Result<(StatusCode, Json<GrantAcceptedResponse>), ApiError> {
    let record_id: RecordId = request
        .record_id
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;
    let doctor = parse_address(&request.doctor_address)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let duration = request
        .duration_seconds
        .map(Duration::from_secs)
        .unwrap_or(state.defaults.consent_duration);
    let data_key = DataKey::new(
        request
            .data_key
            .unwrap_or_else(|| state.defaults.data_key.clone()),
    );

    let orchestrator = state.session.orchestrator().await?;

    let (state_tx, state_rx) = watch::channel(GrantState::Idle);
    let cancel = CancellationToken::new();
    let handle = GrantHandle::new(
        record_id,
        doctor,
        orchestrator.signer(),
        state_rx,
        cancel.clone(),
    );
    let grant_id = state.store.write().await.insert_grant(handle);

    tracing::info!(grant_id = %grant_id, record_id = %record_id, doctor = %doctor, "Grant flow accepted");

    tokio::spawn(async move {
        // The terminal state is published on `state_tx`.
        let _ = orchestrator
            .grant_consent(record_id, doctor, &data_key, duration, &state_tx, &cancel)
            .await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(GrantAcceptedResponse {
            grant_id,
            state: GrantState::Idle.name().to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/consents/{grant_id}",
    params(
        ("grant_id" = Uuid, Path, description = "Grant flow identifier")
    ),
    tag = "Consents",
    responses(
        (status = 200, body = GrantStatusResponse),
        (status = 404, description = "Unknown grant")
    )
)]
pub async fn get_grant(
    State(state): State<AppState>,
    Path(grant_id): Path<Uuid>,
) -> Result<Json<GrantStatusResponse>, ApiError> {
    let store = state.store.read().await;
    let handle = store
        .grant(&grant_id)
        .ok_or_else(|| ApiError::not_found("Grant not found"))?;
    Ok(Json(GrantStatusResponse::from(handle)))
}

#[utoipa::path(
    delete,
    path = "/v1/consents/{grant_id}",
    params(
        ("grant_id" = Uuid, Path, description = "Grant flow identifier")
    ),
    tag = "Consents",
    responses(
        (status = 202, description = "Cancellation requested", body = GrantStatusResponse),
        (status = 404, description = "Unknown grant"),
        (status = 409, description = "Grant already finished")
    )
)]
pub async fn cancel_grant(
    State(state): State<AppState>,
    Path(grant_id): Path<Uuid>,
) -> Result<(StatusCode, Json<GrantStatusResponse>), ApiError> {
    let store = state.store.read().await;
    let handle = store
        .grant(&grant_id)
        .ok_or_else(|| ApiError::not_found("Grant not found"))?;

    if !handle.cancel() {
        return Err(ApiError::conflict("Grant already finished"));
    }
    tracing::info!(grant_id = %grant_id, "Grant cancellation requested");

    Ok((StatusCode::ACCEPTED, Json(GrantStatusResponse::from(handle))))
}
