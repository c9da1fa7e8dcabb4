// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::{
    error::ApiError,
    models::{RecordResponse, RegisterRecordRequest},
    state::AppState,
    store::RecordEntry,
};

#[utoipa::path(
    post,
    path = "/v1/records",
    request_body = RegisterRecordRequest,
    tag = "Records",
    responses(
        (status = 201, body = RecordResponse),
        (status = 400, description = "Missing file name"),
        (status = 409, description = "No wallet identity connected"),
        (status = 502, description = "Registry rejected or did not confirm the registration")
    )
)]
pub async fn register_record(
    State(state): State<AppState>,
    Json(request): Json<RegisterRecordRequest>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiError> {
    let file_name = request.file_name.trim();
    if file_name.is_empty() {
        return Err(ApiError::bad_request("file_name must not be empty"));
    }

    let orchestrator = state.session.orchestrator().await?;
    let content = request.content.unwrap_or_default();

    let record = orchestrator
        .register_record(file_name, content.as_bytes())
        .await?;

    let entry = RecordEntry {
        record,
        owner: orchestrator.signer(),
        registered_at: Utc::now(),
    };
    let response = RecordResponse::from(&entry);
    state.store.write().await.insert_record(entry);

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/v1/records",
    tag = "Records",
    responses((status = 200, body = [RecordResponse]))
)]
pub async fn list_records(State(state): State<AppState>) -> Json<Vec<RecordResponse>> {
    let store = state.store.read().await;
    Json(store.list_records().iter().map(RecordResponse::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{connect, json_request, read_json, test_app, PATIENT_KEY};
    use axum::http::Method;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test(start_paused = true)]
    async fn register_then_list() {
        let (app, _) = test_app();
        connect(&app, PATIENT_KEY).await;

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/v1/records",
                Some(json!({ "file_name": "mri-2024.dcm", "content": "..." })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let record: RecordResponse = read_json(response).await;
        assert_eq!(record.storage_ref, "FAKE_IPFS_CID_FOR_mri-2024.dcm");
        assert!(record.record_id.starts_with("0x"));
        assert_eq!(record.record_id.len(), 66);

        let response = app
            .oneshot(json_request(Method::GET, "/v1/records", None))
            .await
            .unwrap();
        let records: Vec<RecordResponse> = read_json(response).await;
        assert_eq!(records, vec![record]);
    }

    #[tokio::test]
    async fn requires_signer() {
        let (app, _) = test_app();
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/v1/records",
                Some(json!({ "file_name": "scan.pdf" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn empty_file_name_is_rejected() {
        let (app, _) = test_app();
        connect(&app, PATIENT_KEY).await;

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/v1/records",
                Some(json!({ "file_name": "  " })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
