// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        ConnectSignerRequest, GrantAcceptedResponse, GrantConsentRequest, GrantStatusResponse,
        RecordResponse, RedeemTokenRequest, RegisterRecordRequest, SessionResponse,
        StudyAccessResponse,
    },
    state::AppState,
};

pub mod access;
pub mod consents;
pub mod health;
pub mod records;
pub mod session;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/session",
            get(session::get_session).delete(session::disconnect_signer),
        )
        .route("/session/signer", put(session::connect_signer))
        .route(
            "/records",
            get(records::list_records).post(records::register_record),
        )
        .route("/consents", post(consents::grant_consent))
        .route(
            "/consents/{grant_id}",
            get(consents::get_grant).delete(consents::cancel_grant),
        )
        .route("/access", post(access::redeem_token));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        session::connect_signer,
        session::get_session,
        session::disconnect_signer,
        records::register_record,
        records::list_records,
        consents::grant_consent,
        consents::get_grant,
        consents::cancel_grant,
        access::redeem_token
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            ConnectSignerRequest,
            SessionResponse,
            RegisterRecordRequest,
            RecordResponse,
            GrantConsentRequest,
            GrantAcceptedResponse,
            GrantStatusResponse,
            RedeemTokenRequest,
            StudyAccessResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Session", description = "Connected wallet identity"),
        (name = "Records", description = "Medical record registration"),
        (name = "Consents", description = "Consent grant flows"),
        (name = "Access", description = "Consent token redemption")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
        Router,
    };
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::router;
    use crate::consent::{FlowTimeouts, SimulationBehavior};
    use crate::models::{GrantStatusResponse, RecordResponse};
    use crate::state::AppState;

    pub const PATIENT_KEY: &str =
        "0x0101010101010101010101010101010101010101010101010101010101010101";
    pub const DOCTOR_KEY: &str =
        "0x0202020202020202020202020202020202020202020202020202020202020202";

    pub fn test_app() -> (Router, AppState) {
        let state = AppState::simulated(SimulationBehavior::default(), FlowTimeouts::default());
        (router(state.clone()), state)
    }

    pub fn json_request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn read_json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn connect(app: &Router, key: &str) {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/v1/session/signer",
                Some(serde_json::json!({ "private_key": key })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Register a record as the connected signer and return its id.
    pub async fn register(app: &Router, file_name: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/v1/records",
                Some(serde_json::json!({ "file_name": file_name })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json::<RecordResponse>(response).await.record_id
    }

    /// Poll a grant until it reaches a terminal state.
    pub async fn wait_for_grant(app: &Router, grant_id: Uuid) -> GrantStatusResponse {
        let uri = format!("/v1/consents/{grant_id}");
        for _ in 0..3_000 {
            let response = app
                .clone()
                .oneshot(json_request(Method::GET, &uri, None))
                .await
                .unwrap();
            let status: GrantStatusResponse = read_json(response).await;
            if status.state == "granted" || status.state == "failed" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("grant {grant_id} did not finish");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::default());
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (app, _) = test_support::test_app();
        let response = app
            .oneshot(test_support::json_request(
                Method::GET,
                "/api-doc/openapi.json",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let doc: serde_json::Value = test_support::read_json(response).await;
        assert!(doc["paths"]["/v1/consents/{grant_id}"].is_object());
        assert!(doc["paths"]["/v1/access"].is_object());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (app, _) = test_support::test_app();
        let response = app
            .oneshot(test_support::json_request(Method::GET, "/v1/wallets", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
