// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

/// Upper bound on the registry reachability probe.
const REGISTRY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health check response with individual component status.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Registry backend in use (`contract` or `simulated`).
    pub backend: String,
    /// Whether a wallet identity is connected ("ok" or "missing").
    pub signer: String,
    /// Registry reachability ("ok" or "unreachable").
    /// Only present when a signer is connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Latest block height reported by the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Probe the active signer's registry. `None` without a signer.
async fn check_registry(state: &AppState) -> Option<Result<u64, String>> {
    let active = state.session.current().await?;
    let probe = active.orchestrator.registry().block_number();

    let result = match tokio::time::timeout(REGISTRY_PROBE_TIMEOUT, probe).await {
        Ok(Ok(block)) => Ok(block),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("registry probe timed out".to_string()),
    };
    if let Err(reason) = &result {
        tracing::warn!(reason = %reason, "Registry health probe failed");
    }
    Some(result)
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let registry = check_registry(&state).await;

    let signer_ok = registry.is_some();
    let registry_ok = matches!(registry, Some(Ok(_)));
    let all_ok = signer_ok && registry_ok;

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            backend: state.session.backend().to_string(),
            signer: if signer_ok { "ok" } else { "missing" }.to_string(),
            registry: registry
                .as_ref()
                .map(|r| if r.is_ok() { "ok" } else { "unreachable" }.to_string()),
            block_number: registry.and_then(Result::ok),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if a signer is connected and its registry answers.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}
