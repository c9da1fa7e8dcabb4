// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::net::SocketAddr;

use axum_server::tls_rustls::RustlsConfig;
use saludata::{
    api::router,
    blockchain::{create_signer, signer_from_pem_file},
    config::{AppConfig, SignerSource},
    state::AppState,
    telemetry,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("saludata-consent-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    telemetry::init(config.log_format);

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let state = AppState::from_config(&config);
    tracing::info!(
        network = %config.network.name,
        rpc_url = %config.network.rpc_url,
        backend = state.session.backend(),
        "Registry configured"
    );

    if let Some(source) = &config.signer {
        let signer = match source {
            SignerSource::Hex(hex) => create_signer(hex)?,
            SignerSource::PemFile(path) => signer_from_pem_file(path)?,
        };
        state.session.activate(signer).await?;
    }

    let app = router(state);
    let addr: SocketAddr = config.bind_address().parse()?;

    let tls_config = match &config.tls {
        Some(tls) => Some(RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?),
        None => None,
    };

    let server = async move {
        match tls_config {
            Some(tls_config) => {
                tracing::info!(%addr, "SaluData consent server listening on https (docs at /docs)");
                axum_server::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service())
                    .await
            }
            None => {
                tracing::info!(%addr, "SaluData consent server listening on http (docs at /docs)");
                axum_server::bind(addr)
                    .serve(app.into_make_service())
                    .await
            }
        }
    };

    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
