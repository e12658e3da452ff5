//! Engine process entrypoint: wires configuration, the archive store, the
//! JMAP client and token store, the sync engine ticker, and the HTTP
//! change listener into one running process.
//!
//! Exit codes follow spec §6: 0 clean stop, 1 fatal configuration, 2 fatal
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sync_engine_adapters::crypto::TokenCipher;
use sync_engine_adapters::engine::SyncEngine;
use sync_engine_adapters::jmap::JmapClient;
use sync_engine_adapters::token_store::{OAuthClientCredentials, TokenStore};
use sync_engine_core::config::{EngineConfig, RemoteCredential};
use sync_engine_listener::ListenerState;
use sync_engine_storage::Storage;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// The periodic integrity check runs far less often than the sync ticker —
/// it is ambient hygiene, not part of the per-account state machine.
const INTEGRITY_CHECK_INTERVAL_FACTOR: u32 = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal configuration error: {err}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(config).await {
        tracing::error!(error = ?err, "engine exited with a fatal runtime error");
        std::process::exit(2);
    }

    Ok(())
}

async fn run(config: EngineConfig) -> anyhow::Result<()> {
    let storage = Storage::open_or_create(&config.store_url).context("opening archive store")?;

    if let Ok(checks) = storage.validate_integrity() {
        for check in checks.iter().filter(|c| !c.passed) {
            tracing::warn!(check = check.name, issues = check.issue_count, "integrity check failed at startup");
        }
    }

    let jmap = JmapClient::new(config.jmap_session_url.clone());

    let (credential_store, static_token) = match &config.remote_credential {
        RemoteCredential::StaticToken { token } => (None, Some(token.clone())),
        RemoteCredential::OAuthClient { client_id, client_secret, token_endpoint } => {
            let cipher = TokenCipher::from_hex_key(&config.encryption_key).context("parsing ENCRYPTION_KEY")?;
            let token_storage = Storage::open_or_create(&config.store_url).context("opening token store")?;
            let oauth = OAuthClientCredentials {
                token_endpoint: token_endpoint.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            };
            (Some(TokenStore::new(token_storage, cipher, Some(oauth))), None)
        }
    };

    let engine = Arc::new(
        SyncEngine::new(storage, jmap, credential_store, static_token, &config)
            .map_err(|err| anyhow::anyhow!(err.to_string()))
            .context("constructing sync engine")?,
    );

    engine.start().await;
    tracing::info!(account_id = engine.account_id(), "sync ticker started");

    let integrity_handle = spawn_periodic_integrity_check(Arc::clone(&engine), &config);

    let listener_state = ListenerState::new(Arc::clone(&engine), config.webhook_secret.clone());
    let app = sync_engine_listener::build_router(listener_state);
    let addr = format!("0.0.0.0:{}", config.webhook_port);
    let tcp_listener = TcpListener::bind(&addr).await.context("binding webhook listener")?;
    tracing::info!(address = %addr, "change listener bound");

    let server = axum::serve(tcp_listener, app).with_graceful_shutdown(shutdown_signal());
    server.await.context("serving HTTP listener")?;

    integrity_handle.abort();
    engine.stop().await;
    tracing::info!("engine stopped cleanly");
    Ok(())
}

fn spawn_periodic_integrity_check(engine: Arc<SyncEngine>, config: &EngineConfig) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(config.sync_interval_minutes * 60 * INTEGRITY_CHECK_INTERVAL_FACTOR as u64);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match engine.storage().validate_integrity() {
                Ok(checks) => {
                    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
                    if failed.is_empty() {
                        continue;
                    }
                    for check in &failed {
                        tracing::warn!(check = check.name, issues = check.issue_count, "periodic integrity check failed");
                    }
                    if let Err(err) = engine.storage().repair_integrity() {
                        tracing::error!(error = %err, "integrity repair failed");
                    }
                }
                Err(err) => tracing::error!(error = %err, "periodic integrity check errored"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, waiting for in-flight tick to finish");
}
