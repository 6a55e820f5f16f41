use anyhow::Result;
use axum::Router;
use counsel_api::config::AppConfig;
use counsel_api::routes;
use counsel_api::state::AppState;
use counsel_core::{TelemetryOptions, init_telemetry};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(TelemetryOptions {
        with_target: false,
        ..TelemetryOptions::default()
    })?;

    let config = AppConfig::from_env()?;
    let state = AppState::try_new(&config).await?;
    info!(
        retrieval_mode = state.retrieval_mode(),
        max_turns = config.max_concurrent_turns,
        "counsel-api state ready"
    );

    let app: Router = routes::build_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(address = %config.listen_addr, "counsel-api listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
