use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use carelink_server::config::Config;
use carelink_server::{app, init_tracing, AppState};
use carelink_shared::{Database, ServiceContext, SystemClock};
use clap::Parser;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_level);
    config.validate().context("invalid configuration")?;

    let db = Database::connect(&config.database_url, config.db_max_connections)
        .await
        .context("failed to open database")?;
    db.migrate().await.context("failed to apply schema")?;

    let ctx = ServiceContext::new(db.clone(), Arc::new(SystemClock));
    let state = AppState::new(ctx, &config.auth_config());

    if let Some(admin) = config.bootstrap_admin() {
        let user = state
            .auth
            .bootstrap_admin(&admin.email, &admin.password, &admin.first_name, &admin.last_name)
            .await
            .context("failed to create bootstrap administrator")?;
        tracing::info!(user_id = user.id, "bootstrap administrator ready");
    }

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "CareLink API listening");

    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for shutdown signal");
    }
}
