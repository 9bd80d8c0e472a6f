pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod launcher;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{
    config::{LauncherSettings, Settings},
    state::AppState,
    telemetry,
};
use crate::services::nim_client::NimClient;


pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(settings.telemetry())?;
    core::metrics::init(&settings)?;

    let nim = NimClient::from_settings(&settings)?;
    let state = AppState::new(settings, Arc::new(nim));

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        nim_base_url = %state.settings().nim().base_url,
        "Grader API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Grader API stopped");
    Ok(())
}

pub async fn run_launcher() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = LauncherSettings::load()?;
    telemetry::init_tracing(&settings.telemetry)?;

    launcher::run(settings).await
}
