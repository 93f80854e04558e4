use std::net::SocketAddr;

use oidc_weather_demo::{
    AppState, AuthConfig, Error, HttpProvider, ProviderSettings, SessionEvents, app_router,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let provider_settings = ProviderSettings::from_env()?;
    let config =
        AuthConfig::from_env().map_err(|e| Error::Config(e.to_string()))?;
    let dev_mode = config.dev_mode();

    tracing::info!(
        authority = %provider_settings.authority(),
        client_id = %provider_settings.client_id(),
        "resolving provider endpoints"
    );
    let provider = HttpProvider::discover(provider_settings).await?;

    let mut state = AppState::new(provider, config);
    if dev_mode {
        state = state.with_events(dev_logging_events());
    }

    let addr: SocketAddr = std::env::var("APP_LISTEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".into())
        .parse()
        .map_err(|e| Error::Config(format!("APP_LISTEN_ADDR: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, dev_mode, "listening");
    axum::serve(listener, app_router(state)).await?;

    Ok(())
}

/// Dev-mode lifecycle hooks dumping the full claim set on every login.
fn dev_logging_events() -> SessionEvents {
    SessionEvents::new()
        .with_on_claims_received(|claims| {
            for claim in claims {
                tracing::debug!(
                    claim_type = %claim.claim_type,
                    value = %claim.value,
                    "claim received from the provider"
                );
            }
        })
        .with_on_session_created(|ticket| {
            tracing::debug!(
                session_id = %ticket.session_id,
                claims = ticket.claims.len(),
                expires_at = %ticket.expires_at,
                "session created"
            );
        })
}
