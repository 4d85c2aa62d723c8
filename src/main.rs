use anyhow::Context;
use streamsignup::{
    AppState, Config, Store,
    auth::{ClientProvider, Clients},
    seed,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("streamsignup=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = Store::connect(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    store.migrate().await.context("running migrations")?;

    let clients = match &config.oauth_clients_file {
        Some(path) => Clients::load(path, &config.public_url)?,
        None => {
            tracing::warn!("OAUTH_CLIENTS_FILE not set, sign-in is disabled");
            Clients::empty()
        }
    };
    for provider in [ClientProvider::Google, ClientProvider::Github] {
        if clients.is_configured(provider) {
            tracing::info!(%provider, "sign-in enabled");
        }
    }

    let app_state = AppState::new(store.clone(), clients);

    if config.seed_demo_data {
        seed::seed_demo_data(&app_state.registrar).await?;
    }

    for drift in store.counter_drift().await? {
        tracing::warn!(
            stream_id = %drift.stream_id,
            cached = drift.cached,
            actual = drift.actual,
            "participant counter disagrees with registrations"
        );
    }

    let app = streamsignup::app(app_state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
