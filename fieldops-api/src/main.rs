use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use fieldops_api::{app, AppState, Repositories};
use fieldops_store::app_config::Config;
use fieldops_store::{DbClient, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldops_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting FieldOps API on port {}", config.server.port);

    let repos = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Repositories::postgres(&db)
        }
        None => {
            tracing::warn!("No database.url configured; using the in-memory store");
            Repositories::in_memory(Arc::new(MemoryStore::new()))
        }
    };

    let webhooks = &config.webhooks;
    for (gateway, secret) in [("stripe", &webhooks.stripe_secret), ("paypal", &webhooks.paypal_secret)] {
        match (secret, webhooks.allow_unsigned) {
            (Some(_), _) => {}
            (None, true) => tracing::warn!("{} webhooks are accepted unsigned (webhooks.allow_unsigned)", gateway),
            (None, false) => tracing::warn!("No {} webhook secret configured; its deliveries will be refused", gateway),
        }
    }

    let app = app(AppState::new(repos, &config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
