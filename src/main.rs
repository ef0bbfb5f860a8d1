//! Storefront commerce service

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use storefront_commerce::api::{self, AppState};
use storefront_commerce::config::Config;
use storefront_commerce::events::EventPublisher;
use storefront_commerce::services::UserService;
use storefront_commerce::store::{MemoryStore, PgStore, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "configuration loaded");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.database_max_connections).await?;
            pg.migrate().await?;
            tracing::info!("connected to postgres, migrations applied");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                tracing::info!(%url, "connected to nats");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "nats unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };

    if let Some(admin) = &config.admin {
        UserService::new(store.clone()).bootstrap_admin(&admin.email, &admin.token).await?;
    }

    let addr = SocketAddr::new(config.host, config.port);
    let app = api::router(AppState::new(config, store, EventPublisher::new(nats)));

    tracing::info!(%addr, "storefront commerce listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
