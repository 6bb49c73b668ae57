use std::sync::Arc;

use seatshare::api::DynAPI;
use seatshare::config::{Config, StoreKind};
use seatshare::db::{MemoryStore, PgStore};
use seatshare::engine::Engine;
use seatshare::error::{config_error, Error};
use seatshare::notifier::{spawn_log_sink, Notifier};
use seatshare::server::serve;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let (notifier, events) = Notifier::new(config.event_buffer);
    let _sink = spawn_log_sink(events);

    let api = match config.store {
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| config_error("DATABASE_URL is not set"))?;

            let store = PgStore::new(url, config.max_connections, config.settings.lock_timeout)
                .await?;

            Arc::new(Engine::new(store, notifier, config.settings)?) as DynAPI
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store, state is lost on exit");

            let store = MemoryStore::new(config.settings.lock_timeout);

            Arc::new(Engine::new(store, notifier, config.settings)?) as DynAPI
        }
    };

    serve(api, config.listen_addr).await
}
