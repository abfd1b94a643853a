use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use realtime::Registry;
use settings::Database;
use tokio_util::sync::CancellationToken;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "splitter={level},server={level},realtime={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {err}");
                return;
            }
            tracing::info!("Shutting down...");
            shutdown.cancel();
        });
    }

    let Some(server) = settings.server else {
        tracing::warn!("No server settings found, nothing to run");
        return Ok(());
    };

    let realtime = settings.realtime;
    tasks.spawn(async move {
        tracing::info!("Found server settings...");
        let db = match parse_database(&server.database).await {
            Ok(db) => db,
            Err(err) => {
                tracing::error!("failed to initialize database: {err}");
                return;
            }
        };

        let engine = match engine::Engine::builder().database(db).build().await {
            Ok(engine) => engine,
            Err(err) => {
                tracing::error!("failed to build engine from database: {err}");
                return;
            }
        };
        let registry = Arc::new(Registry::with_backlog_capacity(realtime.backlog_capacity));
        let state = server::ServerState::new(engine, registry, realtime, shutdown);

        let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
        let addr = format!("{}:{}", bind, server.port);
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!("failed to bind server listener: {err}");
                return;
            }
        };
        if let Err(err) = server::run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
