mod client;
mod config;
mod error;
mod notice;

use chrono::Local;

use crate::{
    client::{ConnectionState, Subscription},
    error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("splitter_listen={}", config.level))
        .init();

    let subscription = Subscription::new(&config.base_url, &config.group, config.reconnect)?;
    tracing::info!("Following {}", subscription.endpoint());

    let mut state = subscription.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            match current {
                ConnectionState::Reconnecting { attempt, delay } => {
                    println!("Connection lost, retry {attempt} in {}s", delay.as_secs());
                }
                ConnectionState::Disconnected => println!("Disconnected"),
                other => tracing::debug!("connection state: {other:?}"),
            }
        }
    });

    tokio::select! {
        result = subscription.run(|event| {
            let at = event.timestamp.with_timezone(&Local).format("%H:%M:%S");
            println!("[{at}] {}", notice::describe(&event));
        }) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    tracing::info!(last_heartbeat = ?subscription.last_heartbeat(), "Stopped");
    Ok(())
}
