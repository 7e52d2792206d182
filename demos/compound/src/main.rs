mod handlers;
mod tasks;

use std::error::Error;
use std::time::Duration;

use stronghold::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::handlers::{AuthHandler, InitCompleteHandler, SaveHandler};

const CONFIG_ENV: &str = "STRONGHOLD_CONFIG";
const DEV_PLAYER_ENV: &str = "STRONGHOLD_DEV_PLAYER";
const KEY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

async fn build_server(
    config: ServerConfig,
    join_keys: JoinKeys,
) -> Result<StrongholdServer, StrongholdError> {
    StrongholdServer::builder()
        .config(config)
        .tasks(tasks::dispatcher()?)
        .handler(JoinHandler::new(join_keys))
        .handler(AuthHandler)
        .handler(InitCompleteHandler)
        .handler(SaveHandler)
        .build()
        .await
}

/// Reads the JSON file named by `STRONGHOLD_CONFIG`, or uses defaults.
fn load_config() -> Result<ServerConfig, Box<dyn Error>> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&text)?)
        }
        Err(_) => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let join_keys = JoinKeys::new(config.session.join_key_ttl());

    // No account service here; hand out one key so a client can connect.
    let dev_player = std::env::var(DEV_PLAYER_ENV).unwrap_or_else(|_| "dev-player".into());
    let key = join_keys.issue(PlayerId::new(dev_player.as_str())).await;
    tracing::info!(player_id = %dev_player, join_key = %key, "issued development join key");

    let purge_keys = join_keys.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEY_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_keys.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "expired join keys purged");
            }
        }
    });

    let server = build_server(config, join_keys).await?;
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
