use std::sync::Arc;

use tracing::{info, warn};

use hub::agent::{AgentLoop, AnthropicClient, LlmClient};
use hub::connection::{self, ConnectionManager, DeviceAuthenticator};
use hub::skills::SkillRegistry;
use hub::store::sqlite::SqliteStore;
use hub::store::HubStore;

use shared::config::RuntimeConfig;

/// Resolves a bearer token to a device by looking it up in the device
/// table. Tokens are assumed pre-provisioned (e.g. issued alongside a
/// Spoke's first pairing) rather than minted by this process.
struct StoreBackedAuthenticator {
    store: Arc<dyn HubStore>,
}

#[async_trait::async_trait]
impl DeviceAuthenticator for StoreBackedAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<String> {
        // The token *is* the device id in this deployment: a Spoke is
        // provisioned with a device id it presents as its bearer token.
        // A deployment wanting opaque tokens swaps this for a lookup
        // table without touching the connection manager.
        let device_id = token.to_string();
        match self.store.touch_device_last_seen(&device_id).await {
            Ok(()) => Some(device_id),
            Err(e) => {
                warn!(%device_id, error = %e, "rejecting connection for unknown device");
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    hub::logging::init();

    let config = RuntimeConfig::default();
    let db_path = std::env::var("HUB_DB_PATH").unwrap_or_else(|_| "./hub.db".to_string());
    let listen_addr = std::env::var("HUB_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:9001".to_string());

    info!(%db_path, %listen_addr, "voice hub starting");

    let store: Arc<dyn HubStore> = Arc::new(SqliteStore::open(db_path)?);
    let connections = Arc::new(ConnectionManager::new());
    let registry = Arc::new(SkillRegistry::new(
        store.clone(),
        connections.clone(),
        config.skills.skill_expiry_seconds,
    ));

    let llm: Arc<dyn LlmClient> = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) => Arc::new(AnthropicClient::new(key, "claude-sonnet-4-5")),
        Err(_) => {
            warn!("ANTHROPIC_API_KEY not set; the agent loop will error on every turn until configured");
            Arc::new(AnthropicClient::new(String::new(), "claude-sonnet-4-5"))
        }
    };

    let agent_loop = Arc::new(AgentLoop::new(
        llm,
        store.clone(),
        registry.clone(),
        connections.clone(),
        config.agent,
        config.hub,
        config.skills.clone(),
    ));

    let authenticator: Arc<dyn DeviceAuthenticator> = Arc::new(StoreBackedAuthenticator { store: store.clone() });

    let listener_connections = connections.clone();
    let listener = tokio::spawn(async move {
        if let Err(e) = connection::run(&listen_addr, listener_connections, authenticator).await {
            warn!(error = %e, "websocket listener exited");
        }
    });

    let mut events = agent_loop.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "agent event");
        }
    });

    info!("voice hub ready");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    listener.abort();
    Ok(())
}
