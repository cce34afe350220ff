//! POAP Claim Gate Server
//!
//! Gates POAP claims behind Twitter follow/retweet verification

use std::sync::Arc;

use poap_gate::server::AppState;
use poap_gate::{ClaimGate, ClaimStore, Config, PoapClient, Secrets, TwitterClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting POAP Claim Gate Server");

    let config = Config::load()?;
    let secrets = Secrets::from_env();

    // Claim store is created once here and injected; a missing REDIS_URL
    // degrades to the disabled store without failing startup.
    let store = ClaimStore::connect(secrets.redis_url.as_deref()).await;

    let twitter = TwitterClient::new(secrets.twitter_bearer_token.clone());
    let poap = PoapClient::new(&config, &secrets);
    let gate = ClaimGate::new(
        twitter,
        poap.clone(),
        store,
        config.follow_username(),
        config.tweet_id(),
    );

    // Get server binding from environment, falling back to config.toml
    let host = std::env::var("CLAIM_GATE_HOST").unwrap_or_else(|_| config.server.host.clone());
    let port: u16 = std::env::var("CLAIM_GATE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.server.port);

    let state = Arc::new(AppState {
        gate,
        poap,
        config,
        http: reqwest::Client::new(),
        started_at: std::time::Instant::now(),
    });

    poap_gate::server::run_server(&host, port, state).await?;

    Ok(())
}
