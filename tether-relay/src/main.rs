use anyhow::Context;

use tether_relay::server::{routes, State};
use tether_relay::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = RelayConfig::from_env().context("reading relay configuration")?;
    let state = State::new(&config);

    log::info!(
        "tether-relay listening on {} (heartbeat every {:?})",
        config.listen,
        config.heartbeat_interval
    );
    warp::serve(routes(state)).run(config.listen).await;
    Ok(())
}
