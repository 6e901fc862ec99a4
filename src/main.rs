use anyhow::{Context, Result};
use peg_settlement::config::PegConfig;
use peg_settlement::flow::{Participants, PegFlow};
use peg_settlement::rpc::RpcGateway;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PegConfig::load().context("failed to load configuration")?;
    tracing::info!(network = %config.network, rpc = %config.rpc.url, "starting peg flow");

    let mut gateway = RpcGateway::new(&config.rpc).context("failed to create RPC gateway")?;
    let participants = Participants::generate();

    let report = PegFlow::new(config.network, config.flow.clone())
        .run(&mut gateway, &participants)
        .context("peg flow failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
