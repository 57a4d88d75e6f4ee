//! ShockOsc CLI.
//!
//! Listens for avatar parameters from VRChat, fires shockers through the
//! OpenShock API and reports state back to the avatar.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use shocker_kernel::{run_control_sender, BridgeConfig, KernelBuilder};
use shockosc_bridge::avatar_config::{default_osc_dir, OscConfigDirectory};
use shockosc_bridge::openshock::OpenShockClient;
use shockosc_bridge::osc;

#[derive(Parser)]
#[command(name = "shockosc")]
#[command(version)]
#[command(about = "VRChat OSC to OpenShock bridge")]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long, env = "SHOCKOSC_CONFIG", default_value = "shockosc.json")]
    config: PathBuf,

    /// OpenShock API token (overrides the config file)
    #[arg(long = "api-token", env = "OPENSHOCK_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// VRChat OSC directory holding per-avatar configs
    #[arg(long = "osc-dir", env = "VRCHAT_OSC_DIR")]
    osc_dir: Option<PathBuf>,

    /// Address to receive OSC on (overrides the config file)
    #[arg(long)]
    listen: Option<String>,

    /// Address to send OSC to (overrides the config file)
    #[arg(long)]
    send: Option<String>,

    /// Random seed for intensity/duration sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(token) = &self.api_token {
            config.openshock.api_token = token.clone();
        }
        if let Some(listen) = &self.listen {
            config.osc.listen_addr = listen.clone();
        }
        if let Some(send) = &self.send {
            config.osc.send_addr = send.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let mut config = BridgeConfig::load(&cli.config)?;
    cli.apply(&mut config);

    if config.openshock.api_token.is_empty() {
        warn!("No OpenShock API token configured, control requests will be rejected");
    }
    if config.shockers.is_empty() {
        warn!("No shockers configured, nothing will fire");
    }

    let osc_dir = cli
        .osc_dir
        .clone()
        .or_else(default_osc_dir)
        .context("Cannot determine the VRChat OSC directory, pass --osc-dir")?;

    let (receiver, sender) = osc::bind(&config.osc.listen_addr, &config.osc.send_addr).await?;
    info!(
        listen = %config.osc.listen_addr,
        send = %config.osc.send_addr,
        osc_dir = %osc_dir.display(),
        shockers = config.shockers.len(),
        "ShockOsc starting"
    );

    let client = OpenShockClient::new(&config.openshock);
    let avatar_configs = Arc::new(OscConfigDirectory::new(osc_dir));
    let (kernel, channels) = KernelBuilder::new(config, sender, avatar_configs).build();

    tokio::spawn(run_control_sender(channels.commands, client));

    // Keeps the reconciler alive; no live control stream feeds it yet
    let _events = channels.events;

    kernel.run(receiver).await
}
