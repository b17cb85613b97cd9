use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use switchbot_shadow_bridge::config::{self, Config};
use switchbot_shadow_bridge::engine::Bridge;
use switchbot_shadow_bridge::input::{DeviceGateway, SimulatedCloud, SwitchBotClient};
use switchbot_shadow_bridge::shadow::{DeviceKind, LoggingListener};
use tokio::signal;

#[derive(Debug, Parser)]
#[command(name = "switchbot-shadow-bridge", version, about)]
struct Args {
    /// Run against an in-process simulated cloud instead of the real API
    #[arg(long)]
    simulate: bool,

    /// JSON config file; environment variables are layered on top
    #[arg(long, env = "SHADOW_BRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// Simulated cloud populated with every configured device.
fn simulated_cloud(config: &Config) -> SimulatedCloud {
    config
        .devices
        .iter()
        .fold(SimulatedCloud::new(), |cloud, device| match device.kind {
            DeviceKind::Curtain => cloud.with_curtain(device.id.as_str(), 0),
            DeviceKind::Meter => cloud.with_meter(device.id.as_str(), 21.5, 45),
            DeviceKind::AirPurifier => cloud.with_air_purifier(device.id.as_str()),
        })
}

fn main() {
    // .env is applied while the process is still single-threaded.
    config::load_dotenv();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(Args::parse()));
}

async fn run(args: Args) {
    init_logger(&args.log_level);
    info!("Starting SwitchBot shadow bridge");

    let mut config = match &args.config {
        Some(path) => match Config::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    config.apply_env();

    info!("Configuration loaded:");
    info!("  API: {}", config.api.base_url);
    info!("  Devices: {}", config.devices.len());
    if config.api.open_token.is_none() && !args.simulate {
        warn!("  No SWITCHBOT_OPEN_TOKEN set, requests will be rejected");
    }

    let gateway: Arc<dyn DeviceGateway> = if args.simulate {
        info!("  Using simulated cloud");
        Arc::new(simulated_cloud(&config))
    } else {
        match SwitchBotClient::new(&config.api) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("Failed to create API client: {}", e);
                std::process::exit(1);
            }
        }
    };

    let bridge = Bridge::new(config, gateway, Arc::new(LoggingListener));
    if bridge.start() == 0 {
        warn!("No devices running");
    }

    info!("SwitchBot shadow bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    bridge.shutdown().await;
    info!("Shutdown complete");
}
