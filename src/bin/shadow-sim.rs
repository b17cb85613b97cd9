//! Scripted demo of the shadow engine against a simulated cloud.
//!
//! Usage:
//!   cargo run --bin shadow-sim
//!
//! Drives a simulated curtain (with a slow motor start) and an infrared
//! air purifier through the engine and logs every shadow update.

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use switchbot_shadow_bridge::config::{Config, DeviceConfig};
use switchbot_shadow_bridge::device::RemoteKey;
use switchbot_shadow_bridge::engine::Bridge;
use switchbot_shadow_bridge::input::SimulatedCloud;
use switchbot_shadow_bridge::shadow::{ChannelListener, DeviceId, DeviceKind, ShadowEvent, Target};

const CURTAIN: &str = "SIM-CURTAIN";
const PURIFIER: &str = "SIM-PURIFIER";

fn main() {
    // .env is applied while the process is still single-threaded.
    switchbot_shadow_bridge::config::load_dotenv();

    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(run()),
        Err(e) => eprintln!("Failed to start Tokio runtime: {}", e),
    }
}

async fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    info!("Starting shadow simulation");

    let mut config = Config::default();
    config.options.refresh_rate = Some(120);
    config.options.moving_refresh_rate = Some(2);
    config.options.push_rate = Some(0.5);
    config.options.curtain.set_min = Some(3);
    config.options.curtain.set_max = Some(97);
    config.devices = vec![
        DeviceConfig::new(CURTAIN, DeviceKind::Curtain),
        DeviceConfig::new(PURIFIER, DeviceKind::AirPurifier),
    ];

    // 4s start delay: the backend reports idle while the motor spins up.
    let cloud = Arc::new(
        SimulatedCloud::new()
            .with_curtain_motion(CURTAIN, 20, 5.0, Duration::from_secs(4))
            .with_air_purifier(PURIFIER),
    );

    let (listener, mut events) = ChannelListener::new();
    let bridge = Arc::new(Bridge::new(config, cloud.clone(), Arc::new(listener)));
    bridge.start();

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ShadowEvent::Updated { device, shadow } => info!(
                    "[Sim] {} v{}: position {:?} target {:?} motion {} (engine {}) power {:?}",
                    device,
                    shadow.version,
                    shadow.observed.position,
                    shadow.effective_target(),
                    shadow.reported_motion,
                    shadow.motion_state,
                    shadow.observed.power,
                ),
                ShadowEvent::Error {
                    device,
                    kind,
                    message,
                } => warn!("[Sim] {} {} error: {}", device, kind, message),
            }
        }
    });

    let curtain = DeviceId::new(CURTAIN);
    let purifier = DeviceId::new(PURIFIER);

    tokio::time::sleep(Duration::from_secs(1)).await;

    // Rapid slider drags collapse into one command.
    for target in [40, 60, 80] {
        if let Err(e) = bridge.on_intent_change(&curtain, Target::Position(target)) {
            warn!("Intent rejected: {}", e);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    if let Err(e) = bridge.on_intent_change(&purifier, Target::Power(true)) {
        warn!("Intent rejected: {}", e);
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    if let Err(e) = bridge.send_key(&purifier, RemoteKey::VolumeUp).await {
        warn!("Key failed: {}", e);
    }

    tokio::time::sleep(Duration::from_secs(25)).await;

    info!(
        "Curtain finished at {:?}, {} commands sent",
        cloud.curtain_position(&curtain),
        cloud.writes(&curtain).len()
    );

    bridge.shutdown().await;
    drop(bridge);
    let _ = event_task.await;
    info!("Simulation complete");
}
