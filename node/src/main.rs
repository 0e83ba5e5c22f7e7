mod audio;
mod config;
mod gate;
mod logging;
mod scheduler;
mod spectrogram;

use audio::SimulatedDriver;
use clap::Parser;
use gate::AnomalyGate;
use scheduler::{NodeScheduler, NodeSchedulerConfig};
use wire::radio::UdpRadioLink;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Sensor node: audio capture, mel-spectrogram synthesis, anomaly gating,
/// and radio framing toward the hub.
#[derive(Parser, Debug)]
#[command(name = "sensor-node", version)]
struct Cli {
    /// Node identifier carried in every packet body/hash.
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// Local UDP address standing in for the radio's RF front end.
    #[arg(long, default_value = "0.0.0.0:9000")]
    bind: SocketAddr,

    /// Hub's UDP address.
    #[arg(long, default_value = "127.0.0.1:9100")]
    hub: SocketAddr,

    /// Tick interval, i.e. how often a PCM window is captured and
    /// evaluated by the anomaly gate.
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let app_config = config::Config::from_env(cli.node_id.clone());

    tracing::info!(node_id = %cli.node_id, bind = %cli.bind, hub = %cli.hub, "starting sensor node");

    let driver = SimulatedDriver::silence(1 << 20);
    let radio = UdpRadioLink::bind(cli.bind, cli.hub)?;
    let gate = AnomalyGate::new(app_config.gate_config());

    let mut scheduler = NodeScheduler::new(
        NodeSchedulerConfig {
            node_id: app_config.node_id.clone(),
            pcm_window_len: 16_000,
            heartbeat_interval: app_config.heartbeat_interval(),
            lat: app_config.lat,
            lon: app_config.lon,
        },
        driver,
        gate,
        radio,
    );

    let tick_interval = Duration::from_millis(cli.tick_ms);
    loop {
        let now = Instant::now();
        let state = scheduler.tick(now);
        tracing::debug!(?state, "tick");
        std::thread::sleep(tick_interval);
    }
}
