mod classifier;
mod classify_worker;
mod config;
mod error;
mod event_bus;
mod http;
mod logging;
mod radio_rx;
mod reassembler;
mod reassembler_task;
mod render;
mod store;
mod sync_worker;

use classifier::cloud::CloudClassifier;
use classifier::dispatcher::Dispatcher;
use classifier::local::LocalClassifier;
use clap::Parser;
use event_bus::EventBus;
use http::AppState;
use std::sync::Arc;
use store::Store;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Central hub: radio ingest, packet reassembly, tiered classification,
/// and the live event/HTTP surface.
#[derive(Parser, Debug)]
#[command(name = "guardian-hub", version)]
struct Cli {
    /// UDP address the radio RX task listens on.
    #[arg(long, default_value = "0.0.0.0:9100")]
    radio_bind: String,

    /// HTTP bind address; overrides `HUB_HTTP_BIND` when set.
    #[arg(long)]
    http_bind: Option<String>,

    /// SQLite database path; overrides `HUB_DB_PATH` when set.
    #[arg(long)]
    db_path: Option<String>,

    /// Classifier worker pool size.
    #[arg(long, default_value_t = 2)]
    classify_workers: usize,

    /// Fast-cloud classifier endpoint.
    #[arg(long, default_value = "http://127.0.0.1:9200/classify/fast")]
    fast_endpoint: String,

    /// Deep-cloud classifier endpoint.
    #[arg(long, default_value = "http://127.0.0.1:9200/classify/deep")]
    deep_endpoint: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::Config::from_env();
    if let Some(http_bind) = cli.http_bind.clone() {
        cfg.http_bind = http_bind;
    }
    if let Some(db_path) = cli.db_path.clone() {
        cfg.db_path = db_path;
    }

    logging::init(&cfg.data_dir)?;
    tracing::info!(radio_bind = %cli.radio_bind, http_bind = %cfg.http_bind, db_path = %cfg.db_path, "starting hub");

    let store = Store::connect(&cfg.db_path).await?;
    let event_bus = EventBus::new();

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(LocalClassifier),
        Arc::new(CloudClassifier::fast(cli.fast_endpoint)),
        Arc::new(CloudClassifier::deep(cli.deep_endpoint)),
        cfg.deep_rate_limit,
        cfg.deep_rate_window,
    ));

    let shutdown = CancellationToken::new();

    let (rx_tx, rx_rx) = mpsc::channel(radio_rx::CHANNEL_CAPACITY);
    let (classify_tx, classify_rx) = mpsc::channel(64);

    let radio_task = tokio::spawn(radio_rx::run(cli.radio_bind.clone(), rx_tx, shutdown.clone()));

    let reassembler_deps = reassembler_task::ReassemblerTaskDeps {
        store: store.clone(),
        event_bus: event_bus.clone(),
        spectrograms_dir: cfg.spectrograms_dir.clone(),
        classify_tx,
    };
    let reassembler_handle =
        tokio::spawn(reassembler_task::run(rx_rx, reassembler_deps, cfg.session_timeout, shutdown.clone()));

    let classify_rx: classify_worker::SharedReceiver = Arc::new(tokio::sync::Mutex::new(classify_rx));
    let mut classify_handles = Vec::new();
    for worker_id in 0..cli.classify_workers {
        let classify_rx = classify_rx.clone();
        let dispatcher = dispatcher.clone();
        let store = store.clone();
        let event_bus = event_bus.clone();
        let ai_mode = cfg.ai_mode.clone();
        let shutdown = shutdown.clone();
        tracing::debug!(worker_id, "spawning classifier worker");
        classify_handles.push(tokio::spawn(classify_worker::run(
            classify_rx,
            dispatcher,
            store,
            event_bus,
            ai_mode,
            shutdown,
        )));
    }

    let sync_handle =
        tokio::spawn(sync_worker::run(store.clone(), event_bus.clone(), dispatcher.clone(), shutdown.clone()));

    let app_state = AppState { store: store.clone(), event_bus: event_bus.clone(), dispatcher, config: Arc::new(cfg.clone()) };
    let http_bind = cfg.http_bind.clone();
    let http_shutdown = shutdown.clone();
    let http_handle = tokio::spawn(async move { http::run(app_state, &http_bind, http_shutdown).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    let _ = radio_task.await;
    let _ = reassembler_handle.await;
    for handle in classify_handles {
        let _ = handle.await;
    }
    let _ = sync_handle.await;
    let _ = http_handle.await;

    Ok(())
}
