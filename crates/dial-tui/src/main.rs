mod app;
mod player;
mod theme;
mod ui;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use dial_proto::favorites::Favorites;
use dial_proto::radio::RadioClient;
use dial_proto::{ipc, USER_AGENT};

use crate::player::{Backend, CompositeBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = dial_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("dialfm.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG overrides; default keeps HTTP client internals quiet.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    info!("dialfm starting");

    let config = dial_proto::config::load_config();

    let (favorites, fav_err) = match Favorites::load() {
        Ok(f) => (Some(f), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let client = match RadioClient::new(USER_AGENT).await {
        Ok(c) => Some(Arc::new(c)),
        Err(e) => {
            warn!("station directory unavailable: {}", e);
            None
        }
    };

    let (backend, player_err): (Option<Arc<dyn Backend>>, Option<String>) =
        match CompositeBackend::detect() {
            Ok(b) => (Some(Arc::new(b)), None),
            Err(e) => (None, Some(e.to_string())),
        };

    // Control channel: the accept loop feeds requests into the event loop.
    let (cmd_tx, cmd_rx) = mpsc::channel(ipc::COMMAND_QUEUE_DEPTH);
    let endpoint = match ipc::listen().await {
        Ok((listener, endpoint)) => {
            ipc::start_server(listener, cmd_tx);
            info!("control endpoint at {}", endpoint.address);
            Some(endpoint)
        }
        Err(e) => {
            warn!("control endpoint unavailable: {}", e);
            None
        }
    };

    let mut app = app::App::new(client, backend, favorites, player_err, &config.theme);
    if let Some(e) = fav_err {
        app.err_msg = if app.err_msg.is_empty() {
            e
        } else {
            format!("{} | {}", app.err_msg, e)
        };
    }
    let result = app.run(cmd_rx).await;

    if let Some(endpoint) = endpoint {
        ipc::cleanup(&endpoint);
    }
    result
}
