//! Remote control for a running dialfm session.
//!
//! One-shot mode sends a single command over the control socket and prints
//! the reply.  Watch mode polls the session status every couple of seconds,
//! which is what a tray or status-bar integration hangs off.

use std::process::ExitCode;
use std::time::Duration;

use tracing::debug;

use dial_proto::ipc::{self, IpcError};
use dial_proto::protocol::ControlCommand;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn usage() -> &'static str {
    "usage: dialfm-tray <command>\n\n\
     commands:\n\
     \x20 play-pause   toggle playback in the running session\n\
     \x20 next         play the next station\n\
     \x20 prev         play the previous station\n\
     \x20 status       print the session status as JSON\n\
     \x20 ping         check that a session is running\n\
     \x20 quit         shut the session down\n\
     \x20 watch        poll status every 2s until interrupted"
}

fn parse_command(name: &str) -> Option<ControlCommand> {
    match name {
        "play-pause" => Some(ControlCommand::PlayPause),
        "next" => Some(ControlCommand::Next),
        "prev" => Some(ControlCommand::Prev),
        "status" => Some(ControlCommand::Status),
        "ping" => Some(ControlCommand::Ping),
        "quit" => Some(ControlCommand::Quit),
        _ => None,
    }
}

async fn send(command: &ControlCommand) -> Result<String, IpcError> {
    let endpoint = ipc::resolve_endpoint()?;
    debug!("sending {} to {}", command.as_str(), endpoint.address);
    ipc::send_command(&endpoint, command.as_str()).await
}

async fn one_shot(command: ControlCommand) -> ExitCode {
    match send(&command).await {
        Ok(data) => {
            if data.is_empty() {
                println!("OK");
            } else {
                println!("{data}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("dialfm-tray: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn watch() -> ExitCode {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut connected = true;
    loop {
        ticker.tick().await;
        match send(&ControlCommand::Status).await {
            Ok(status) => {
                connected = true;
                println!("{status}");
            }
            Err(e) => {
                // Report the transition once, then a bare marker per poll.
                if connected {
                    eprintln!("dialfm-tray: session unreachable: {e}");
                    connected = false;
                } else {
                    println!("(disconnected)");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter.as_str())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let arg = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            eprintln!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match arg.as_str() {
        "watch" => watch().await,
        "-h" | "--help" | "help" => {
            println!("{}", usage());
            ExitCode::SUCCESS
        }
        name => match parse_command(name) {
            Some(command) => one_shot(command).await,
            None => {
                eprintln!("dialfm-tray: unknown command {name:?}\n\n{}", usage());
                ExitCode::FAILURE
            }
        },
    }
}
