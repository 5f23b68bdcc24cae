//! Local control channel between the session process and the tray/remote.
//!
//! The session process owns a listening endpoint (unix domain socket, or a
//! loopback TCP port recorded in a file on platforms without unix sockets).
//! Each connection carries exactly one command line and one reply line.
//!
//! ```text
//!   remote ── dial ──► listener ── PendingRequest(mpsc) ──► event loop
//!                         ▲                                     │
//!                         └───────── oneshot reply ─────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::platform;
use crate::protocol::{ControlCommand, ControlReply};

/// Dial timeout for the remote side.  A wedged session must not hang the
/// remote process.
pub const DIAL_TIMEOUT: Duration = Duration::from_millis(500);
/// Read timeout for the remote side, applied to the single reply line.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);
/// How long a connection handler waits for the dispatcher's reply before
/// answering with an error and closing.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
/// Capacity of the command queue into the session event loop.
pub const COMMAND_QUEUE_DEPTH: usize = 16;

const SOCKET_FILE: &str = "ctl.sock";
#[cfg(not(unix))]
const PORT_FILE: &str = "ctl.port";

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("session endpoint not found: {0}")]
    NotFound(String),
    #[error("dial timeout")]
    DialTimeout,
    #[error("read timeout")]
    ReadTimeout,
    #[error("session replied: {0}")]
    Remote(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Unix domain socket; `address` is the socket path.
    Stream,
    /// Loopback TCP; `address` is `host:port`.
    Loopback,
}

/// Where the control server listens.  Stable for the lifetime of one session
/// and discoverable by any later remote process.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub transport: Transport,
    pub address: String,
}

/// An in-flight control command awaiting dispatch inside the session process.
#[derive(Debug)]
pub struct PendingRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlReply>,
}

pub enum Listener {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// Resolve the endpoint a remote process should dial.
#[cfg(unix)]
pub fn resolve_endpoint() -> Result<Endpoint, IpcError> {
    Ok(Endpoint {
        transport: Transport::Stream,
        address: socket_path().display().to_string(),
    })
}

/// Resolve the endpoint a remote process should dial.  On platforms without
/// unix sockets the session writes its loopback port to a small address file.
#[cfg(not(unix))]
pub fn resolve_endpoint() -> Result<Endpoint, IpcError> {
    let path = port_file_path();
    let raw = std::fs::read_to_string(&path)
        .map_err(|_| IpcError::NotFound(path.display().to_string()))?;
    let port: u16 = raw
        .trim()
        .parse()
        .map_err(|_| IpcError::NotFound(format!("bad port file {}", path.display())))?;
    Ok(Endpoint {
        transport: Transport::Loopback,
        address: format!("127.0.0.1:{port}"),
    })
}

fn socket_path() -> PathBuf {
    platform::config_dir().join(SOCKET_FILE)
}

#[cfg(not(unix))]
fn port_file_path() -> PathBuf {
    platform::config_dir().join(PORT_FILE)
}

/// Bind the session's listening resource and return it with its endpoint.
/// A stale socket file from a crashed session is removed first.  The socket
/// (and its parent directory) are restricted to the owning user.
#[cfg(unix)]
pub async fn listen() -> Result<(Listener, Endpoint), IpcError> {
    listen_at(&socket_path()).await
}

/// Bind at an explicit socket path.  Split out so tests can listen somewhere
/// disposable instead of the real config dir.
#[cfg(unix)]
pub async fn listen_at(path: &std::path::Path) -> Result<(Listener, Endpoint), IpcError> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    let endpoint = Endpoint {
        transport: Transport::Stream,
        address: path.display().to_string(),
    };
    info!("control socket listening at {}", endpoint.address);
    Ok((Listener::Unix(listener), endpoint))
}

#[cfg(not(unix))]
pub async fn listen() -> Result<(Listener, Endpoint), IpcError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let path = port_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, format!("{port}\n"))?;

    let endpoint = Endpoint {
        transport: Transport::Loopback,
        address: format!("127.0.0.1:{port}"),
    };
    info!("control socket listening at {}", endpoint.address);
    Ok((Listener::Tcp(listener), endpoint))
}

/// Remove the endpoint's on-disk footprint.  Best effort: a missing file or
/// an empty address is not an error.
pub fn cleanup(endpoint: &Endpoint) {
    if endpoint.address.is_empty() {
        return;
    }
    match endpoint.transport {
        Transport::Stream => {
            let _ = std::fs::remove_file(&endpoint.address);
        }
        Transport::Loopback => {
            #[cfg(not(unix))]
            {
                let _ = std::fs::remove_file(port_file_path());
            }
        }
    }
}

/// Run the accept loop.  Each accepted connection is served by its own task;
/// parsed commands are handed to the session event loop through `cmd_tx`.
pub fn start_server(
    listener: Listener,
    cmd_tx: mpsc::Sender<PendingRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match listener {
            #[cfg(unix)]
            Listener::Unix(listener) => loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let tx = cmd_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, tx).await;
                        });
                    }
                    Err(e) => {
                        // Transient per-connection failures must not kill
                        // remote control for the rest of the session.
                        warn!("control socket accept failed: {}", e);
                    }
                }
            },
            Listener::Tcp(listener) => loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let tx = cmd_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, tx).await;
                        });
                    }
                    Err(e) => {
                        // Transient per-connection failures must not kill
                        // remote control for the rest of the session.
                        warn!("control socket accept failed: {}", e);
                    }
                }
            },
        }
    })
}

/// Per-connection state machine: read one line, parse, dispatch, reply, close.
async fn handle_connection<S>(stream: S, cmd_tx: mpsc::Sender<PendingRequest>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => return, // client connected and went away
        Ok(_) => {}
        Err(e) => {
            debug!("control read error: {}", e);
            return;
        }
    }

    let reply = match ControlCommand::parse(&line) {
        Err(e) => ControlReply::err(e.to_string()),
        Ok(command) => {
            debug!("control command: {}", command.as_str());
            let (reply_tx, reply_rx) = oneshot::channel();
            let request = PendingRequest {
                command,
                reply: reply_tx,
            };
            if cmd_tx.send(request).await.is_err() {
                ControlReply::err("session shutting down")
            } else {
                match tokio::time::timeout(REPLY_TIMEOUT, reply_rx).await {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(_)) => ControlReply::err("session shutting down"),
                    Err(_) => ControlReply::err("dispatch timeout"),
                }
            }
        }
    };

    let mut encoded = reply.encode();
    encoded.push('\n');
    if let Err(e) = write_half.write_all(encoded.as_bytes()).await {
        debug!("control reply write failed: {}", e);
    }
}

/// Dial the session and exchange one command for one reply payload.
/// `Ok("")` means a plain `OK`; an `ERR` reply becomes `IpcError::Remote`.
pub async fn send_command(endpoint: &Endpoint, command: &str) -> Result<String, IpcError> {
    match endpoint.transport {
        #[cfg(unix)]
        Transport::Stream => {
            let stream = tokio::time::timeout(DIAL_TIMEOUT, UnixStream::connect(&endpoint.address))
                .await
                .map_err(|_| IpcError::DialTimeout)??;
            exchange(stream, command).await
        }
        #[cfg(not(unix))]
        Transport::Stream => Err(IpcError::NotFound(endpoint.address.clone())),
        Transport::Loopback => {
            let stream = tokio::time::timeout(
                DIAL_TIMEOUT,
                tokio::net::TcpStream::connect(&endpoint.address),
            )
            .await
            .map_err(|_| IpcError::DialTimeout)??;
            exchange(stream, command).await
        }
    }
}

async fn exchange<S>(stream: S, command: &str) -> Result<String, IpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);

    write_half
        .write_all(format!("{command}\n").as_bytes())
        .await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| IpcError::ReadTimeout)??;

    ControlReply::decode(&line).map_err(IpcError::Remote)
}
