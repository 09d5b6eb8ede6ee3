//! The archiving daemon.
//!
//! One Unix-socket listener; every accepted connection gets a task that
//! reads a single frame, builds a fresh multi-storage façade, dispatches the
//! request, writes exactly one reply byte and closes. A connection failure
//! never takes the listener down. A watchdog task keeps systemd informed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use walvault_common::{paths, Config, Error, Result};
use walvault_multistorage::{MultiFolder, MultiStorage, Policy};
use walvault_storage::Folder;
use walvault_wal::{
    asm, fetch_wal, is_valid_wal_object_name, ArchiveStatusManager, Compression,
    DeltaFileManager, PgArchiveStatusManager, WalUploader, DEFAULT_FETCH_TIMEOUT,
};

use crate::protocol::{self, MessageType};

const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);
const WATCHDOG_STATE: &str = "WATCHDOG=1";

/// Long-lived daemon over one configuration.
pub struct Daemon {
    config: Arc<Config>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Bind the socket (replacing a stale file) and serve forever.
    pub async fn run(&self) -> anyhow::Result<()> {
        let socket_path = &self.config.daemon_socket_path;
        if tokio::fs::metadata(socket_path).await.is_ok() {
            tokio::fs::remove_file(socket_path).await?;
        }
        let listener = UnixListener::bind(socket_path)?;
        info!("daemon listening on {socket_path:?}");

        tokio::spawn(watchdog_loop(notify_socket_path(&self.config)));

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let config = Arc::clone(&self.config);
                    tokio::spawn(handle_connection(config, stream));
                }
                Err(e) => {
                    error!("failed to accept connection: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

async fn handle_connection(config: Arc<Config>, mut stream: UnixStream) {
    let reply = match protocol::read_message(&mut stream).await {
        Ok((message_type, body)) => handle_message(&config, message_type, &body).await,
        Err(e) => {
            warn!("failed to read message: {e}");
            MessageType::Error
        }
    };
    if let Err(e) = stream.write_all(&[reply.as_byte()]).await {
        let e = Error::SocketWriteFailed(e.to_string());
        warn!("{e}");
    }
}

/// Dispatch one request. Error details stay in the server log; the wire only
/// carries the typed reply byte.
async fn handle_message(config: &Config, message_type: MessageType, body: &[u8]) -> MessageType {
    match message_type {
        MessageType::Check => match MultiStorage::configure(config, false) {
            Ok(_) => {
                debug!("configuration successfully checked");
                MessageType::Ok
            }
            Err(e) => {
                error!("configuration check failed: {e}");
                MessageType::Error
            }
        },
        MessageType::WalPush => match handle_wal_push(config, body).await {
            Ok(()) => MessageType::Ok,
            Err(e) => {
                error!("file archiving failed: {e}");
                MessageType::Error
            }
        },
        MessageType::WalFetch => match handle_wal_fetch(config, body).await {
            Ok(()) => MessageType::Ok,
            Err(e) if e.is_not_found() => {
                warn!("{e}");
                MessageType::ArchiveNonExistence
            }
            Err(e) => {
                error!("wal fetch failed: {e}");
                MessageType::Error
            }
        },
        other => {
            warn!("unexpected message type: {:#04x}", other.as_byte());
            MessageType::Error
        }
    }
}

async fn handle_wal_push(config: &Config, body: &[u8]) -> Result<()> {
    let wal_name = std::str::from_utf8(body)
        .map_err(|_| Error::frame("wal-push body is not valid UTF-8".to_string()))?;
    if !is_valid_wal_object_name(wal_name) {
        return Err(Error::frame(format!("bad wal file name: {wal_name:?}")));
    }
    let source = config.wal_dir().join(wal_name);
    debug!("starting wal-push: {source:?}");

    let storage = MultiStorage::configure(config, true)?;
    let root = storage.root_folder();
    let folder = storage.use_first_alive(&root).await?;
    let uploader = build_wal_uploader(config, &folder)?;

    let deadline = Instant::now() + config.daemon_wal_upload_timeout();
    match tokio::time::timeout_at(deadline, uploader.upload_wal(&source, deadline)).await {
        Ok(result) => result,
        Err(_) => Err(Error::DeadlineExceeded),
    }
}

/// Bind the upload pipeline for the daemon's lifetime-of-one-request:
/// compressor from config, status managers under the WAL directory, and the
/// delta manager when enabled.
fn build_wal_uploader(config: &Config, folder: &MultiFolder) -> Result<WalUploader> {
    let compression = Compression::from_name(&config.compression)?;
    let wal_dir = config.wal_dir();

    let mut uploader = WalUploader::new(folder.sub_folder(paths::WAL_PATH), compression)
        .with_archive_status(ArchiveStatusManager::new(asm::agent_archive_status_dir(
            &wal_dir,
        )))
        .with_pg_archive_status(PgArchiveStatusManager::new(asm::pg_archive_status_dir(
            &wal_dir,
        )));
    if config.use_wal_delta {
        uploader = uploader.with_delta(DeltaFileManager::new(
            asm::agent_data_dir(&wal_dir).join("walvault_delta"),
        ));
    }
    Ok(uploader)
}

async fn handle_wal_fetch(config: &Config, body: &[u8]) -> Result<()> {
    let (wal_name, dest) = protocol::parse_fetch_body(body)?;
    if !is_valid_wal_object_name(&wal_name) {
        return Err(Error::frame(format!("bad wal file name: {wal_name:?}")));
    }
    debug!("starting wal-fetch: {wal_name} -> {dest}");

    let storage = MultiStorage::configure(config, false)?;
    let root = storage.root_folder().with_policy(Policy::AllAlive);
    let folder = storage.use_all_alive(&root).await?;
    let wal_folder = folder.sub_folder(paths::WAL_PATH);

    match tokio::time::timeout(
        DEFAULT_FETCH_TIMEOUT,
        fetch_wal(wal_folder.as_ref(), &wal_name, Path::new(&dest), None),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::DeadlineExceeded),
    }
}

/// Where watchdog keepalives go: the environment the service manager set,
/// falling back to the configured path.
fn notify_socket_path(config: &Config) -> Option<PathBuf> {
    std::env::var_os("NOTIFY_SOCKET")
        .map(PathBuf::from)
        .or_else(|| config.systemd_notify_socket.clone())
}

async fn watchdog_loop(socket: Option<PathBuf>) {
    let Some(socket) = socket else { return };
    let mut ticker = tokio::time::interval(WATCHDOG_INTERVAL);
    ticker.tick().await; // the first tick fires immediately
    loop {
        ticker.tick().await;
        if let Err(e) = sd_notify(&socket, WATCHDOG_STATE).await {
            warn!("failed to notify {socket:?}: {e}");
        }
    }
}

async fn sd_notify(socket: &Path, state: &str) -> std::io::Result<()> {
    let datagram = tokio::net::UnixDatagram::unbound()?;
    datagram.send_to(state.as_bytes(), socket).await?;
    Ok(())
}
