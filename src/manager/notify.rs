//! Readiness notification side channel
//!
//! Listens on a Unix datagram socket for readiness messages from
//! Type=notify services. The socket path is handed to spawned services
//! through the NOTIFY_SOCKET environment variable. Messages are
//! newline-separated KEY=VALUE fields; READY=1 marks the sender ready.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages from services via the notify socket
#[derive(Debug, Clone)]
pub struct NotifyMessage {
    /// Parsed key-value pairs from the message
    pub fields: HashMap<String, String>,
}

impl NotifyMessage {
    /// Check if this is a READY=1 notification
    pub fn is_ready(&self) -> bool {
        self.fields.get("READY").map(|v| v == "1").unwrap_or(false)
    }

    /// Get STATUS message if present
    pub fn status(&self) -> Option<&str> {
        self.fields.get("STATUS").map(|s| s.as_str())
    }

    /// Get MAINPID if present
    pub fn main_pid(&self) -> Option<u32> {
        self.fields.get("MAINPID").and_then(|s| s.parse().ok())
    }
}

/// Async notify socket using tokio
pub struct NotifyListener {
    /// Socket kept alive to maintain binding (receiver task has its own Arc)
    #[allow(dead_code)]
    socket: Arc<tokio::net::UnixDatagram>,
    socket_path: PathBuf,
}

impl NotifyListener {
    /// Create a new notify socket and spawn the receiver task
    /// Returns the listener (for socket_path) and a channel receiver
    pub fn new(socket_path: &Path) -> std::io::Result<(Self, mpsc::Receiver<NotifyMessage>)> {
        // Remove existing socket if present
        let _ = std::fs::remove_file(socket_path);

        // Create parent directory if needed
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create the socket
        let socket = tokio::net::UnixDatagram::bind(socket_path)?;

        // Make it world-writable so services can send to it
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o777))?;

        let socket = Arc::new(socket);
        let socket_clone = Arc::clone(&socket);

        // Spawn receiver task
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match socket_clone.recv(&mut buf).await {
                    Ok(len) => {
                        if let Ok(msg) = std::str::from_utf8(&buf[..len]) {
                            let notify_msg = parse_notify_message(msg);
                            if tx.send(notify_msg).await.is_err() {
                                break; // Channel closed
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("Notify socket error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                socket,
                socket_path: socket_path.to_path_buf(),
            },
            rx,
        ))
    }

    /// Get the socket path for passing to services
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for NotifyListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Parse a notify message into key-value pairs
fn parse_notify_message(msg: &str) -> NotifyMessage {
    let mut fields = HashMap::new();

    for line in msg.lines() {
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    NotifyMessage { fields }
}

/// Default socket path
pub const NOTIFY_SOCKET_PATH: &str = "/run/unitd/notify";
