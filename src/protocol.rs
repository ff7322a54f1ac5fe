//! IPC protocol for unitd daemon communication
//!
//! Defines request/response types for CLI ↔ daemon communication,
//! serialized as length-prefixed MessagePack frames over a Unix stream
//! socket.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const SOCKET_PATH: &str = "/run/unitd.sock";

/// Largest accepted frame; anything bigger is a protocol error
const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Request from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// List all loaded units
    List,
    /// Start a unit (with its dependencies)
    Start { name: String },
    /// Stop a unit
    Stop { name: String },
    /// Restart a unit
    Restart { name: String },
    /// Reload a unit in place (or restart if it has no reload command)
    Reload { name: String },
    /// Enable a unit (create install symlinks)
    Enable { name: String },
    /// Disable a unit (remove install symlinks)
    Disable { name: String },
    /// Check if unit is enabled
    IsEnabled { name: String },
    /// Get unit status
    Status { name: String },
    /// Re-read unit files from disk
    ReloadUnitFiles,
    /// Ping (health check)
    Ping,
}

/// Unit info returned by list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitInfo {
    pub name: String,
    pub unit_type: String,
    pub active: String,
    pub sub: String,
    pub description: Option<String>,
}

/// Detailed status for one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub name: String,
    pub unit_type: String,
    pub description: Option<String>,
    pub active: String,
    pub sub: String,
    pub main_pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub restart_count: u32,
    pub exec_start: Option<String>,
    pub restart_policy: Option<String>,
}

/// Response from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Success with no data
    Ok,
    /// List of units
    Units(Vec<UnitInfo>),
    /// Single unit status
    Status(StatusInfo),
    /// Changed symlink paths (enable/disable)
    Paths(Vec<String>),
    /// Enabled state (enabled, disabled, static)
    EnabledState(String),
    /// Error with message
    Error(String),
    /// Pong (response to ping)
    Pong,
}

/// Write one length-prefixed MessagePack frame
pub async fn write_frame<W, T>(stream: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = rmp_serde::to_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await
}

/// Read one length-prefixed MessagePack frame
pub async fn read_frame<R, T>(stream: &mut R) -> std::io::Result<T>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    rmp_serde::from_slice(&payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
