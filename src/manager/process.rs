//! Process spawning and command execution
//!
//! Builds the merged environment, establishes filesystem paths, drops
//! privileges, and runs the pre-start / start / reload command lines of
//! a service.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::units::Service;

/// Base directory for RuntimeDirectory= entries
pub const RUNTIME_DIR_BASE: &str = "/run";

/// Options for spawning a service
#[derive(Default)]
pub struct SpawnOptions {
    /// Path to NOTIFY_SOCKET for Type=notify services
    pub notify_socket: Option<String>,
}

/// Run every ExecStartPre command to completion, in order.
/// A non-zero exit aborts the activation sequence.
pub async fn run_exec_pre(service: &Service) -> Result<(), SpawnError> {
    let env = build_environment(service)?;
    // Filesystem paths are established before any command runs
    prepare_runtime_directory(service)?;

    for cmdline in &service.service.exec_start_pre {
        let mut cmd = command_for(service, cmdline, &env)?;
        let status = cmd
            .status()
            .await
            .map_err(|e| SpawnError::Spawn(e.to_string()))?;

        if !status.success() {
            return Err(SpawnError::PreStartFailed {
                command: cmdline.clone(),
                code: status.code().unwrap_or(-1),
            });
        }
    }

    Ok(())
}

/// Spawn the main process for a service
pub fn spawn_service(service: &Service, options: &SpawnOptions) -> Result<Child, SpawnError> {
    let env = build_environment(service)?;
    prepare_runtime_directory(service)?;

    let mut cmd = command_for(service, &service.service.exec_start, &env)?;

    // Hand the readiness socket to Type=notify services
    if let Some(socket_path) = &options.notify_socket {
        cmd.env("NOTIFY_SOCKET", socket_path);
    }

    let child = cmd.spawn().map_err(|e| SpawnError::Spawn(e.to_string()))?;

    Ok(child)
}

/// Run every ExecReload command to completion, in order.
/// The main process stays alive; $MAINPID expands to its pid.
pub async fn run_exec_reload(service: &Service, main_pid: u32) -> Result<(), SpawnError> {
    let env = build_environment(service)?;

    for cmdline in &service.service.exec_reload {
        let cmdline = cmdline.replace("$MAINPID", &main_pid.to_string());
        let mut cmd = command_for(service, &cmdline, &env)?;
        let status = cmd
            .status()
            .await
            .map_err(|e| SpawnError::Spawn(e.to_string()))?;

        if !status.success() {
            return Err(SpawnError::ReloadFailed {
                command: cmdline.clone(),
                code: status.code().unwrap_or(-1),
            });
        }
    }

    Ok(())
}

/// Build a Command with the service's identity, directory, and environment
fn command_for(
    service: &Service,
    cmdline: &str,
    env: &[(String, String)],
) -> Result<Command, SpawnError> {
    let (program, args) = parse_command(cmdline)?;

    let mut cmd = Command::new(&program);
    cmd.args(&args);

    // Set working directory
    if let Some(wd) = &service.service.working_directory {
        cmd.current_dir(wd);
    }

    // Merged environment: inherited, then Environment=, then EnvironmentFile=
    cmd.env_clear();
    cmd.envs(std::env::vars());
    for (key, value) in env {
        cmd.env(key, value);
    }

    // Resolve identity before forking
    let uid = match &service.service.user {
        Some(user) => Some(resolve_user(user).ok_or_else(|| SpawnError::UnknownUser(user.clone()))?),
        None => None,
    };
    let gid = match &service.service.group {
        Some(group) => {
            Some(resolve_group(group).ok_or_else(|| SpawnError::UnknownGroup(group.clone()))?)
        }
        None => None,
    };

    // Apply identity in pre_exec (runs after fork, before exec)
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(move || {
            if let Some(gid) = gid {
                nix::unistd::setgid(nix::unistd::Gid::from_raw(gid))?;
            }
            if let Some(uid) = uid {
                nix::unistd::setuid(nix::unistd::Uid::from_raw(uid))?;
            }
            Ok(())
        });
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    Ok(cmd)
}

/// Merge Environment= pairs and EnvironmentFile= contents.
/// Files are read at spawn time and win over inline pairs. A file marked
/// optional (leading `-` in the unit file) is skipped when missing; a
/// required file that is missing fails the activation.
fn build_environment(service: &Service) -> Result<Vec<(String, String)>, SpawnError> {
    let mut env: Vec<(String, String)> = service.service.environment.clone();

    for env_file in &service.service.environment_file {
        match load_env_file(&env_file.path) {
            Ok(vars) => env.extend(vars),
            Err(e) if env_file.optional && e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "Optional environment file {} missing, skipping",
                    env_file.path.display()
                );
            }
            Err(e) => {
                return Err(SpawnError::EnvironmentFile {
                    path: env_file.path.display().to_string(),
                    source: e,
                });
            }
        }
    }

    Ok(env)
}

/// Create the RuntimeDirectory under /run and hand it to the service user
fn prepare_runtime_directory(service: &Service) -> Result<(), SpawnError> {
    let Some(name) = &service.service.runtime_directory else {
        return Ok(());
    };

    let path = Path::new(RUNTIME_DIR_BASE).join(name);
    std::fs::create_dir_all(&path).map_err(|e| SpawnError::RuntimeDirectory {
        path: path.display().to_string(),
        source: e,
    })?;

    // Ownership follows the service identity; best effort when unprivileged
    let uid = service.service.user.as_deref().and_then(resolve_user);
    let gid = service.service.group.as_deref().and_then(resolve_group);
    if uid.is_some() || gid.is_some() {
        if let Err(e) = nix::unistd::chown(
            &path,
            uid.map(nix::unistd::Uid::from_raw),
            gid.map(nix::unistd::Gid::from_raw),
        ) {
            log::warn!("Failed to chown {}: {}", path.display(), e);
        }
    }

    Ok(())
}

/// Parse a command line into program and arguments
fn parse_command(cmd: &str) -> Result<(String, Vec<String>), SpawnError> {
    // A leading - suppresses failure handling in other supervisors; strip it
    let cmd = cmd.trim_start_matches('-');

    let parts = shlex::split(cmd).ok_or_else(|| SpawnError::InvalidCommand(cmd.to_string()))?;

    if parts.is_empty() {
        return Err(SpawnError::InvalidCommand(cmd.to_string()));
    }

    let program = parts[0].clone();
    let args = parts[1..].to_vec();

    Ok((program, args))
}

/// Load environment variables from a KEY=VALUE file
fn load_env_file(path: &Path) -> Result<HashMap<String, String>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut vars = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            // Remove quotes from value
            let value = value.trim_matches('"').trim_matches('\'');
            vars.insert(key.to_string(), value.to_string());
        }
    }

    Ok(vars)
}

/// Resolve username to UID
#[cfg(unix)]
fn resolve_user(user: &str) -> Option<u32> {
    // Try numeric UID first
    if let Ok(uid) = user.parse::<u32>() {
        return Some(uid);
    }

    // Look up by name
    use std::ffi::CString;
    let name = CString::new(user).ok()?;
    unsafe {
        let pwd = libc::getpwnam(name.as_ptr());
        if pwd.is_null() {
            None
        } else {
            Some((*pwd).pw_uid)
        }
    }
}

/// Resolve group name to GID
#[cfg(unix)]
fn resolve_group(group: &str) -> Option<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Some(gid);
    }

    use std::ffi::CString;
    let name = CString::new(group).ok()?;
    unsafe {
        let grp = libc::getgrnam(name.as_ptr());
        if grp.is_null() {
            None
        } else {
            Some((*grp).gr_gid)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Pre-start command '{command}' failed with exit code {code}")]
    PreStartFailed { command: String, code: i32 },

    #[error("Reload command '{command}' failed with exit code {code}")]
    ReloadFailed { command: String, code: i32 },

    #[error("Failed to read environment file {path}: {source}")]
    EnvironmentFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to create runtime directory {path}: {source}")]
    RuntimeDirectory {
        path: String,
        source: std::io::Error,
    },

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),
}
