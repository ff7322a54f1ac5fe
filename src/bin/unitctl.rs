//! unitctl - CLI for unitd
//!
//! Communicates with the unitd daemon over its control socket.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::net::UnixStream;

use unitd::protocol::{self, Request, Response, StatusInfo, SOCKET_PATH};

#[derive(Parser)]
#[command(name = "unitctl")]
#[command(about = "Control the unitd process supervisor")]
struct Args {
    /// Control socket path
    #[arg(long, global = true, default_value = SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List loaded units
    List,

    /// Start a unit and its dependencies
    Start {
        /// Unit name (e.g., "synapse" or "synapse.service")
        name: String,
    },

    /// Stop a unit
    Stop {
        /// Unit name
        name: String,
    },

    /// Restart a unit
    Restart {
        /// Unit name
        name: String,
    },

    /// Reload a unit in place (falls back to restart)
    Reload {
        /// Unit name
        name: String,
    },

    /// Enable a unit to follow its install targets
    Enable {
        /// Unit name
        name: String,
    },

    /// Disable a unit from its install targets
    Disable {
        /// Unit name
        name: String,
    },

    /// Check if a unit is enabled
    IsEnabled {
        /// Unit name
        name: String,
    },

    /// Show unit status
    Status {
        /// Unit name
        name: String,
    },

    /// Re-read unit files from disk
    DaemonReload,

    /// Check daemon health
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let request = match &args.command {
        Command::List => Request::List,
        Command::Start { name } => Request::Start { name: name.clone() },
        Command::Stop { name } => Request::Stop { name: name.clone() },
        Command::Restart { name } => Request::Restart { name: name.clone() },
        Command::Reload { name } => Request::Reload { name: name.clone() },
        Command::Enable { name } => Request::Enable { name: name.clone() },
        Command::Disable { name } => Request::Disable { name: name.clone() },
        Command::IsEnabled { name } => Request::IsEnabled { name: name.clone() },
        Command::Status { name } => Request::Status { name: name.clone() },
        Command::DaemonReload => Request::ReloadUnitFiles,
        Command::Ping => Request::Ping,
    };

    let mut stream = UnixStream::connect(&args.socket).await.map_err(|e| {
        format!(
            "cannot connect to unitd at {}: {}",
            args.socket.display(),
            e
        )
    })?;

    protocol::write_frame(&mut stream, &request).await?;
    let response: Response = protocol::read_frame(&mut stream).await?;

    match response {
        Response::Ok => println!("OK"),
        Response::Pong => println!("pong"),
        Response::EnabledState(state) => println!("{}", state),
        Response::Paths(paths) => {
            for path in paths {
                println!("{}", path);
            }
        }
        Response::Units(mut units) => {
            units.sort_by(|a, b| a.name.cmp(&b.name));
            println!(
                "{:<40} {:<8} {:<12} {:<12} DESCRIPTION",
                "UNIT", "TYPE", "ACTIVE", "SUB"
            );
            for unit in units {
                println!(
                    "{:<40} {:<8} {:<12} {:<12} {}",
                    unit.name,
                    unit.unit_type,
                    unit.active,
                    unit.sub,
                    unit.description.as_deref().unwrap_or("")
                );
            }
        }
        Response::Status(info) => print_status(&info),
        Response::Error(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_status(info: &StatusInfo) {
    let status_symbol = match info.active.as_str() {
        "active" => "●",
        "inactive" => "○",
        "failed" => "×",
        _ => "◐",
    };

    println!(
        "{} {} - {}",
        status_symbol,
        info.name,
        info.description.as_deref().unwrap_or("(no description)")
    );
    println!("     Active: {} ({})", info.active, info.sub);

    if let Some(pid) = info.main_pid {
        println!("   Main PID: {}", pid);
    }
    if let Some(exec_start) = &info.exec_start {
        println!("  ExecStart: {}", exec_start);
    }
    if let Some(policy) = &info.restart_policy {
        println!("    Restart: {}", policy);
    }
    if info.restart_count > 0 {
        println!("   Restarts: {}", info.restart_count);
    }
    if let Some(code) = info.exit_code {
        println!("  Exit Code: {}", code);
    }
    if let Some(error) = &info.error {
        println!("      Error: {}", error);
    }
}
