//! unitd - minimal declarative process supervisor daemon
//!
//! Listens on /run/unitd.sock for commands from unitctl and runs the
//! supervision loop: reaping children, collecting readiness messages,
//! enforcing readiness deadlines, and issuing scheduled restarts.

use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;

use unitd::manager::{Manager, NOTIFY_SOCKET_PATH};
use unitd::protocol::{self, Request, Response, StatusInfo, UnitInfo, SOCKET_PATH};

#[derive(Parser)]
#[command(name = "unitd")]
#[command(about = "Minimal declarative process supervisor")]
#[command(
    long_about = "unitd supervises long-running processes described by \
    declarative unit files. It listens on a control socket for commands \
    from unitctl."
)]
struct Args {
    /// Control socket path
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,

    /// Unit search path (may be given multiple times)
    #[arg(long = "unit-path")]
    unit_paths: Vec<PathBuf>,

    /// Readiness notification socket path
    #[arg(long, default_value = NOTIFY_SOCKET_PATH)]
    notify_socket: PathBuf,

    /// Start this unit (and its dependencies) at startup
    #[arg(long)]
    boot: Option<String>,
}

/// Shared manager state accessible from the control connections
type SharedManager = Arc<RwLock<Manager>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut manager = if args.unit_paths.is_empty() {
        Manager::new()
    } else {
        Manager::with_unit_paths(args.unit_paths.clone())
    };

    if let Err(e) = manager.init_notify_socket_at(&args.notify_socket) {
        log::warn!(
            "Readiness socket unavailable: {} (Type=notify units cannot signal READY)",
            e
        );
    }

    if let Some(target) = &args.boot {
        match manager.start_with_deps(target).await {
            Ok(started) => info!("Started {} unit(s) for {}", started.len(), target),
            Err(e) => log::error!("Failed to start {}: {}", target, e),
        }
    }

    let manager: SharedManager = Arc::new(RwLock::new(manager));

    // Control socket
    let _ = std::fs::remove_file(&args.socket);
    if let Some(parent) = args.socket.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&args.socket)?;
    info!("Listening on {}", args.socket.display());

    // Supervision tick
    let tick_mgr = Arc::clone(&manager);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(100));
        loop {
            interval.tick().await;
            let mut mgr = tick_mgr.write().await;
            mgr.reap().await;
            mgr.process_notify().await;
            mgr.process_start_timeouts().await;
            mgr.process_restarts().await;
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let mgr = Arc::clone(&manager);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, mgr).await {
                                log::debug!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => log::warn!("Accept failed: {}", e),
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    manager.write().await.stop_all().await;
    let _ = std::fs::remove_file(&args.socket);

    Ok(())
}

/// Serve one control connection until the client disconnects
async fn handle_connection(mut stream: UnixStream, manager: SharedManager) -> std::io::Result<()> {
    loop {
        let request: Request = match protocol::read_frame(&mut stream).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = handle_request(request, &manager).await;
        protocol::write_frame(&mut stream, &response).await?;
    }
}

async fn handle_request(request: Request, manager: &SharedManager) -> Response {
    let mut mgr = manager.write().await;

    match request {
        Request::List => {
            let units = mgr
                .list_units()
                .into_iter()
                .map(|(name, unit, state)| UnitInfo {
                    name: name.clone(),
                    unit_type: unit.unit_type().to_string(),
                    active: state.map(|s| s.active.as_str()).unwrap_or("inactive").to_string(),
                    sub: state.map(|s| s.sub.as_str()).unwrap_or("dead").to_string(),
                    description: unit.unit_section().description.clone(),
                })
                .collect();
            Response::Units(units)
        }
        Request::Start { name } => match mgr.start_with_deps(&name).await {
            Ok(_) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Stop { name } => match mgr.stop(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Restart { name } => match mgr.restart(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Reload { name } => match mgr.reload(&name).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Enable { name } => match mgr.enable(&name).await {
            Ok(paths) => Response::Paths(
                paths.iter().map(|p| p.display().to_string()).collect(),
            ),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Disable { name } => match mgr.disable(&name).await {
            Ok(paths) => Response::Paths(
                paths.iter().map(|p| p.display().to_string()).collect(),
            ),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::IsEnabled { name } => match mgr.is_enabled(&name).await {
            Ok(state) => Response::EnabledState(state),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Status { name } => {
            // Make sure the definition is loaded so status covers units
            // that were never started
            if mgr.get_unit(&name).is_none() {
                if let Err(e) = mgr.load(&name).await {
                    return Response::Error(e.to_string());
                }
            }

            let Some(unit) = mgr.get_unit(&name) else {
                return Response::Error(format!("Unit not found: {}", name));
            };

            let state = mgr.status(&name);
            let service = unit.as_service();

            Response::Status(StatusInfo {
                name: unit.name().to_string(),
                unit_type: unit.unit_type().to_string(),
                description: unit.unit_section().description.clone(),
                active: state.map(|s| s.active.as_str()).unwrap_or("inactive").to_string(),
                sub: state.map(|s| s.sub.as_str()).unwrap_or("dead").to_string(),
                main_pid: state.and_then(|s| s.main_pid),
                exit_code: state.and_then(|s| s.exit_code),
                error: state.and_then(|s| s.error.clone()),
                restart_count: state.map(|s| s.restart_count).unwrap_or(0),
                exec_start: service.map(|s| s.service.exec_start.clone()),
                restart_policy: service.map(|s| format!("{:?}", s.service.restart)),
            })
        }
        Request::ReloadUnitFiles => match mgr.reload_unit_files().await {
            Ok(_) => Response::Ok,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Ping => Response::Pong,
    }
}
