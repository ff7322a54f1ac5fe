//! Service manager
//!
//! Loads, starts, stops, reloads, and monitors services and targets.

mod deps;
mod notify;
mod process;
mod state;

pub use deps::{CycleError, DepGraph};
pub use notify::{NotifyListener, NotifyMessage, NOTIFY_SOCKET_PATH};
pub use process::{SpawnError, SpawnOptions, RUNTIME_DIR_BASE};
pub use state::{ActiveState, SubState, UnitState};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Child;
use tokio::sync::mpsc;

use crate::units::{self, RestartPolicy, Service, ServiceType, Unit, DEFAULT_TIMEOUT_STOP};

/// Service manager that tracks and controls units (services and targets)
pub struct Manager {
    /// Loaded unit definitions (services and targets)
    units: HashMap<String, Unit>,
    /// Runtime state for each unit
    states: HashMap<String, UnitState>,
    /// Running child processes (only for services)
    processes: HashMap<String, Child>,
    /// Unit search paths
    unit_paths: Vec<PathBuf>,
    /// Notify socket listener for Type=notify services
    notify_listener: Option<NotifyListener>,
    /// Receiver for notify messages
    notify_rx: Option<mpsc::Receiver<NotifyMessage>>,
    /// Map of PIDs waiting for READY notification
    waiting_ready: HashMap<u32, String>,
    /// Readiness deadlines for services waiting on READY
    start_deadlines: HashMap<String, Instant>,
}

impl Manager {
    /// Create a new service manager with the default search paths
    pub fn new() -> Self {
        Self::with_unit_paths(vec![
            PathBuf::from("/etc/unitd/system"),
            PathBuf::from("/usr/lib/unitd/system"),
        ])
    }

    /// Create a manager that looks for unit files in the given paths
    pub fn with_unit_paths(unit_paths: Vec<PathBuf>) -> Self {
        Self {
            units: HashMap::new(),
            states: HashMap::new(),
            processes: HashMap::new(),
            unit_paths,
            notify_listener: None,
            notify_rx: None,
            waiting_ready: HashMap::new(),
            start_deadlines: HashMap::new(),
        }
    }

    /// Initialize the notify socket listener at the default path
    pub fn init_notify_socket(&mut self) -> std::io::Result<()> {
        self.init_notify_socket_at(std::path::Path::new(NOTIFY_SOCKET_PATH))
    }

    /// Initialize the notify socket listener at a specific path
    pub fn init_notify_socket_at(&mut self, path: &std::path::Path) -> std::io::Result<()> {
        let (listener, rx) = NotifyListener::new(path)?;
        self.notify_listener = Some(listener);
        self.notify_rx = Some(rx);
        log::info!("Notify socket listening at {}", path.display());
        Ok(())
    }

    /// Get the notify socket path (if initialized)
    pub fn notify_socket_path(&self) -> Option<&std::path::Path> {
        self.notify_listener.as_ref().map(|l| l.socket_path())
    }

    /// Load a unit (service or target) by name
    pub async fn load(&mut self, name: &str) -> Result<(), ManagerError> {
        let name = self.normalize_name(name);

        // Already loaded?
        if self.units.contains_key(&name) {
            return Ok(());
        }

        let path = self.find_unit(&name)?;

        let unit = units::load_unit(&path)
            .await
            .map_err(|e| ManagerError::Parse(e.to_string()))?;
        let unit = self.attach_wants_dirs(unit);

        self.states.insert(name.clone(), UnitState::new());
        self.units.insert(name, unit);

        Ok(())
    }

    /// Load a unit from a specific path
    pub async fn load_from_path(&mut self, path: &std::path::Path) -> Result<(), ManagerError> {
        let unit = units::load_unit(path)
            .await
            .map_err(|e| ManagerError::Parse(e.to_string()))?;
        let unit = self.attach_wants_dirs(unit);

        let name = unit.name().to_string();
        self.states.insert(name.clone(), UnitState::new());
        self.units.insert(name, unit);

        Ok(())
    }

    /// Pull in `<target>.wants/` entries from the search paths
    /// (enable() creates its symlinks there, possibly away from the unit file)
    fn attach_wants_dirs(&self, unit: Unit) -> Unit {
        let mut target = match unit {
            Unit::Target(t) => t,
            other => return other,
        };

        for base in &self.unit_paths {
            let wants = base.join(format!("{}.wants", target.name));
            if wants.is_dir() {
                for member in units::read_wants_dir(&wants) {
                    if !target.wants_dir.contains(&member) {
                        target.wants_dir.push(member);
                    }
                }
            }
        }

        Unit::Target(target)
    }

    /// Find a unit file in search paths
    fn find_unit(&self, name: &str) -> Result<PathBuf, ManagerError> {
        for base in &self.unit_paths {
            let path = base.join(name);
            if path.exists() {
                return Ok(path);
            }
            // Also follow symlinks
            if path.is_symlink() {
                if let Ok(target) = std::fs::read_link(&path) {
                    if target.exists() {
                        return Ok(path);
                    }
                }
            }
        }

        Err(ManagerError::NotFound(name.to_string()))
    }

    /// Start a single unit (no dependency resolution)
    pub async fn start(&mut self, name: &str) -> Result<(), ManagerError> {
        let name = self.normalize_name(name);
        match self.start_single(&name).await {
            Err(ManagerError::IsTarget(_)) => {
                // A target alone is just a synchronization point
                if let Some(state) = self.states.get_mut(&name) {
                    state.set_running(0);
                }
                log::info!("{} reached", name);
                Ok(())
            }
            other => other,
        }
    }

    /// Start a unit with all its dependencies
    pub async fn start_with_deps(&mut self, name: &str) -> Result<Vec<String>, ManagerError> {
        let name = self.normalize_name(name);

        let order = self.resolve_start_order(&name).await?;

        log::info!("Start order for {}: {:?}", name, order);

        let mut started = Vec::new();
        for unit_name in &order {
            // Skip if already running
            if let Some(state) = self.states.get(unit_name) {
                if state.is_active() {
                    log::debug!("{} already running, skipping", unit_name);
                    continue;
                }
            }

            match self.start_single(unit_name).await {
                Ok(()) => {
                    started.push(unit_name.clone());
                }
                Err(ManagerError::IsTarget(_)) => {
                    // Targets don't need to be started, just mark as active
                    if let Some(state) = self.states.get_mut(unit_name) {
                        state.set_running(0);
                    }
                    log::debug!("{} reached", unit_name);
                }
                Err(e) => {
                    // Check if this is a hard dependency (Requires)
                    let is_required = self
                        .units
                        .get(&name)
                        .map(|u| u.unit_section().requires.contains(unit_name))
                        .unwrap_or(false);

                    if is_required {
                        log::error!("Required dependency {} failed: {}", unit_name, e);
                        return Err(e);
                    } else {
                        // Soft dependency (Wants) - log and continue
                        log::warn!("Optional dependency {} failed: {}", unit_name, e);
                    }
                }
            }
        }

        Ok(started)
    }

    /// Resolve start order for a unit and its dependencies
    async fn resolve_start_order(&mut self, name: &str) -> Result<Vec<String>, ManagerError> {
        if !self.units.contains_key(name) {
            self.load(name).await?;
        }

        // Collect all dependencies transitively
        let mut to_load: Vec<String> = vec![name.to_string()];
        let mut loaded: std::collections::HashSet<String> = std::collections::HashSet::new();

        while let Some(unit_name) = to_load.pop() {
            if loaded.contains(&unit_name) {
                continue;
            }

            if !self.units.contains_key(&unit_name) {
                if let Err(e) = self.load(&unit_name).await {
                    log::warn!("Could not load dependency {}: {}", unit_name, e);
                    // Skip missing dependencies
                    continue;
                }
            }

            loaded.insert(unit_name.clone());

            // Queue its dependencies
            if let Some(unit) = self.units.get(&unit_name) {
                let section = unit.unit_section();
                for dep in section
                    .after
                    .iter()
                    .chain(section.requires.iter())
                    .chain(section.wants.iter())
                    .chain(unit.wants_dir().iter())
                {
                    if !loaded.contains(dep) {
                        to_load.push(dep.clone());
                    }
                }
            }
        }

        // Build dependency graph from loaded units
        let mut graph = deps::DepGraph::new();
        for unit in self.units.values() {
            if loaded.contains(unit.name()) {
                graph.add_unit(unit);
            }
        }

        graph
            .start_order_for(name)
            .map_err(|e| ManagerError::Cycle(e.nodes))
    }

    /// Start a single unit (internal, assumes already loaded)
    async fn start_single(&mut self, name: &str) -> Result<(), ManagerError> {
        if !self.units.contains_key(name) {
            self.load(name).await?;
        }

        let unit = self
            .units
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        // Targets are synchronization points, no process to start
        if unit.is_target() {
            return Err(ManagerError::IsTarget(name.to_string()));
        }

        let service = unit
            .as_service()
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        let state = self
            .states
            .get_mut(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        // At most one live instance per descriptor
        if state.is_active() {
            return Err(ManagerError::AlreadyActive(name.to_string()));
        }

        state.set_starting();

        // Pre-start commands block the activation sequence; a non-zero
        // exit is a failed activation handed to the restart policy
        if let Err(e) = process::run_exec_pre(&service).await {
            log::error!("{}: activation failed: {}", name, e);
            self.handle_activation_failure(name, &service, e.to_string());
            return Err(ManagerError::Spawn(e));
        }

        let is_notify = service.service.service_type == ServiceType::Notify;
        let options = SpawnOptions {
            notify_socket: if is_notify {
                self.notify_socket_path()
                    .map(|p| p.to_string_lossy().to_string())
            } else {
                None
            },
        };

        let child = match process::spawn_service(&service, &options) {
            Ok(child) => child,
            Err(e) => {
                log::error!("{}: activation failed: {}", name, e);
                self.handle_activation_failure(name, &service, e.to_string());
                return Err(ManagerError::Spawn(e));
            }
        };
        let pid = child.id().unwrap_or(0);

        self.processes.insert(name.to_string(), child);

        if is_notify {
            // Type=notify: stay activating until READY=1 received
            self.waiting_ready.insert(pid, name.to_string());
            if let Some(timeout) = service.start_timeout() {
                self.start_deadlines
                    .insert(name.to_string(), Instant::now() + timeout);
            }
            log::info!("Started {} (PID {}), waiting for READY", name, pid);
        } else {
            // Type=simple: immediately mark as running
            if let Some(state) = self.states.get_mut(name) {
                state.set_running(pid);
            }
            log::info!("Started {} (PID {})", name, pid);
        }

        Ok(())
    }

    /// Uniform failure handling: pre-start failure, spawn failure,
    /// readiness timeout, and unexpected exit all land here and are
    /// resolved by the one fixed-delay restart policy
    fn handle_activation_failure(&mut self, name: &str, service: &Service, msg: String) {
        self.clear_waiting(name);
        if let Some(state) = self.states.get_mut(name) {
            state.set_failed(msg);
            match service.service.restart {
                RestartPolicy::Always | RestartPolicy::OnFailure => {
                    state.set_auto_restart(service.service.restart_sec);
                    log::info!(
                        "{}: scheduling restart in {:?}",
                        name,
                        service.service.restart_sec
                    );
                }
                RestartPolicy::Never => {}
            }
        }
    }

    /// Drop readiness bookkeeping for a unit
    fn clear_waiting(&mut self, name: &str) {
        self.waiting_ready.retain(|_, n| n != name);
        self.start_deadlines.remove(name);
    }

    /// Stop a unit
    pub async fn stop(&mut self, name: &str) -> Result<(), ManagerError> {
        let name = self.normalize_name(name);

        // Stopping a target only marks it inactive. Members are not
        // touched: the aggregate governs propagated start/reload only.
        if self.units.get(&name).is_some_and(|u| u.is_target()) {
            let state = self
                .states
                .get_mut(&name)
                .ok_or_else(|| ManagerError::NotFound(name.clone()))?;
            if !state.is_active() {
                return Err(ManagerError::NotActive(name));
            }
            state.set_stopped(0);
            log::info!("{} stopped", name);
            return Ok(());
        }

        let state = self
            .states
            .get_mut(&name)
            .ok_or_else(|| ManagerError::NotFound(name.clone()))?;

        if !state.is_active() {
            return Err(ManagerError::NotActive(name));
        }

        state.set_stopping();
        self.clear_waiting(&name);

        if let Some(mut child) = self.processes.remove(&name) {
            if let Some(pid) = child.id() {
                log::info!("Stopping {} (PID {})", name, pid);
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }

            // Wait for exit (with timeout)
            let timeout = self
                .units
                .get(&name)
                .and_then(|u| u.as_service())
                .and_then(|s| s.service.timeout_stop_sec)
                .unwrap_or(DEFAULT_TIMEOUT_STOP);

            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    let code = status.code().unwrap_or(-1);
                    if let Some(state) = self.states.get_mut(&name) {
                        state.set_stopped(code);
                        state.reset_restart_count();
                    }
                    log::info!("Stopped {} (exit code {})", name, code);
                }
                Ok(Err(e)) => {
                    if let Some(state) = self.states.get_mut(&name) {
                        state.set_failed(e.to_string());
                    }
                }
                Err(_) => {
                    // Timeout - send SIGKILL
                    log::warn!("Timeout stopping {}, sending SIGKILL", name);
                    let _ = child.kill().await;
                    if let Some(state) = self.states.get_mut(&name) {
                        state.set_stopped(-9);
                        state.reset_restart_count();
                    }
                }
            }
        } else {
            // No live process (auto-restart pending or never spawned)
            if let Some(state) = self.states.get_mut(&name) {
                state.set_stopped(0);
                state.reset_restart_count();
            }
        }

        Ok(())
    }

    /// Restart a unit (stop then start)
    pub async fn restart(&mut self, name: &str) -> Result<(), ManagerError> {
        let name = self.normalize_name(name);

        // Stop if running (ignore NotActive error)
        match self.stop(&name).await {
            Ok(()) => {}
            Err(ManagerError::NotActive(_)) => {}
            Err(e) => return Err(e),
        }

        self.start(&name).await
    }

    /// Reload a unit in place.
    ///
    /// For a service, runs its reload commands against the live main
    /// process if any are defined, else falls back to a restart. For a
    /// target, propagates the reload to every active PartOf= member.
    pub async fn reload(&mut self, name: &str) -> Result<(), ManagerError> {
        let name = self.normalize_name(name);

        if !self.units.contains_key(&name) {
            self.load(&name).await?;
        }

        if self.units.get(&name).is_some_and(|u| u.is_target()) {
            return self.reload_target(&name).await;
        }

        self.reload_service(&name).await
    }

    /// Reload one service in place
    async fn reload_service(&mut self, name: &str) -> Result<(), ManagerError> {
        let service = self
            .units
            .get(name)
            .and_then(|u| u.as_service())
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        if service.service.exec_reload.is_empty() {
            log::info!("{} has no reload command, restarting", name);
            return self.restart(name).await;
        }

        let state = self
            .states
            .get_mut(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        let pid = match state.main_pid {
            Some(pid) if state.active == ActiveState::Active => pid,
            _ => return Err(ManagerError::NotActive(name.to_string())),
        };

        state.set_reloading();
        log::info!("Reloading {} (PID {})", name, pid);

        // The reload command runs alongside the still-live main process
        let result = process::run_exec_reload(&service, pid).await;

        if let Some(state) = self.states.get_mut(name) {
            state.set_running(pid);
        }

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("{}: reload failed: {}", name, e);
                Err(ManagerError::Spawn(e))
            }
        }
    }

    /// Propagate a reload from an aggregate to its PartOf= members
    async fn reload_target(&mut self, name: &str) -> Result<(), ManagerError> {
        let members: Vec<String> = self
            .units
            .iter()
            .filter(|(member, unit)| {
                unit.is_service()
                    && unit.unit_section().part_of.contains(&name.to_string())
                    && self
                        .states
                        .get(*member)
                        .map(|s| s.active == ActiveState::Active)
                        .unwrap_or(false)
            })
            .map(|(member, _)| member.clone())
            .collect();

        log::info!("Reloading {} members: {:?}", name, members);

        for member in members {
            if let Err(e) = self.reload_service(&member).await {
                log::warn!("Failed to reload {}: {}", member, e);
            }
        }

        Ok(())
    }

    /// Enable a unit (create symlinks based on [Install] section)
    pub async fn enable(&mut self, name: &str) -> Result<Vec<PathBuf>, ManagerError> {
        let name = self.normalize_name(name);

        if !self.units.contains_key(&name) {
            self.load(&name).await?;
        }

        let unit = self
            .units
            .get(&name)
            .ok_or_else(|| ManagerError::NotFound(name.clone()))?;

        let install = unit
            .install_section()
            .filter(|i| !i.wanted_by.is_empty() || !i.required_by.is_empty())
            .ok_or_else(|| ManagerError::NoInstallSection(name.clone()))?;

        let wanted_by = install.wanted_by.clone();
        let required_by = install.required_by.clone();
        let unit_path = self.find_unit(&name)?;

        let mut created = Vec::new();
        for target in &wanted_by {
            created.push(self.create_install_link(&name, target, "wants", &unit_path)?);
        }
        for target in &required_by {
            created.push(self.create_install_link(&name, target, "requires", &unit_path)?);
        }

        Ok(created)
    }

    /// Disable a unit (remove symlinks)
    pub async fn disable(&mut self, name: &str) -> Result<Vec<PathBuf>, ManagerError> {
        let name = self.normalize_name(name);

        if !self.units.contains_key(&name) {
            self.load(&name).await?;
        }

        let unit = self
            .units
            .get(&name)
            .ok_or_else(|| ManagerError::NotFound(name.clone()))?;

        let Some(install) = unit.install_section() else {
            return Ok(Vec::new());
        };
        let wanted_by = install.wanted_by.clone();
        let required_by = install.required_by.clone();

        let mut removed = Vec::new();
        for target in &wanted_by {
            if let Some(link) = self.remove_install_link(&name, target, "wants")? {
                removed.push(link);
            }
        }
        for target in &required_by {
            if let Some(link) = self.remove_install_link(&name, target, "requires")? {
                removed.push(link);
            }
        }

        Ok(removed)
    }

    /// Create a symlink in `<target>.<kind>/` under the primary unit path
    fn create_install_link(
        &self,
        unit_name: &str,
        target: &str,
        kind: &str,
        unit_path: &PathBuf,
    ) -> Result<PathBuf, ManagerError> {
        let base = self
            .unit_paths
            .first()
            .ok_or_else(|| ManagerError::Io("no unit search path configured".to_string()))?;
        let dir = base.join(format!("{}.{}", target, kind));
        std::fs::create_dir_all(&dir).map_err(|e| ManagerError::Io(e.to_string()))?;

        let link_path = dir.join(unit_name);
        if link_path.exists() || link_path.is_symlink() {
            std::fs::remove_file(&link_path).map_err(|e| ManagerError::Io(e.to_string()))?;
        }

        std::os::unix::fs::symlink(unit_path, &link_path)
            .map_err(|e| ManagerError::Io(e.to_string()))?;

        Ok(link_path)
    }

    /// Remove a symlink from `<target>.<kind>/`
    fn remove_install_link(
        &self,
        unit_name: &str,
        target: &str,
        kind: &str,
    ) -> Result<Option<PathBuf>, ManagerError> {
        let base = self
            .unit_paths
            .first()
            .ok_or_else(|| ManagerError::Io("no unit search path configured".to_string()))?;
        let link_path = base.join(format!("{}.{}", target, kind)).join(unit_name);

        if link_path.exists() || link_path.is_symlink() {
            std::fs::remove_file(&link_path).map_err(|e| ManagerError::Io(e.to_string()))?;
            Ok(Some(link_path))
        } else {
            Ok(None)
        }
    }

    /// Check if a unit is enabled
    pub async fn is_enabled(&mut self, name: &str) -> Result<String, ManagerError> {
        let name = self.normalize_name(name);

        if !self.units.contains_key(&name) {
            self.load(&name).await?;
        }

        let unit = self
            .units
            .get(&name)
            .ok_or_else(|| ManagerError::NotFound(name.clone()))?;

        // No install section = static (can't be enabled/disabled)
        let Some(install) = unit.install_section() else {
            return Ok("static".to_string());
        };

        if install.wanted_by.is_empty() && install.required_by.is_empty() {
            return Ok("static".to_string());
        }

        for base in &self.unit_paths {
            for target in &install.wanted_by {
                let link = base.join(format!("{}.wants", target)).join(&name);
                if link.exists() || link.is_symlink() {
                    return Ok("enabled".to_string());
                }
            }
            for target in &install.required_by {
                let link = base.join(format!("{}.requires", target)).join(&name);
                if link.exists() || link.is_symlink() {
                    return Ok("enabled".to_string());
                }
            }
        }

        Ok("disabled".to_string())
    }

    /// Re-read all loaded unit files from disk. Runtime state is kept;
    /// definitions change only on this explicit request.
    pub async fn reload_unit_files(&mut self) -> Result<Vec<String>, ManagerError> {
        let names: Vec<String> = self.units.keys().cloned().collect();
        let mut reloaded = Vec::new();

        for name in names {
            let path = match self.find_unit(&name) {
                Ok(p) => p,
                Err(_) => {
                    log::warn!("{} vanished from disk, keeping loaded definition", name);
                    continue;
                }
            };

            match units::load_unit(&path).await {
                Ok(unit) => {
                    let unit = self.attach_wants_dirs(unit);
                    self.units.insert(name.clone(), unit);
                    reloaded.push(name);
                }
                Err(e) => {
                    log::warn!("Failed to re-read {}: {}", name, e);
                }
            }
        }

        Ok(reloaded)
    }

    /// Get unit status
    pub fn status(&self, name: &str) -> Option<&UnitState> {
        let name = self.normalize_name(name);
        self.states.get(&name)
    }

    /// Get service definition
    pub fn get_service(&self, name: &str) -> Option<&Service> {
        let name = self.normalize_name(name);
        self.units.get(&name).and_then(|u| u.as_service())
    }

    /// Get unit definition
    pub fn get_unit(&self, name: &str) -> Option<&Unit> {
        let name = self.normalize_name(name);
        self.units.get(&name)
    }

    /// List all loaded units with their types and states
    pub fn list_units(&self) -> Vec<(&String, &Unit, Option<&UnitState>)> {
        self.units
            .iter()
            .map(|(name, unit)| (name, unit, self.states.get(name)))
            .collect()
    }

    /// Normalize unit name (add .service suffix if no suffix present)
    fn normalize_name(&self, name: &str) -> String {
        if name.ends_with(".service") || name.ends_with(".target") {
            name.to_string()
        } else {
            format!("{}.service", name)
        }
    }

    /// Process pending notify messages (READY, STATUS)
    pub async fn process_notify(&mut self) {
        // Collect all pending messages first to avoid borrow conflicts
        let messages: Vec<_> = {
            let Some(rx) = &mut self.notify_rx else {
                return;
            };
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        for msg in messages {
            if msg.is_ready() {
                // Readiness is honored for the main process identity only:
                // match by the announced MAINPID, falling back to the sole
                // waiting service when there is exactly one
                let service_name = if let Some(pid) = msg.main_pid() {
                    self.waiting_ready.remove(&pid)
                } else if self.waiting_ready.len() == 1 {
                    let pid = *self.waiting_ready.keys().next().unwrap();
                    self.waiting_ready.remove(&pid)
                } else {
                    log::debug!("READY without MAINPID and multiple waiters, ignoring");
                    None
                };

                if let Some(name) = service_name {
                    self.start_deadlines.remove(&name);
                    if let Some(state) = self.states.get_mut(&name) {
                        let pid = self.processes.get(&name).and_then(|c| c.id()).unwrap_or(0);
                        state.set_running(pid);
                        log::info!("{} signaled READY", name);
                    }
                }
            }

            if let Some(status) = msg.status() {
                log::debug!("Service status: {}", status);
            }
        }
    }

    /// Fail Type=notify services whose readiness deadline has passed.
    /// A timeout is never silently promoted to active; it is a failed
    /// activation resolved by the restart policy.
    pub async fn process_start_timeouts(&mut self) {
        let now = Instant::now();
        let timed_out: Vec<String> = self
            .start_deadlines
            .iter()
            .filter(|(_, deadline)| now > **deadline)
            .map(|(name, _)| name.clone())
            .collect();

        for name in timed_out {
            log::warn!("{}: readiness timeout, failing activation", name);

            if let Some(mut child) = self.processes.remove(&name) {
                if let Some(pid) = child.id() {
                    let _ = nix::sys::signal::kill(
                        nix::unistd::Pid::from_raw(pid as i32),
                        nix::sys::signal::Signal::SIGTERM,
                    );
                }
                let _ = child.kill().await;
            }

            let service = self.units.get(&name).and_then(|u| u.as_service()).cloned();
            if let Some(service) = service {
                self.handle_activation_failure(
                    &name,
                    &service,
                    "readiness notification timed out".to_string(),
                );
            }
        }
    }

    /// Check on running processes and update states
    pub async fn reap(&mut self) {
        let mut exited = Vec::new();

        for (name, child) in &mut self.processes {
            match child.try_wait() {
                Ok(Some(status)) => {
                    exited.push((name.clone(), status.code().unwrap_or(-1)));
                }
                Ok(None) => {
                    // Still running
                }
                Err(e) => {
                    log::error!("Error checking {}: {}", name, e);
                }
            }
        }

        for (name, code) in exited {
            self.processes.remove(&name);
            self.clear_waiting(&name);

            let (restart_policy, restart_sec) = self
                .units
                .get(&name)
                .and_then(|u| u.as_service())
                .map(|s| (s.service.restart.clone(), s.service.restart_sec))
                .unwrap_or((RestartPolicy::Never, std::time::Duration::from_millis(100)));

            // Fixed-delay policy: no backoff growth, no retry cap
            let should_restart = match restart_policy {
                RestartPolicy::Never => false,
                RestartPolicy::OnFailure => code != 0,
                RestartPolicy::Always => true,
            };

            if let Some(state) = self.states.get_mut(&name) {
                if code == 0 {
                    if should_restart {
                        state.set_auto_restart(restart_sec);
                        log::info!("{} exited, scheduling restart in {:?}", name, restart_sec);
                    } else {
                        state.set_stopped(code);
                        state.reset_restart_count();
                        log::info!("{} exited cleanly", name);
                    }
                } else {
                    if should_restart {
                        state.set_auto_restart(restart_sec);
                        log::warn!(
                            "{} failed (exit {}), scheduling restart in {:?}",
                            name,
                            code,
                            restart_sec
                        );
                    } else {
                        state.set_failed(format!("Exit code {}", code));
                        log::warn!("{} failed with exit code {}", name, code);
                    }
                }
            }
        }
    }

    /// Process pending restarts
    pub async fn process_restarts(&mut self) {
        let due: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| state.sub == SubState::AutoRestart && state.restart_due())
            .map(|(name, _)| name.clone())
            .collect();

        for name in due {
            log::info!("Restarting {}", name);
            if let Some(state) = self.states.get_mut(&name) {
                state.clear_restart();
                // Back to inactive so the start path accepts the relaunch
                state.active = ActiveState::Inactive;
                state.sub = SubState::Dead;
            }
            if let Err(e) = self.start_single(&name).await {
                // start_single has already applied the restart policy
                log::error!("Failed to restart {}: {}", name, e);
            }
        }
    }

    /// Stop every active unit (daemon shutdown)
    pub async fn stop_all(&mut self) {
        let active: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(name, _)| name.clone())
            .collect();

        for name in active {
            if let Err(e) = self.stop(&name).await {
                log::warn!("Failed to stop {}: {}", name, e);
            }
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Unit not found: {0}")]
    NotFound(String),

    #[error("Failed to parse unit: {0}")]
    Parse(String),

    #[error("Unit already active: {0}")]
    AlreadyActive(String),

    #[error("Unit not active: {0}")]
    NotActive(String),

    #[error("Failed to spawn: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Unit is a target (no process): {0}")]
    IsTarget(String),

    #[error("Unit has no [Install] section: {0}")]
    NoInstallSection(String),

    #[error("I/O error: {0}")]
    Io(String),
}
