//! Typed service definitions matching unitd .service files

use std::path::PathBuf;
use std::time::Duration;

/// Service type determines startup notification
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ServiceType {
    #[default]
    Simple,   // Ready immediately after exec
    Notify,   // Ready on READY=1 via the notify socket
}

/// Restart policy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RestartPolicy {
    #[default]
    Never,
    OnFailure,
    Always,
}

/// [Unit] section
#[derive(Debug, Clone, Default)]
pub struct UnitSection {
    pub description: Option<String>,
    pub after: Vec<String>,
    pub before: Vec<String>,
    pub requires: Vec<String>,
    pub wants: Vec<String>,
    /// Aggregates whose reload/restart this unit follows
    pub part_of: Vec<String>,
}

/// An EnvironmentFile= entry. A leading `-` in the unit file marks the
/// file optional: absence must not prevent activation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvFile {
    pub path: PathBuf,
    pub optional: bool,
}

impl EnvFile {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(path) => Self {
                path: PathBuf::from(path),
                optional: true,
            },
            None => Self {
                path: PathBuf::from(raw),
                optional: false,
            },
        }
    }
}

/// [Service] section
#[derive(Debug, Clone)]
pub struct ServiceSection {
    pub service_type: ServiceType,

    // Execution. Exactly one ExecStart per service; the typed conversion
    // rejects anything else.
    pub exec_start: String,
    pub exec_start_pre: Vec<String>,
    pub exec_reload: Vec<String>,

    // Restart
    pub restart: RestartPolicy,
    pub restart_sec: Duration,
    pub timeout_start_sec: Option<Duration>,
    pub timeout_stop_sec: Option<Duration>,

    // Credentials
    pub user: Option<String>,
    pub group: Option<String>,
    pub working_directory: Option<PathBuf>,
    /// Directory name created under /run before spawn
    pub runtime_directory: Option<String>,

    // Environment
    pub environment: Vec<(String, String)>,
    pub environment_file: Vec<EnvFile>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            service_type: ServiceType::default(),
            exec_start: String::new(),
            exec_start_pre: Vec::new(),
            exec_reload: Vec::new(),
            restart: RestartPolicy::default(),
            restart_sec: Duration::from_millis(100),
            timeout_start_sec: None,
            timeout_stop_sec: None,
            user: None,
            group: None,
            working_directory: None,
            runtime_directory: None,
            environment: Vec::new(),
            environment_file: Vec::new(),
        }
    }
}

/// [Install] section
#[derive(Debug, Clone, Default)]
pub struct InstallSection {
    pub wanted_by: Vec<String>,
    pub required_by: Vec<String>,
}

/// Complete parsed service unit
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub unit: UnitSection,
    pub service: ServiceSection,
    pub install: InstallSection,
}

impl Service {
    pub fn new(name: String) -> Self {
        Self {
            name,
            unit: UnitSection::default(),
            service: ServiceSection::default(),
            install: InstallSection::default(),
        }
    }

    /// Effective readiness deadline for Type=notify.
    /// TimeoutStartSec=0 disables the deadline entirely.
    pub fn start_timeout(&self) -> Option<Duration> {
        match self.service.timeout_start_sec {
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
            None => Some(DEFAULT_TIMEOUT_START),
        }
    }
}

/// Default readiness deadline for Type=notify services
pub const DEFAULT_TIMEOUT_START: Duration = Duration::from_secs(90);

/// Default SIGTERM-to-SIGKILL grace period on stop
pub const DEFAULT_TIMEOUT_STOP: Duration = Duration::from_secs(10);

// Parsing helpers

impl ServiceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "notify" => Some(Self::Notify),
            _ => None,
        }
    }
}

impl RestartPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "never" | "no" => Some(Self::Never),
            "on-failure" => Some(Self::OnFailure),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

/// Parse duration from unit-file format (e.g., "5s", "100ms", "1min")
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(n) = s.strip_suffix("ms") {
        n.parse().ok().map(Duration::from_millis)
    } else if let Some(n) = s.strip_suffix("min") {
        n.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(n) = s.strip_suffix('h') {
        n.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else if let Some(n) = s.strip_suffix('s') {
        n.parse().ok().map(Duration::from_secs)
    } else {
        // Bare number = seconds
        s.parse().ok().map(Duration::from_secs)
    }
}
