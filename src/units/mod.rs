//! Unit file parsing and type definitions
//!
//! Parses .service and .target files into typed Rust structures.

mod parser;
mod service;
mod target;
mod unit;

pub use parser::{parse_file, parse_unit_file, ParseError, ParsedFile};
pub use service::*;
pub use target::Target;
pub use unit::Unit;

use std::path::Path;

/// Convert parsed INI data into a typed Service
pub fn parse_service(name: &str, parsed: &ParsedFile) -> Result<Service, ParseError> {
    let mut svc = Service::new(name.to_string());

    // [Unit] section
    if let Some(unit) = parsed.get("[Unit]") {
        if let Some(vals) = unit.get("DESCRIPTION") {
            svc.unit.description = vals.first().map(|(_, v)| v.clone());
        }
        if let Some(vals) = unit.get("AFTER") {
            svc.unit.after = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("BEFORE") {
            svc.unit.before = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("REQUIRES") {
            svc.unit.requires = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("WANTS") {
            svc.unit.wants = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("PARTOF") {
            svc.unit.part_of = vals.iter().map(|(_, v)| v.clone()).collect();
        }
    }

    // [Service] section
    if let Some(service) = parsed.get("[Service]") {
        // Type
        if let Some(vals) = service.get("TYPE") {
            if let Some((_, t)) = vals.first() {
                svc.service.service_type = ServiceType::parse(t).unwrap_or_default();
            }
        }

        // Exec commands. Exactly one ExecStart per descriptor.
        match service.get("EXECSTART").map(|v| v.as_slice()).unwrap_or(&[]) {
            [] => return Err(ParseError::MissingExecStart(name.to_string())),
            [(_, cmd)] => svc.service.exec_start = cmd.clone(),
            many => {
                return Err(ParseError::TooManyValues(
                    "ExecStart".to_string(),
                    many.iter().map(|(_, v)| v.clone()).collect(),
                ))
            }
        }
        if let Some(vals) = service.get("EXECSTARTPRE") {
            svc.service.exec_start_pre = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = service.get("EXECRELOAD") {
            svc.service.exec_reload = vals.iter().map(|(_, v)| v.clone()).collect();
        }

        // Restart
        if let Some(vals) = service.get("RESTART") {
            if let Some((_, r)) = vals.first() {
                svc.service.restart = RestartPolicy::parse(r).unwrap_or_default();
            }
        }
        if let Some(vals) = service.get("RESTARTSEC") {
            if let Some((_, s)) = vals.first() {
                svc.service.restart_sec =
                    parse_duration(s).unwrap_or(std::time::Duration::from_millis(100));
            }
        }
        if let Some(vals) = service.get("TIMEOUTSTARTSEC") {
            if let Some((_, s)) = vals.first() {
                svc.service.timeout_start_sec = parse_duration(s);
            }
        }
        if let Some(vals) = service.get("TIMEOUTSTOPSEC") {
            if let Some((_, s)) = vals.first() {
                svc.service.timeout_stop_sec = parse_duration(s);
            }
        }

        // Credentials
        if let Some(vals) = service.get("USER") {
            svc.service.user = vals.first().map(|(_, v)| v.clone());
        }
        if let Some(vals) = service.get("GROUP") {
            svc.service.group = vals.first().map(|(_, v)| v.clone());
        }
        if let Some(vals) = service.get("WORKINGDIRECTORY") {
            svc.service.working_directory = vals.first().map(|(_, v)| v.into());
        }
        if let Some(vals) = service.get("RUNTIMEDIRECTORY") {
            svc.service.runtime_directory = vals.first().map(|(_, v)| v.clone());
        }

        // Environment
        if let Some(vals) = service.get("ENVIRONMENT") {
            for (_, v) in vals {
                if let Ok(pairs) = parser::parse_environment(v) {
                    svc.service.environment.extend(pairs);
                }
            }
        }
        if let Some(vals) = service.get("ENVIRONMENTFILE") {
            svc.service.environment_file =
                vals.iter().map(|(_, v)| EnvFile::parse(v)).collect();
        }
    } else {
        return Err(ParseError::MissingExecStart(name.to_string()));
    }

    // [Install] section
    if let Some(install) = parsed.get("[Install]") {
        if let Some(vals) = install.get("WANTEDBY") {
            svc.install.wanted_by = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = install.get("REQUIREDBY") {
            svc.install.required_by = vals.iter().map(|(_, v)| v.clone()).collect();
        }
    }

    Ok(svc)
}

/// Parse a service file from disk
pub async fn load_service(path: &Path) -> Result<Service, ParseError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let parsed = parse_unit_file(path).await?;
    parse_service(name, &parsed)
}

/// Convert parsed INI data into a typed Target
pub fn parse_target(name: &str, parsed: &ParsedFile) -> Result<Target, ParseError> {
    let mut target = Target::new(name.to_string());

    if let Some(unit) = parsed.get("[Unit]") {
        if let Some(vals) = unit.get("DESCRIPTION") {
            target.unit.description = vals.first().map(|(_, v)| v.clone());
        }
        if let Some(vals) = unit.get("AFTER") {
            target.unit.after = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("BEFORE") {
            target.unit.before = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("REQUIRES") {
            target.unit.requires = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("WANTS") {
            target.unit.wants = vals.iter().map(|(_, v)| v.clone()).collect();
        }
        if let Some(vals) = unit.get("PARTOF") {
            target.unit.part_of = vals.iter().map(|(_, v)| v.clone()).collect();
        }
    }

    Ok(target)
}

/// Parse a target file from disk, including its .wants directory
pub async fn load_target(path: &Path) -> Result<Target, ParseError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let parsed = parse_unit_file(path).await?;
    let mut target = parse_target(name, &parsed)?;

    // Look for .wants directory in same location
    let wants_dir = path.with_extension("target.wants");
    if wants_dir.is_dir() {
        target.wants_dir = read_wants_dir(&wants_dir);
    }

    Ok(target)
}

/// Read unit names from a .wants directory
pub fn read_wants_dir(path: &Path) -> Vec<String> {
    let mut units = Vec::new();

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".service") || name.ends_with(".target") {
                    units.push(name.to_string());
                }
            }
        }
    }

    units
}

/// Load a unit file (service or target) from disk
pub async fn load_unit(path: &Path) -> Result<Unit, ParseError> {
    let ext = path.extension().and_then(|e| e.to_str());

    match ext {
        Some("service") => {
            let service = load_service(path).await?;
            Ok(Unit::Service(service))
        }
        Some("target") => {
            let target = load_target(path).await?;
            Ok(Unit::Target(target))
        }
        _ => Err(ParseError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Unknown unit type: {:?}", path),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notify_service() {
        let content = r#"
[Unit]
Description=Synapse Matrix homeserver
PartOf=matrix.target
After=network.target

[Service]
Type=notify
User=matrix
WorkingDirectory=/var/lib/matrix
RuntimeDirectory=matrix
EnvironmentFile=-/etc/default/matrix
ExecStartPre=/usr/bin/python -m synapse.app.homeserver --generate-keys-if-missing -c /etc/matrix/homeserver.yaml
ExecStart=/usr/bin/python -m synapse.app.homeserver -c /etc/matrix/homeserver.yaml
ExecReload=/bin/kill -HUP $MAINPID
Restart=always
RestartSec=3s

[Install]
WantedBy=matrix.target
"#;
        let parsed = parse_file(content).unwrap();
        let svc = parse_service("matrix-synapse.service", &parsed).unwrap();

        assert_eq!(
            svc.unit.description,
            Some("Synapse Matrix homeserver".into())
        );
        assert!(svc.unit.part_of.contains(&"matrix.target".into()));
        assert!(svc.unit.after.contains(&"network.target".into()));

        assert_eq!(svc.service.service_type, ServiceType::Notify);
        assert_eq!(svc.service.user, Some("matrix".into()));
        assert_eq!(svc.service.runtime_directory, Some("matrix".into()));
        assert_eq!(svc.service.environment_file.len(), 1);
        assert!(svc.service.environment_file[0].optional);
        assert_eq!(svc.service.exec_start_pre.len(), 1);
        assert_eq!(svc.service.exec_reload, vec!["/bin/kill -HUP $MAINPID"]);
        assert_eq!(svc.service.restart, RestartPolicy::Always);
        assert_eq!(svc.service.restart_sec, std::time::Duration::from_secs(3));

        assert!(svc.install.wanted_by.contains(&"matrix.target".into()));
    }

    #[test]
    fn test_parse_simple_service() {
        let content = r#"
[Unit]
Description=My App

[Service]
Type=simple
ExecStart=/usr/bin/myapp --flag
User=nobody
WorkingDirectory=/var/lib/myapp
Environment=FOO=bar BAZ=qux

[Install]
WantedBy=multi-user.target
"#;
        let parsed = parse_file(content).unwrap();
        let svc = parse_service("myapp.service", &parsed).unwrap();

        assert_eq!(svc.service.service_type, ServiceType::Simple);
        assert_eq!(svc.service.user, Some("nobody".into()));
        assert_eq!(svc.service.working_directory, Some("/var/lib/myapp".into()));
        assert!(svc
            .service
            .environment
            .contains(&("FOO".into(), "bar".into())));
        assert!(svc
            .service
            .environment
            .contains(&("BAZ".into(), "qux".into())));
    }

    #[test]
    fn test_missing_exec_start_rejected() {
        let content = r#"
[Unit]
Description=No command

[Service]
Type=simple
"#;
        let parsed = parse_file(content).unwrap();
        let err = parse_service("broken.service", &parsed).unwrap_err();
        assert!(matches!(err, ParseError::MissingExecStart(_)));
    }

    #[test]
    fn test_repeated_exec_start_rejected() {
        let content = r#"
[Service]
ExecStart=/usr/bin/one
ExecStart=/usr/bin/two
"#;
        let parsed = parse_file(content).unwrap();
        let err = parse_service("broken.service", &parsed).unwrap_err();
        assert!(matches!(err, ParseError::TooManyValues(_, _)));
    }

    #[test]
    fn test_missing_service_section_rejected() {
        let content = r#"
[Unit]
Description=Only a unit section
"#;
        let parsed = parse_file(content).unwrap();
        let err = parse_service("broken.service", &parsed).unwrap_err();
        assert!(matches!(err, ParseError::MissingExecStart(_)));
    }

    #[test]
    fn test_parse_restart_on_failure() {
        let content = r#"
[Service]
Type=simple
ExecStart=/usr/bin/myapp
Restart=on-failure
RestartSec=5s
"#;
        let parsed = parse_file(content).unwrap();
        let svc = parse_service("myapp.service", &parsed).unwrap();

        assert_eq!(svc.service.restart, RestartPolicy::OnFailure);
        assert_eq!(svc.service.restart_sec, std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_parse_target() {
        let content = r#"
[Unit]
Description=Matrix services
After=network.target
"#;
        let parsed = parse_file(content).unwrap();
        let target = parse_target("matrix.target", &parsed).unwrap();

        assert_eq!(target.name, "matrix.target");
        assert_eq!(target.unit.description, Some("Matrix services".into()));
        assert!(target.unit.after.contains(&"network.target".into()));
        assert!(target.wants_dir.is_empty());
    }
}
