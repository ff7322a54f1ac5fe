//! Integration tests for unit file loading
//!
//! Writes real unit files to disk and loads them through the public API.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use unitd::units::{self, RestartPolicy, ServiceType, Unit};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/unitd-parse-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn test_load_service_from_disk() {
    let dir = unique_test_dir();
    let path = dir.join("synapse.service");
    fs::write(&path, r#"
[Unit]
Description=Matrix homeserver
PartOf=matrix.target
After=network.target

[Service]
Type=notify
User=synapse
WorkingDirectory=/var/lib/synapse
RuntimeDirectory=synapse
EnvironmentFile=-/etc/default/synapse
ExecStartPre=/usr/bin/homeserver --generate-keys -c /etc/synapse/config.yaml
ExecStart=/usr/bin/homeserver -c /etc/synapse/config.yaml
ExecReload=/bin/kill -HUP $MAINPID
Restart=always
RestartSec=3s

[Install]
WantedBy=matrix.target
"#).unwrap();

    let service = units::load_service(&path).await.unwrap();

    assert_eq!(service.name, "synapse.service");
    assert_eq!(service.service.service_type, ServiceType::Notify);
    assert_eq!(service.service.restart, RestartPolicy::Always);
    assert_eq!(
        service.service.restart_sec,
        std::time::Duration::from_secs(3)
    );
    assert_eq!(service.service.user, Some("synapse".to_string()));
    assert_eq!(
        service.service.working_directory,
        Some(PathBuf::from("/var/lib/synapse"))
    );
    assert_eq!(service.service.runtime_directory, Some("synapse".to_string()));
    assert_eq!(service.service.environment_file.len(), 1);
    assert!(service.service.environment_file[0].optional);
    assert_eq!(service.unit.part_of, vec!["matrix.target"]);
    assert_eq!(service.install.wanted_by, vec!["matrix.target"]);
}

#[tokio::test]
async fn test_load_unit_dispatches_on_extension() {
    let dir = unique_test_dir();

    let svc_path = dir.join("a.service");
    fs::write(&svc_path, "[Service]\nExecStart=/bin/true\n").unwrap();

    let target_path = dir.join("b.target");
    fs::write(&target_path, "[Unit]\nDescription=B\n").unwrap();

    let svc = units::load_unit(&svc_path).await.unwrap();
    assert!(matches!(svc, Unit::Service(_)));
    assert_eq!(svc.unit_type(), "service");

    let target = units::load_unit(&target_path).await.unwrap();
    assert!(matches!(target, Unit::Target(_)));
    assert_eq!(target.unit_type(), "target");
}

#[tokio::test]
async fn test_load_unit_unknown_extension() {
    let dir = unique_test_dir();
    let path = dir.join("a.socket");
    fs::write(&path, "[Unit]\n").unwrap();

    assert!(units::load_unit(&path).await.is_err());
}

#[tokio::test]
async fn test_load_service_requires_exactly_one_exec_start() {
    let dir = unique_test_dir();

    let none = dir.join("none.service");
    fs::write(&none, "[Service]\nType=simple\n").unwrap();
    assert!(units::load_service(&none).await.is_err());

    let two = dir.join("two.service");
    fs::write(&two, "[Service]\nExecStart=/bin/a\nExecStart=/bin/b\n").unwrap();
    assert!(units::load_service(&two).await.is_err());

    let one = dir.join("one.service");
    fs::write(&one, "[Service]\nExecStart=/bin/a\n").unwrap();
    assert!(units::load_service(&one).await.is_ok());
}

#[tokio::test]
async fn test_load_target_with_wants_dir() {
    let dir = unique_test_dir();

    let member = dir.join("member.service");
    fs::write(&member, "[Service]\nExecStart=/bin/true\n").unwrap();

    let target_path = dir.join("app.target");
    fs::write(&target_path, "[Unit]\nDescription=App\n").unwrap();

    let wants = dir.join("app.target.wants");
    fs::create_dir_all(&wants).unwrap();
    std::os::unix::fs::symlink(&member, wants.join("member.service")).unwrap();

    let target = units::load_target(&target_path).await.unwrap();
    assert_eq!(target.wants_dir, vec!["member.service"]);
}

#[tokio::test]
async fn test_load_missing_file() {
    let dir = unique_test_dir();
    let result = units::load_service(&dir.join("ghost.service")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_load_service_with_inline_environment() {
    let dir = unique_test_dir();
    let path = dir.join("env.service");
    fs::write(&path, r#"
[Service]
ExecStart=/bin/true
Environment=ONE=1 TWO="with space"
Environment=THREE=3
"#).unwrap();

    let service = units::load_service(&path).await.unwrap();
    assert!(service
        .service
        .environment
        .contains(&("ONE".to_string(), "1".to_string())));
    assert!(service
        .service
        .environment
        .contains(&("TWO".to_string(), "with space".to_string())));
    assert!(service
        .service
        .environment
        .contains(&("THREE".to_string(), "3".to_string())));
}
