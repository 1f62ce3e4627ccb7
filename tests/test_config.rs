use http_svr::config::{Config, ConfigError, LISTEN_ENV};
use std::time::Duration;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.server.max_connections, 1024);
    assert_eq!(cfg.idle.idle_timeout(), Duration::from_secs(3600));
    assert_eq!(cfg.idle.reap_interval(), Duration::from_secs(60));
    assert_eq!(cfg.limits.max_head_bytes, 80 * 1024);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_empty_document_is_default() {
    let cfg = Config::from_yaml_str("").unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
}

#[test]
fn test_config_partial_yaml_keeps_other_defaults() {
    let cfg = Config::from_yaml_str(
        r#"
idle:
  idle_timeout_secs: 30
server:
  listen_addr: "0.0.0.0:3000"
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.server.max_connections, 1024);
    assert_eq!(cfg.idle.idle_timeout_secs, 30);
    assert_eq!(cfg.idle.reap_interval_secs, 60);
}

#[test]
fn test_config_rejects_zero_pool() {
    let err = Config::from_yaml_str("server:\n  max_connections: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_config_rejects_zero_reap_interval() {
    let err = Config::from_yaml_str("idle:\n  reap_interval_secs: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_config_rejects_malformed_yaml() {
    let err = Config::from_yaml_str("server: [not, a, map]").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_config_missing_file() {
    let err = Config::from_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.server.listen_addr, cfg2.server.listen_addr);
}

#[test]
fn test_config_listen_env_overrides() {
    // The only test in this binary touching the environment.
    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:5000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:5000");
    unsafe {
        std::env::remove_var(LISTEN_ENV);
    }
}
