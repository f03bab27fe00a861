use gaggle::*;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config_is_valid() {
    let config = NodeConfig::default();
    config.validate().unwrap();
    assert_eq!(config.labels.leader, "goose");
    assert_eq!(config.labels.follower, "duck");
    assert!(config.join.is_none());
}

#[test]
fn test_http_listen_addr() {
    let config = NodeConfig {
        http_addr: "127.0.0.1".to_string(),
        http_port: 8123,
        ..Default::default()
    };
    assert_eq!(config.http_listen_addr(), "127.0.0.1:8123");
}

#[test]
fn test_validate_rejects_empty_node_addr() {
    let config = NodeConfig {
        node_addr: " ".to_string(),
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(GaggleError::Config(_))));
}

#[test]
fn test_validate_rejects_zero_port() {
    let config = NodeConfig {
        http_port: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(GaggleError::Config(_))));
}

#[test]
fn test_validate_rejects_empty_join() {
    let config = NodeConfig {
        join: Some(String::new()),
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(GaggleError::Config(_))));
}

#[test]
fn test_validate_rejects_inverted_election_window() {
    let mut config = NodeConfig::default();
    config.raft.election_timeout_min_ms = 3000;
    config.raft.election_timeout_max_ms = 1500;
    assert!(matches!(config.validate(), Err(GaggleError::Config(_))));
}

#[test]
fn test_validate_rejects_zero_announce_interval() {
    let config = NodeConfig {
        announce_interval_ms: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(GaggleError::Config(_))));
}

#[test]
fn test_save_and_load_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gaggle.toml");

    let mut config = NodeConfig::default();
    config.node_addr = "10.0.0.2:9000".to_string();
    config.join = Some("10.0.0.1:8000".to_string());
    config.labels.leader = "alpha".to_string();
    config.save(&path).unwrap();

    let loaded = NodeConfig::load(&path).unwrap();
    assert_eq!(loaded.node_addr, "10.0.0.2:9000");
    assert_eq!(loaded.join.as_deref(), Some("10.0.0.1:8000"));
    assert_eq!(loaded.labels.leader, "alpha");
    assert_eq!(loaded.labels.follower, "duck");
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gaggle.toml");
    std::fs::write(&path, "node_addr = \"10.0.0.3:9000\"\nhttp_port = 8003\n").unwrap();

    let loaded = NodeConfig::load(&path).unwrap();
    assert_eq!(loaded.node_addr, "10.0.0.3:9000");
    assert_eq!(loaded.http_port, 8003);
    assert_eq!(loaded.proposal_timeout(), Duration::from_secs(30));
    assert_eq!(loaded.raft.heartbeat_interval_ms, 500);
}

#[test]
fn test_error_status_codes() {
    use axum::http::StatusCode;

    assert_eq!(
        GaggleError::InvalidRequest("x".into()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        GaggleError::ConsensusProposalFailed("x".into()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        GaggleError::Encode("x".into()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
