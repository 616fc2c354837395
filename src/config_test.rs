use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn from_lookup_defaults() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[])).unwrap();
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    assert_eq!(cfg.channel.endpoint, "ws://127.0.0.1:8080/ws");
    assert_eq!(cfg.channel.reconnect_delay, Duration::from_secs(5));
    assert_eq!(cfg.channel.max_reconnect_attempts, 5);
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 30, connect_secs: 10 });
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("BOARD_SYNC_BASE_URL", "https://tutor.example.test/"),
        ("BOARD_SYNC_CHANNEL_PATH", "live"),
        ("BOARD_SYNC_RECONNECT_DELAY_MS", "250"),
        ("BOARD_SYNC_MAX_RECONNECT_ATTEMPTS", "2"),
        ("BOARD_SYNC_REQUEST_TIMEOUT_SECS", "42"),
        ("BOARD_SYNC_CONNECT_TIMEOUT_SECS", "7"),
    ]))
    .unwrap();
    assert_eq!(cfg.base_url, "https://tutor.example.test");
    assert_eq!(cfg.channel.endpoint, "wss://tutor.example.test/live");
    assert_eq!(cfg.channel.reconnect_delay, Duration::from_millis(250));
    assert_eq!(cfg.channel.max_reconnect_attempts, 2);
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn from_lookup_falls_back_on_unparsable_numbers() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("BOARD_SYNC_RECONNECT_DELAY_MS", "soon"),
        ("BOARD_SYNC_MAX_RECONNECT_ATTEMPTS", "-1"),
    ]))
    .unwrap();
    assert_eq!(cfg.channel.reconnect_delay, Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS));
    assert_eq!(cfg.channel.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
}

#[test]
fn from_lookup_rejects_non_http_base_url() {
    let err = SyncConfig::from_lookup(lookup_from(&[("BOARD_SYNC_BASE_URL", "ftp://files")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBaseUrl(url) if url == "ftp://files"));
}

#[test]
fn new_uses_defaults_for_channel() {
    let cfg = SyncConfig::new("http://localhost:3000/").unwrap();
    assert_eq!(cfg.base_url, "http://localhost:3000");
    assert_eq!(cfg.channel, ChannelConfig::new("ws://localhost:3000/ws"));
}

#[test]
fn channel_endpoint_maps_schemes() {
    assert_eq!(channel_endpoint("http://a:1", "/ws").unwrap(), "ws://a:1/ws");
    assert_eq!(channel_endpoint("https://a", "/ws").unwrap(), "wss://a/ws");
    assert!(channel_endpoint("a:1", "/ws").is_err());
}
