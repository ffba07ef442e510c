use super::*;

/// # Safety
/// Tests must run with `--test-threads=1` to avoid env races.
unsafe fn clear_chat_env() {
    unsafe {
        for key in [
            "CHAT_API_URL",
            "CHAT_SOCKET_URL",
            "CHAT_TOKEN_PATH",
            "CHAT_TRANSPORTS",
            "CHAT_RECONNECT_ATTEMPTS",
            "CHAT_RECONNECT_DELAY_MS",
            "CHAT_RECONNECT_DELAY_MAX_MS",
            "CHAT_HANDSHAKE_TIMEOUT_SECS",
            "CHAT_TYPING_TIMEOUT_MS",
            "CHAT_REQUEST_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn from_env_uses_defaults_and_overrides() {
    unsafe { clear_chat_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.transport.socket_url, DEFAULT_SOCKET_URL);
    assert_eq!(cfg.transport.transports, vec![TransportKind::WebSocket, TransportKind::Polling]);
    assert_eq!(cfg.transport.reconnect, ReconnectPolicy::default());
    assert_eq!(cfg.transport.handshake_timeout, Duration::from_secs(20));
    assert_eq!(cfg.typing_timeout, Duration::from_millis(3_000));
    assert!(cfg.token_path.ends_with(TOKEN_KEY));

    unsafe {
        std::env::set_var("CHAT_API_URL", "https://chat.example.test/api/");
        std::env::set_var("CHAT_TOKEN_PATH", "/tmp/chat-token");
        std::env::set_var("CHAT_TRANSPORTS", "websocket");
        std::env::set_var("CHAT_RECONNECT_ATTEMPTS", "2");
        std::env::set_var("CHAT_TYPING_TIMEOUT_MS", "not-a-number");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, "https://chat.example.test/api");
    assert_eq!(cfg.token_path, PathBuf::from("/tmp/chat-token"));
    assert_eq!(cfg.transport.transports, vec![TransportKind::WebSocket]);
    assert_eq!(cfg.transport.reconnect.attempts, 2);
    assert_eq!(cfg.typing_timeout, Duration::from_millis(DEFAULT_TYPING_TIMEOUT_MS));

    unsafe {
        std::env::set_var("CHAT_TRANSPORTS", "carrier-pigeon");
    }
    assert!(matches!(ClientConfig::from_env(), Err(ConfigError::Parse(_))));

    unsafe { clear_chat_env() };
}

#[test]
fn parse_transports_dedupes_and_skips_blanks() {
    let kinds = parse_transports(" polling, ,websocket,polling ").unwrap();
    assert_eq!(kinds, vec![TransportKind::Polling, TransportKind::WebSocket]);
}

#[test]
fn reconnect_delay_doubles_and_caps() {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    assert_eq!(policy.delay_for(4), Duration::from_secs(5));
    assert_eq!(policy.delay_for(50), Duration::from_secs(5));
}
