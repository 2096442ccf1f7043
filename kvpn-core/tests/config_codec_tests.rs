//! Tests for reading and writing the Kerio client record

mod common;

use common::{codec, FakeProbe, MemoryStore, CONFIG_PATH, SAMPLE_RECORD, TEMP_PATH};
use kvpn_core::config::VpnConfig;
use std::sync::atomic::Ordering;

fn sample_config() -> VpnConfig {
    let mut config = VpnConfig::new(
        "vpn.example.com".to_string(),
        "alice".to_string(),
        "p<a>ss&w\"o'rd!#$".to_string(),
    );
    config.port = 4443;
    config.fingerprint = "68:8E:2B:1A:00:FF".to_string();
    config.active = true;
    config
}

#[tokio::test]
async fn test_read_sample_record() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(CONFIG_PATH, SAMPLE_RECORD);

    let config = codec(&probe, &store).read_config().await.unwrap();

    assert_eq!(config.server, "vpn.example.com");
    assert_eq!(config.port, 4090);
    assert_eq!(config.username, "alice");
    assert_eq!(config.password(), "s3cr!t");
    assert_eq!(config.fingerprint, "68:8E:2B:1A:00:FF");
    assert!(config.active);
}

#[tokio::test]
async fn test_read_missing_file_returns_none() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();

    assert!(codec(&probe, &store).read_config().await.is_none());
}

#[tokio::test]
async fn test_read_server_with_custom_port() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(CONFIG_PATH, "<server>gw.corp.lan:8443</server>");

    let config = codec(&probe, &store).read_config().await.unwrap();
    assert_eq!(config.server, "gw.corp.lan");
    assert_eq!(config.port, 8443);
}

#[tokio::test]
async fn test_read_server_without_port_uses_default() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(CONFIG_PATH, "<server>gw.corp.lan</server>");

    let config = codec(&probe, &store).read_config().await.unwrap();
    assert_eq!(config.server, "gw.corp.lan");
    assert_eq!(config.port, 4090);
}

#[tokio::test]
async fn test_read_invalid_port_keeps_default() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(CONFIG_PATH, "<server>gw.corp.lan:https</server>");

    let config = codec(&probe, &store).read_config().await.unwrap();
    assert_eq!(config.server, "gw.corp.lan");
    assert_eq!(config.port, 4090);
}

#[tokio::test]
async fn test_read_missing_fields_keep_defaults() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(
        CONFIG_PATH,
        "<config><server>vpn:4090</server><username>bob</username></config>",
    );

    let config = codec(&probe, &store).read_config().await.unwrap();
    assert_eq!(config.username, "bob");
    assert_eq!(config.password(), "");
    assert_eq!(config.fingerprint, "");
    assert!(!config.active);
}

#[tokio::test]
async fn test_read_first_occurrence_wins() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(
        CONFIG_PATH,
        "<username>first</username>\n<username>second</username>",
    );

    let config = codec(&probe, &store).read_config().await.unwrap();
    assert_eq!(config.username, "first");
}

#[tokio::test]
async fn test_read_ignores_multiline_and_unclosed_values() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(
        CONFIG_PATH,
        "<username>split\nacross</username>\n<password>never closed\n<server>ok:1</server>",
    );

    let config = codec(&probe, &store).read_config().await.unwrap();
    assert_eq!(config.username, "");
    assert_eq!(config.password(), "");
    assert_eq!(config.server, "ok");
    assert_eq!(config.port, 1);
}

#[tokio::test]
async fn test_read_active_only_when_exactly_one() {
    let probe = FakeProbe::new();

    for (value, expected) in [("1", true), ("0", false), ("true", false), (" 1", false)] {
        let store = MemoryStore::with_file(CONFIG_PATH, &format!("<active>{}</active>", value));
        let config = codec(&probe, &store).read_config().await.unwrap();
        assert_eq!(config.active, expected, "active value {:?}", value);
    }
}

#[tokio::test]
async fn test_read_invalid_utf8_is_tolerated() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();
    let codec = codec(&probe, &store);

    let mut bytes = b"<username>al\xffice</username>".to_vec();
    bytes.extend_from_slice(b"<server>vpn:4090</server>");
    kvpn_core::config::FileStore::write_file(&store, std::path::Path::new(CONFIG_PATH), &bytes)
        .await
        .unwrap();

    let config = codec.read_config().await.unwrap();
    assert_eq!(config.server, "vpn");
    assert_eq!(config.username, "al\u{FFFD}ice");
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();
    let codec = codec(&probe, &store);
    let config = sample_config();

    assert!(codec.write_config(&config).await);

    let read_back = codec.read_config().await.unwrap();
    assert_eq!(read_back, config);
}

#[tokio::test]
async fn test_write_then_read_multiline_credentials() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();
    let codec = codec(&probe, &store);
    let mut config = sample_config();
    config.username = "first\nlast".to_string();
    config.password = secrecy::Secret::new("line1\nline2\r\n".to_string());

    assert!(config.validate().is_ok());
    assert!(codec.write_config(&config).await);

    let on_disk = store.get(CONFIG_PATH).unwrap();
    assert!(on_disk.contains("<password>line1&#10;line2&#13;&#10;</password>"));

    let read_back = codec.read_config().await.unwrap();
    assert_eq!(read_back.username, "first\nlast");
    assert_eq!(read_back.password(), "line1\nline2\r\n");
}

#[tokio::test]
async fn test_write_obfuscates_password_on_disk() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();

    assert!(codec(&probe, &store).write_config(&sample_config()).await);

    let on_disk = store.get(CONFIG_PATH).unwrap();
    assert!(on_disk.starts_with("\n<config>"));
    assert!(on_disk.contains("<server>vpn.example.com:4443</server>"));
    assert!(on_disk.contains(
        "<password>p&lt;a&gt;ss&amp;w&quot;o&#39;rd&#33;&#35;&#36;</password>"
    ));
    assert!(!on_disk.contains("p<a>ss"));
}

#[tokio::test]
async fn test_write_moves_temp_file_and_restarts_once() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();

    assert!(codec(&probe, &store).write_config(&sample_config()).await);

    assert!(store.get(TEMP_PATH).is_none(), "temp file left behind");
    assert!(store.get(CONFIG_PATH).is_some());
    assert_eq!(probe.restart_calls(), 1);
}

#[tokio::test]
async fn test_write_staging_failure() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(CONFIG_PATH, SAMPLE_RECORD);
    store.fail_write.store(true, Ordering::SeqCst);

    assert!(!codec(&probe, &store).write_config(&sample_config()).await);

    assert_eq!(store.get(CONFIG_PATH).as_deref(), Some(SAMPLE_RECORD));
    assert_eq!(probe.restart_calls(), 0);
}

#[tokio::test]
async fn test_write_move_failure_skips_restart() {
    let probe = FakeProbe::new();
    let store = MemoryStore::with_file(CONFIG_PATH, SAMPLE_RECORD);
    store.fail_move.store(true, Ordering::SeqCst);

    assert!(!codec(&probe, &store).write_config(&sample_config()).await);

    assert_eq!(store.get(CONFIG_PATH).as_deref(), Some(SAMPLE_RECORD));
    assert_eq!(probe.restart_calls(), 0);
}

#[tokio::test]
async fn test_write_restart_failure_reports_false_without_rollback() {
    let probe = FakeProbe::new();
    probe.restart_code.store(1, Ordering::SeqCst);
    let store = MemoryStore::with_file(CONFIG_PATH, SAMPLE_RECORD);
    let codec = codec(&probe, &store);

    assert!(!codec.write_config(&sample_config()).await);

    assert_eq!(probe.restart_calls(), 1);
    let on_disk = codec.read_config().await.unwrap();
    assert_eq!(on_disk.port, 4443, "new record stays in place");
}

#[test]
fn test_codec_reports_its_path() {
    let probe = FakeProbe::new();
    let store = MemoryStore::new();
    assert_eq!(
        codec(&probe, &store).config_path(),
        std::path::Path::new(CONFIG_PATH)
    );
}
