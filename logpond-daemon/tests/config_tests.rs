//! Configuration loading and validation tests.
//!
//! Tests TOML parsing, environment variable overrides, partial configs, and validation.

use logpond_core::config::LogpondConfig;

#[test]
fn parse_full_config() {
    let toml_str = r#"
[general]
log_level = "debug"
log_format = "pretty"
data_dir = "/var/lib/logpond"
lock_file = "/var/lib/logpond/logpond.lock"

[queue]
pending_dir = "/var/lib/logpond/queue/pending"
processed_dir = "/var/lib/logpond/queue/processed"
batch_size = 1000
poll_interval_secs = 30

[parser]
rules_path = "/etc/logpond/parsing_rules.yml"

[storage]
database_url = "sqlite:///var/lib/logpond/logpond.db"
redis_url = "redis://cache:6379"
dedup_enabled = true

[analysis]
enabled = true
rules_path = "/etc/logpond/analysis_rules.yml"
"#;

    let config = LogpondConfig::parse(toml_str).expect("full config should parse");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.queue.batch_size, 1000);
    assert_eq!(config.queue.poll_interval_secs, 30);
    assert_eq!(config.parser.rules_path, "/etc/logpond/parsing_rules.yml");
    assert_eq!(config.storage.redis_url, "redis://cache:6379");
    assert!(config.storage.dedup_enabled);
    assert!(config.analysis.enabled);
    config.validate().expect("full config should validate");
}

#[test]
fn parse_partial_config_uses_defaults() {
    let toml_str = r#"
[general]
log_level = "warn"
"#;

    let config = LogpondConfig::parse(toml_str).expect("partial config should parse");

    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.queue.batch_size, 500);
    assert_eq!(config.queue.poll_interval_secs, 10);
    assert!(!config.analysis.enabled, "analysis is opt-in");
}

#[test]
fn serialized_config_round_trips() {
    let config = LogpondConfig::default();
    let toml_str = toml::to_string(&config).expect("default config should serialize");
    let parsed = LogpondConfig::parse(&toml_str).expect("serialized config should parse back");

    assert_eq!(parsed.general.log_level, config.general.log_level);
    assert_eq!(parsed.queue.pending_dir, config.queue.pending_dir);
    assert_eq!(parsed.storage.database_url, config.storage.database_url);
}

#[test]
#[serial_test::serial]
fn env_overrides_take_precedence() {
    // SAFETY: serialized by #[serial], no concurrent env access in this process
    unsafe {
        std::env::set_var("LOGPOND_QUEUE_BATCH_SIZE", "250");
        std::env::set_var("LOGPOND_STORAGE_REDIS_URL", "redis://override:6379");
    }

    let mut config = LogpondConfig::parse("[general]\nlog_level = \"info\"\n")
        .expect("config should parse");
    config.apply_env_overrides();

    assert_eq!(config.queue.batch_size, 250);
    assert_eq!(config.storage.redis_url, "redis://override:6379");

    // SAFETY: same as above
    unsafe {
        std::env::remove_var("LOGPOND_QUEUE_BATCH_SIZE");
        std::env::remove_var("LOGPOND_STORAGE_REDIS_URL");
    }
}

#[test]
fn validate_rejects_shared_queue_dirs() {
    let toml_str = r#"
[queue]
pending_dir = "/var/lib/logpond/queue"
processed_dir = "/var/lib/logpond/queue"
"#;

    let config = LogpondConfig::parse(toml_str).expect("config should parse");
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_unknown_log_format() {
    let toml_str = r#"
[general]
log_format = "xml"
"#;

    let config = LogpondConfig::parse(toml_str).expect("config should parse");
    assert!(config.validate().is_err());
}
