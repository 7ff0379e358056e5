//! Orchestrator integration tests.
//!
//! Tests the full flow: config loading -> pipeline assembly -> queue drain.

use std::fs;
use std::path::Path;

use logpond_core::config::LogpondConfig;
use logpond_daemon::orchestrator::Orchestrator;

const PARSING_RULES: &str = r#"
- name: ssh_failed_password
  log_source: auth
  method: regex
  regex: 'Failed password for (?P<user>\S+) from (?P<src_ip>[\d.]+)'
  cim_mapping:
    user: "{user}"
    src_ip: "{src_ip}"
    action: denied
"#;

const ANALYSIS_RULES: &str = r#"
- name: failed_password
  log_source: auth
  pattern: "Failed password*"
"#;

/// Build a config whose paths all live under `dir`.
fn test_config(dir: &Path) -> LogpondConfig {
    let rules_path = dir.join("parsing_rules.yml");
    fs::write(&rules_path, PARSING_RULES).expect("failed to write parsing rules");
    let analysis_path = dir.join("analysis_rules.yml");
    fs::write(&analysis_path, ANALYSIS_RULES).expect("failed to write analysis rules");

    let toml_str = format!(
        r#"
[general]
log_level = "info"
log_format = "json"
data_dir = "{dir}"
lock_file = "{dir}/logpond.lock"

[queue]
pending_dir = "{dir}/pending"
processed_dir = "{dir}/processed"
batch_size = 100
poll_interval_secs = 1

[parser]
rules_path = "{rules}"

[storage]
database_url = "sqlite://{dir}/logpond.db"
redis_url = "redis://127.0.0.1:6379"
dedup_enabled = false

[analysis]
enabled = true
rules_path = "{analysis}"
"#,
        dir = dir.display(),
        rules = rules_path.display(),
        analysis = analysis_path.display(),
    );
    LogpondConfig::parse(&toml_str).expect("failed to parse test config")
}

#[tokio::test]
async fn build_from_config_assembles_pipeline() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config(tmp.path());

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("failed to build orchestrator");

    assert_eq!(orchestrator.config().queue.batch_size, 100);
}

#[tokio::test]
async fn build_fails_on_missing_parsing_rules() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let mut config = test_config(tmp.path());
    config.parser.rules_path = tmp.path().join("missing.yml").display().to_string();

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn run_once_drains_pending_files() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config(tmp.path());
    let pending = tmp.path().join("pending");
    let processed = tmp.path().join("processed");
    fs::create_dir_all(&pending).expect("failed to create pending dir");

    fs::write(
        pending.join("web01_auth_20260829.log"),
        "Aug 29 10:00:00 web01 sshd[1234]: Failed password for root from 10.0.0.5 port 22 ssh2\n",
    )
    .expect("failed to write capture file");

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("failed to build orchestrator");

    let summary = orchestrator.run_once().await.expect("drain failed");

    assert_eq!(summary.files_committed, 1);
    assert_eq!(summary.records_committed, 1);
    assert!(processed.join("web01_auth_20260829.log").exists());
    assert!(!pending.join("web01_auth_20260829.log").exists());
}

#[tokio::test]
async fn run_once_on_empty_queue_commits_nothing() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config(tmp.path());

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("failed to build orchestrator");

    let summary = orchestrator.run_once().await.expect("drain failed");

    assert_eq!(summary.files_committed, 0);
    assert_eq!(summary.records_committed, 0);
}
