use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::{Duration, Utc};
use mooai_cli::commands::{doctor, migrate, prune};
use mooai_core::domain::conversation::{ContinuationRecord, ConversationKey};
use mooai_db::{connect_with_settings, ContinuationRepository, SqlContinuationRepository};
use serde_json::Value;

const VALID_ENV: [(&str, &str); 3] = [
    ("MOOAI_SLACK_APP_TOKEN", "xapp-test"),
    ("MOOAI_SLACK_BOT_TOKEN", "xoxb-test"),
    ("MOOAI_LLM_API_KEY", "sk-test"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&with_database(&VALID_ENV, "sqlite::memory:"), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_tokens() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_skipped_checks_when_config_invalid() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn doctor_flags_unmigrated_database() {
    let database = TempDatabase::new("doctor-unmigrated");
    with_env(&with_database(&VALID_ENV, &database.url()), || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        let schema = payload["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "continuation_schema"))
            .expect("schema check");
        assert_eq!(schema["status"], "fail");
        assert!(schema["details"].as_str().unwrap_or_default().contains("mooai migrate"));
    });
}

#[test]
fn doctor_passes_after_migrate_and_never_prints_tokens() {
    let database = TempDatabase::new("doctor-ready");
    with_env(&with_database(&VALID_ENV, &database.url()), || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(false);
        assert_eq!(result.exit_code, 0, "unexpected doctor output:\n{}", result.output);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("xoxb-***"));
        assert!(!result.output.contains("xoxb-test"));
    });
}

#[test]
fn prune_removes_only_expired_records() {
    let database = TempDatabase::new("prune");
    with_env(&with_database(&VALID_ENV, &database.url()), || {
        assert_eq!(migrate::run().exit_code, 0);
        seed_records(&database.url());

        let result = prune::run();
        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "prune");
        assert_eq!(payload["message"], "pruned 1 expired continuation records");

        let again = parse_payload(&prune::run().output);
        assert_eq!(again["message"], "pruned 0 expired continuation records");
    });
}

fn seed_records(database_url: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect_with_settings(database_url, 1, 5).await.expect("connect");
        let repository = SqlContinuationRepository::new(pool.clone());
        for (thread, offset) in [("1.0", Duration::days(-1)), ("2.0", Duration::days(1))] {
            repository
                .upsert(ContinuationRecord {
                    key: ConversationKey::new("U1", "D1", thread),
                    handle: format!("resp_{thread}"),
                    expires_at: Utc::now() + offset,
                })
                .await
                .expect("seed record");
        }
        pool.close().await;
    });
}

struct TempDatabase {
    path: PathBuf,
}

impl TempDatabase {
    fn new(name: &str) -> Self {
        let path = env::temp_dir().join(format!("mooai-cli-{name}-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

fn with_database<'a>(base: &[(&'a str, &'a str)], url: &'a str) -> Vec<(&'a str, &'a str)> {
    let mut vars = base.to_vec();
    vars.push(("MOOAI_DATABASE_URL", url));
    vars
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "MOOAI_DATABASE_URL",
        "MOOAI_DATABASE_MAX_CONNECTIONS",
        "MOOAI_DATABASE_TIMEOUT_SECS",
        "MOOAI_SLACK_APP_TOKEN",
        "MOOAI_SLACK_BOT_TOKEN",
        "MOOAI_SLACK_API_BASE_URL",
        "MOOAI_LLM_API_KEY",
        "OPENAI_API_KEY",
        "MOOAI_LLM_BASE_URL",
        "MOOAI_LLM_MODEL",
        "MOOAI_LLM_TIMEOUT_SECS",
        "MOOAI_LLM_CONTINUATION_MODE",
        "MOOAI_LLM_STRUCTURED_OUTPUT",
        "MOOAI_CONTEXT_TTL_DAYS",
        "MOOAI_SERVER_BIND_ADDRESS",
        "MOOAI_SERVER_HEALTH_CHECK_PORT",
        "MOOAI_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "MOOAI_LOGGING_LEVEL",
        "MOOAI_LOGGING_FORMAT",
        "MOOAI_LOG_LEVEL",
        "MOOAI_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
