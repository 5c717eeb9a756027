use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use agentforge_cli::commands::{config, discover, migrate, validate};
use agentforge_core::domain::tool::BUILTIN_TOOLS;
use serde_json::{json, Value};

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(&[("AGENTFORGE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_rejects_non_sqlite_url_as_config_failure() {
    with_env(&[("AGENTFORGE_DATABASE_URL", "postgres://localhost/agentforge")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_keys() {
    with_env(
        &[
            ("AGENTFORGE_DATABASE_URL", "sqlite://from-env.db"),
            ("AGENTFORGE_ASSISTANTS_API_KEY", "sk-live-secret"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let entries = payload["details"].as_array().expect("config entries");
            let entry = |key: &str| {
                entries.iter().find(|entry| entry["key"] == key).cloned().expect("entry present")
            };

            let database = entry("database.url");
            assert_eq!(database["value"], "sqlite://from-env.db");
            assert_eq!(database["source"], "env (AGENTFORGE_DATABASE_URL)");

            let api_key = entry("assistants.api_key");
            assert_eq!(api_key["value"], "sk-***");
            assert!(!result.output.contains("live-secret"));

            assert_eq!(entry("functions.service_key")["value"], "<unset>");
            assert_eq!(entry("server.port")["source"], "default");
        },
    );
}

#[test]
fn discover_registers_every_builtin_tool_and_is_repeatable() {
    with_env(
        &[
            ("AGENTFORGE_DATABASE_URL", "sqlite::memory:"),
            ("AGENTFORGE_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            for _ in 0..2 {
                let result = discover::run();
                assert_eq!(result.exit_code, 0, "discover failed: {}", result.output);

                let payload = parse_payload(&result.output);
                assert_eq!(payload["details"]["discovered"], json!(BUILTIN_TOOLS.len()));
                let tools = payload["details"]["tools"].as_array().expect("tool names");
                assert!(tools.contains(&json!("send-automated-email")));
            }
        },
    );
}

#[test]
fn validate_accepts_well_formed_blueprint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blueprint.json");
    let blueprint = json!({
        "assistants": [{"name": "Market Analyst", "instructions": "Answer market questions."}],
        "sdk_agents": [{
            "name": "Agent1",
            "responsibility": "Email the customer when an order is created.",
            "triggers": ["order_created"],
            "tools": ["Send Email"]
        }],
        "tools": [{
            "name": "Send Email",
            "type": "email",
            "function_name": "send-automated-email",
            "used_by": ["Agent1"]
        }],
        "workflows": []
    });
    fs::write(&path, blueprint.to_string()).expect("write blueprint");

    let result = validate::run(&path);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["summary"]["sdk_agents"], 1);
    assert_eq!(payload["details"]["errors"], json!([]));
}

#[test]
fn validate_lists_every_violation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blueprint.json");
    let blueprint = json!({
        "assistants": [{"name": "Helper", "instructions": "Help.", "triggers": ["order_created"]}],
        "sdk_agents": [{"name": "Agent1", "responsibility": "x", "tools": ["t"]}],
        "tools": [],
        "workflows": []
    });
    fs::write(&path, blueprint.to_string()).expect("write blueprint");

    let result = validate::run(&path);
    assert_eq!(result.exit_code, 1);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "validation");
    assert_eq!(
        payload["details"]["errors"],
        json!([
            "Assistant[0] must not have triggers (chat/analysis only)",
            "SDK Agent[0] must have at least one trigger (event-driven)"
        ])
    );
}

#[test]
fn validate_reports_unreadable_and_malformed_files() {
    let dir = tempfile::tempdir().expect("tempdir");

    let missing = validate::run(&dir.path().join("absent.json"));
    assert_eq!(missing.exit_code, 2);
    assert_eq!(parse_payload(&missing.output)["error_class"], "io");

    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").expect("write file");
    let malformed = validate::run(&path);
    assert_eq!(malformed.exit_code, 3);
    assert_eq!(parse_payload(&malformed.output)["error_class"], "parse");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "AGENTFORGE_DATABASE_URL",
        "AGENTFORGE_DATABASE_MAX_CONNECTIONS",
        "AGENTFORGE_DATABASE_TIMEOUT_SECS",
        "AGENTFORGE_ASSISTANTS_API_KEY",
        "OPENAI_API_KEY",
        "AGENTFORGE_ASSISTANTS_BASE_URL",
        "AGENTFORGE_FUNCTIONS_BASE_URL",
        "AGENTFORGE_FUNCTIONS_SERVICE_KEY",
        "AGENTFORGE_SERVER_BIND_ADDRESS",
        "AGENTFORGE_SERVER_PORT",
        "AGENTFORGE_LOGGING_LEVEL",
        "AGENTFORGE_LOGGING_FORMAT",
        "AGENTFORGE_LOG_LEVEL",
        "AGENTFORGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
