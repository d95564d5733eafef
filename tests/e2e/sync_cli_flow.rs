//! End-to-end `csync` flow against a sqlite change table and a mock backend.

use rusqlite::Connection;
use serde_json::{Value, json};
use std::io;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Runtime;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Workspace {
    dir: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn create(label: &str, backend: &str) -> io::Result<Self> {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("csync-e2e-{label}-{unique}"));
        std::fs::create_dir_all(&dir)?;

        let conn = Connection::open(dir.join("catalog.db")).map_err(io::Error::other)?;
        conn.execute_batch(
            "CREATE TABLE catalog_product_cl (
                version_id INTEGER PRIMARY KEY,
                entity_id INTEGER NOT NULL
            );",
        )
        .map_err(io::Error::other)?;

        let config = dir.join("csync.json");
        let body = json!({
            "version": 1,
            "core": { "retry": { "maxAttempts": 1, "baseDelayMs": 1, "maxDelayMs": 5 } },
            "changelog": { "path": dir.join("catalog.db") },
            "watermarks": { "path": dir.join("sync-state.db") },
            "notifier": { "baseUrl": backend },
            "partitions": [
                { "id": "1" },
                { "id": "2", "enabled": false }
            ],
            "scheduler": { "intervalMs": 1000 },
            "logging": { "level": "warn" }
        });
        std::fs::write(&config, body.to_string())?;
        Ok(Self { dir, config })
    }

    fn append(&self, rows: &[(i64, i64)]) -> io::Result<()> {
        let conn = Connection::open(self.dir.join("catalog.db")).map_err(io::Error::other)?;
        for row in rows {
            conn.execute(
                "INSERT INTO catalog_product_cl (version_id, entity_id) VALUES (?1, ?2)",
                *row,
            )
            .map_err(io::Error::other)?;
        }
        Ok(())
    }

    fn csync(&self, args: &[&str]) -> io::Result<Output> {
        let mut command = Command::new(env!("CARGO_BIN_EXE_csync"));
        for (key, _) in std::env::vars() {
            if key.starts_with("CSY_") {
                command.env_remove(key);
            }
        }
        command
            .args(args)
            .arg("--config")
            .arg(&self.config)
            .env("CSY_NOTIFIER_TOKEN", "e2e-token")
            .output()
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn stdout_json(output: &Output) -> io::Result<Value> {
    serde_json::from_slice(&output.stdout).map_err(io::Error::other)
}

fn partition_outcome<'a>(report: &'a Value, id: &str) -> Option<&'a Value> {
    report
        .get("report")?
        .get("partitions")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("partitionId").and_then(Value::as_str) == Some(id))?
        .get("outcome")
}

fn status_of<'a>(report: &'a Value, id: &str) -> Option<&'a str> {
    partition_outcome(report, id)?.get("status")?.as_str()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "csync failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn first_run_initializes_then_later_runs_deliver_deltas() -> io::Result<()> {
    let runtime = Runtime::new()?;
    let server = runtime.block_on(MockServer::start());
    runtime.block_on(
        Mock::given(method("POST"))
            .and(path("/catalog/changes"))
            .and(header("authorization", "Bearer e2e-token"))
            .and(body_json(json!({ "product_ids": [20, 21] })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server),
    );
    let workspace = Workspace::create("flow", &server.uri())?;
    workspace.append(&[(1, 10), (2, 11)])?;

    let first = workspace.csync(&["run", "--output", "json"])?;
    assert_success(&first);
    let first = stdout_json(&first)?;
    assert_eq!(status_of(&first, "1"), Some("initialized"));
    assert_eq!(status_of(&first, "2"), Some("disabled"));

    workspace.append(&[(3, 21), (4, 20), (5, 21)])?;
    let second = workspace.csync(&["run", "--output", "json"])?;
    assert_success(&second);
    let second = stdout_json(&second)?;
    assert_eq!(status_of(&second, "1"), Some("advanced"));
    assert_eq!(
        partition_outcome(&second, "1")
            .and_then(|outcome| outcome.get("notified"))
            .and_then(Value::as_u64),
        Some(2)
    );

    let status = workspace.csync(&["status", "--output", "json"])?;
    assert_success(&status);
    let status = stdout_json(&status)?;
    let lag = status
        .get("sync")
        .and_then(|sync| sync.get("partitions"))
        .and_then(Value::as_array)
        .and_then(|partitions| partitions.first())
        .and_then(|partition| partition.get("lag"))
        .and_then(Value::as_u64);
    assert_eq!(lag, Some(0));

    runtime.block_on(server.verify());
    workspace.cleanup();
    Ok(())
}

#[test]
fn rejected_delivery_is_retried_on_the_next_run() -> io::Result<()> {
    let runtime = Runtime::new()?;
    let server = runtime.block_on(MockServer::start());
    let workspace = Workspace::create("retry", &server.uri())?;
    workspace.append(&[(1, 1)])?;
    assert_success(&workspace.csync(&["run"])?);

    workspace.append(&[(2, 7)])?;
    runtime.block_on(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server),
    );
    let pending = workspace.csync(&["run", "--output", "json"])?;
    assert_success(&pending);
    assert_eq!(status_of(&stdout_json(&pending)?, "1"), Some("notify_pending"));

    runtime.block_on(server.reset());
    runtime.block_on(
        Mock::given(method("POST"))
            .and(body_json(json!({ "product_ids": [7] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server),
    );
    let delivered = workspace.csync(&["run", "--output", "json"])?;
    assert_success(&delivered);
    assert_eq!(status_of(&stdout_json(&delivered)?, "1"), Some("advanced"));

    runtime.block_on(server.verify());
    workspace.cleanup();
    Ok(())
}

#[test]
fn missing_feed_database_aborts_without_touching_watermarks() -> io::Result<()> {
    let workspace = Workspace::create("nofeed", "http://127.0.0.1:9")?;
    std::fs::remove_file(workspace.dir.join("catalog.db"))?;

    let output = workspace.csync(&["run", "--output", "json"])?;
    assert_success(&output);
    let report = stdout_json(&output)?;
    let reason = report
        .get("report")
        .and_then(|report| report.get("outcome"))
        .and_then(|outcome| outcome.get("reason"))
        .and_then(|reason| reason.get("kind"))
        .and_then(Value::as_str);
    assert_eq!(reason, Some("feed_unavailable"));
    assert!(!workspace.dir.join("sync-state.db").exists());

    workspace.cleanup();
    Ok(())
}

#[test]
fn daemon_stops_after_max_ticks() -> io::Result<()> {
    let workspace = Workspace::create("daemon", "http://127.0.0.1:9")?;
    workspace.append(&[(1, 1)])?;

    let output = workspace.csync(&["daemon", "--max-ticks", "1", "--output", "json"])?;
    assert_success(&output);
    let summary = stdout_json(&output)?;
    assert_eq!(
        summary
            .get("daemon")
            .and_then(|daemon| daemon.get("ticks"))
            .and_then(Value::as_u64),
        Some(1)
    );

    workspace.cleanup();
    Ok(())
}
