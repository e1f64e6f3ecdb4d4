use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FLAT_VARS: [&str; 8] = [
    "SOURCE_HANDLE",
    "DESTINATION_HANDLE",
    "SRC_APP_PASS",
    "DST_APP_PASS",
    "CHAR_LIMIT",
    "BSKY_HOST_URL",
    "OLLAMA_MODEL",
    "OLLAMA_HOST",
];

fn echopost(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("echopost");
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    for var in FLAT_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_flags() {
    let dir = TempDir::new().expect("temp dir");

    echopost(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--model"))
        .stdout(predicate::str::contains("--once"));
}

#[test]
fn missing_source_handle_fails() {
    let dir = TempDir::new().expect("temp dir");

    echopost(&dir)
        .args(["--once", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source handle is not set"));
}

#[test]
fn missing_destination_password_fails_outside_dry_run() {
    let dir = TempDir::new().expect("temp dir");

    echopost(&dir)
        .env("SOURCE_HANDLE", "writer.bsky.social")
        .env("DESTINATION_HANDLE", "echo.bsky.social")
        .env("SRC_APP_PASS", "source-pass")
        .arg("--once")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DST_APP_PASS"));
}

#[test]
fn missing_config_file_fails() {
    let dir = TempDir::new().expect("temp dir");

    echopost(&dir)
        .args(["--config", "does-not-exist.toml", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn once_dry_run_against_mock_pds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessJwt": "token",
            "refreshJwt": "refresh",
            "handle": "writer.bsky.social",
            "did": "did:plc:writer"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.identity.resolveHandle"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "did": "did:plc:writer" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.repo.listRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [
                {
                    "uri": "at://did:plc:writer/app.bsky.feed.post/1",
                    "value": {
                        "text": "Finished the first draft of my garden plan, tomatoes everywhere 🍅",
                        "createdAt": "2024-05-01T09:00:00.000Z"
                    }
                }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let host = server.uri();
    let dir = TempDir::new().expect("temp dir");
    let log_path = dir.path().join("log").join("echopost.log");

    let assert = tokio::task::spawn_blocking(move || {
        let assert = echopost(&dir)
            .env("SOURCE_HANDLE", "writer.bsky.social")
            .env("SRC_APP_PASS", "source-pass")
            .env("BSKY_HOST_URL", host)
            .env("ECHOPOST__LLM__PROVIDER", "stub")
            .args(["--once", "--dry-run"])
            .assert();
        (assert, dir)
    })
    .await
    .expect("join");

    let (assert, _dir) = assert;
    assert
        .success()
        .stderr(predicate::str::contains("[DRY RUN] Would publish"));

    let log = fs::read_to_string(&log_path).expect("log file written");
    let dry_run_line = log
        .lines()
        .find(|line| line.contains("[DRY RUN] Would publish"))
        .expect("dry run event in log file");
    let event: serde_json::Value = serde_json::from_str(dry_run_line).expect("json log line");
    assert_eq!(
        event["fields"]["text"],
        "Finished the first draft of my garden plan, tomatoes everywhere"
    );
}
