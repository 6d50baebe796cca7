//! End-to-end CLI tests for postdesk.
//!
//! These tests exercise the full CLI binary with isolated test environments.
//! Each test creates its own temporary data directory and config so runs
//! never touch a user's posts or reach a real search engine.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

// =============================================================================
// Test Environment Helper
// =============================================================================

/// Isolated test environment with its own data directory and config.
struct TestEnv {
    temp_dir: TempDir,
    data_dir: PathBuf,
    config_path: PathBuf,
}

impl TestEnv {
    /// Create a new environment with search disabled.
    fn new() -> Self {
        Self::with_search("[search]\nengine = \"none\"\n")
    }

    /// Create an environment with a custom `[search]` section.
    fn with_search(search_section: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();

        let data_dir = root.join("data");
        let config_path = root.join("config.toml");
        let config_content = format!(
            "[storage]\ndata_dir = '{}'\n\n{search_section}",
            data_dir.display()
        );
        fs::write(&config_path, config_content).expect("Failed to write config");

        Self {
            temp_dir,
            data_dir,
            config_path,
        }
    }

    /// Get a Command configured for this test environment.
    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("postdesk");
        cmd.env("POSTDESK_CONFIG", &self.config_path);
        cmd.env("RUST_LOG", "warn");
        cmd
    }

    /// Write a scratch file outside the data directory.
    fn scratch_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("Failed to write scratch file");
        path
    }

    /// Create a post through the CLI and return its JSON.
    fn create(&self, title: &str, category: &str) -> Value {
        let output = self
            .command()
            .args([
                "create",
                "--title",
                title,
                "--department",
                "IT부서",
                "--author",
                "홍길동",
                "--category",
                category,
                "--content",
                "<p>테스트 내용입니다.</p>",
            ])
            .output()
            .expect("Failed to run create");

        assert!(output.status.success(), "create failed: {output:?}");
        serde_json::from_slice(&output.stdout).expect("create prints JSON")
    }
}

// =============================================================================
// 1. Help / No Command Tests
// =============================================================================

#[test]
fn tc_1_1_no_subcommand_shows_help() {
    let env = TestEnv::new();

    env.command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("upload-image"));
}

#[test]
fn tc_1_2_help_flag() {
    let env = TestEnv::new();

    env.command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Post and attachment backend"));
}

#[test]
fn tc_1_3_version_flag() {
    let env = TestEnv::new();

    env.command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("postdesk"));
}

// =============================================================================
// 2. Create / Get Tests
// =============================================================================

#[test]
fn tc_2_1_create_then_get_counts_view() {
    let env = TestEnv::new();

    let created = env.create("테스트 게시물", "공지");
    assert_eq!(created["views"], 0);
    assert_eq!(created["attachments"], Value::Array(vec![]));
    assert_eq!(created["uploaded_images"], Value::Array(vec![]));

    let id = created["id"].as_str().unwrap();
    assert_eq!(id.len(), 32);

    env.command()
        .args(["get", id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"views\": 1"))
        .stdout(predicate::str::contains("테스트 게시물"));
}

#[test]
fn tc_2_2_create_writes_json_record() {
    let env = TestEnv::new();

    let created = env.create("stored", "notice");
    let id = created["id"].as_str().unwrap();

    let record = env.data_dir.join("posts").join(format!("{id}.json"));
    assert!(record.exists());
    let on_disk: Value = serde_json::from_str(&fs::read_to_string(record).unwrap()).unwrap();
    assert_eq!(on_disk["title"], "stored");
    assert!(on_disk["postDate"].is_string());
}

#[test]
fn tc_2_3_create_reads_content_from_stdin() {
    let env = TestEnv::new();

    env.command()
        .args([
            "create", "-t", "stdin post", "-d", "HR", "-a", "lee", "-C", "notice",
        ])
        .write_stdin("<p>from stdin</p>")
        .assert()
        .success()
        .stdout(predicate::str::contains("<p>from stdin</p>"));
}

#[test]
fn tc_2_4_create_reads_content_from_file() {
    let env = TestEnv::new();
    let body = env.scratch_file("body.html", "<p>from file</p>".as_bytes());

    env.command()
        .args(["create", "-t", "file post", "-d", "HR", "-a", "lee", "-C", "notice"])
        .arg("--file")
        .arg(&body)
        .assert()
        .success()
        .stdout(predicate::str::contains("<p>from file</p>"));
}

#[test]
fn tc_2_5_create_with_attachment() {
    let env = TestEnv::new();
    let attachment = env.scratch_file("report.pdf", b"%PDF-1.4 test");

    let output = env
        .command()
        .args([
            "create", "-t", "with file", "-d", "IT", "-a", "kim", "-C", "notice", "--content",
            "<p>see attached</p>",
        ])
        .arg("--attach")
        .arg(&attachment)
        .output()
        .unwrap();
    assert!(output.status.success());

    let post: Value = serde_json::from_slice(&output.stdout).unwrap();
    let attachments = post["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["name"], "report.pdf");
    assert_eq!(attachments[0]["size"], "13B");
    assert!(
        attachments[0]["downloadUrl"]
            .as_str()
            .unwrap()
            .starts_with("/api/attachments/")
    );
}

#[test]
fn tc_2_6_create_blank_title_fails() {
    let env = TestEnv::new();

    env.command()
        .args([
            "create", "-t", "  ", "-d", "IT", "-a", "kim", "-C", "notice", "--content", "x",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("title is required"));
}

#[test]
fn tc_2_7_create_malformed_badges_fails() {
    let env = TestEnv::new();

    env.command()
        .args([
            "create", "-t", "badges", "-d", "IT", "-a", "kim", "-C", "notice", "--content", "x",
            "--badges", "new, hot",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("badges must be a JSON array"));
}

#[test]
fn tc_2_8_create_with_badges_and_end_date() {
    let env = TestEnv::new();

    env.command()
        .args([
            "create", "-t", "event", "-d", "IT", "-a", "kim", "-C", "행사", "--content", "x",
            "--badges", r#"["new","중요"]"#, "--end-date", "2030-01-31",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"endDate\": \"2030-01-31\""))
        .stdout(predicate::str::contains("중요"));
}

#[test]
fn tc_2_9_get_unknown_id_fails() {
    let env = TestEnv::new();

    env.command()
        .args(["get", "0123456789abcdef0123456789abcdef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// =============================================================================
// 3. List Tests
// =============================================================================

#[test]
fn tc_3_1_list_empty() {
    let env = TestEnv::new();

    env.command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No posts found."));
}

#[test]
fn tc_3_2_list_shows_posts() {
    let env = TestEnv::new();
    env.create("first post", "notice");
    env.create("second post", "event");

    env.command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("first post"))
        .stdout(predicate::str::contains("second post"));
}

#[test]
fn tc_3_3_list_category_filter() {
    let env = TestEnv::new();
    env.create("first post", "notice");
    env.create("second post", "event");

    env.command()
        .args(["list", "--category", "event"])
        .assert()
        .success()
        .stdout(predicate::str::contains("second post"))
        .stdout(predicate::str::contains("first post").not());
}

// =============================================================================
// 4. Search Tests
// =============================================================================

#[test]
fn tc_4_1_search_korean_title() {
    let env = TestEnv::new();
    env.create("테스트 게시물", "공지");
    env.create("다른 글", "공지");

    env.command()
        .args(["search", "테스트 게시물"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## 테스트 게시물"))
        .stdout(predicate::str::contains("*1 result(s) found*"));
}

#[test]
fn tc_4_2_search_no_results() {
    let env = TestEnv::new();
    env.create("테스트 게시물", "공지");

    env.command()
        .args(["search", "zzzzz"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matches found for 'zzzzz'"));
}

#[test]
fn tc_4_3_search_falls_back_when_engine_down() {
    let env = TestEnv::with_search(
        "[search]\nengine = \"elasticsearch\"\nurl = \"http://127.0.0.1:1\"\ntimeout_secs = 1\n",
    );
    env.create("fallback post", "notice");

    env.command()
        .args(["search", "fallback"])
        .assert()
        .success()
        .stdout(predicate::str::contains("*1 result(s) found*"));
}

#[test]
fn tc_4_4_search_limit() {
    let env = TestEnv::new();
    for i in 0..3 {
        env.create(&format!("limited {i}"), "notice");
    }

    env.command()
        .args(["search", "limited", "--limit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("*2 result(s) found*"));
}

#[test]
fn tc_4_5_search_query_too_long() {
    let env = TestEnv::new();

    env.command()
        .args(["search", &"a".repeat(1001)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("query too long"));
}

#[test]
fn tc_4_6_search_long_hangul_query_within_limit() {
    let env = TestEnv::new();

    // 400 characters, 1200 bytes.
    env.command()
        .args(["search", &"테".repeat(400)])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matches found"));
}

// =============================================================================
// 5. Image Upload Tests
// =============================================================================

#[test]
fn tc_5_1_upload_image() {
    let env = TestEnv::new();
    let image = env.scratch_file("logo.png", &[0x89, b'P', b'N', b'G']);

    env.command()
        .arg("upload-image")
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded logo.png as /static/images/"));

    let stored: Vec<_> = fs::read_dir(env.data_dir.join("images")).unwrap().collect();
    assert_eq!(stored.len(), 1);
}

#[test]
fn tc_5_2_upload_non_image_fails() {
    let env = TestEnv::new();
    let text = env.scratch_file("notes.txt", b"hello");

    env.command()
        .arg("upload-image")
        .arg(&text)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Only image files are allowed"));
}

// =============================================================================
// 6. Config / Engine Tests
// =============================================================================

#[test]
fn tc_6_1_reindex_without_engine_fails() {
    let env = TestEnv::new();

    env.command()
        .arg("reindex")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No search engine configured"));
}

#[test]
fn tc_6_2_invalid_config_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "this is not valid toml {{{{").unwrap();

    cargo_bin_cmd!("postdesk")
        .env("POSTDESK_CONFIG", &config_path)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn tc_6_3_missing_explicit_config() {
    cargo_bin_cmd!("postdesk")
        .args(["--config", "/nonexistent/postdesk.toml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn tc_6_4_data_dir_override() {
    let env = TestEnv::new();
    let other = env.temp_dir.path().join("other");

    env.command()
        .arg("--data-dir")
        .arg(&other)
        .args([
            "create", "-t", "elsewhere", "-d", "IT", "-a", "kim", "-C", "notice", "--content",
            "x",
        ])
        .assert()
        .success();

    assert_eq!(fs::read_dir(other.join("posts")).unwrap().count(), 1);

    env.command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No posts found."));
}

#[test]
fn tc_6_5_unknown_engine_rejected() {
    let env = TestEnv::new();

    env.command()
        .args(["--engine", "solr", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
