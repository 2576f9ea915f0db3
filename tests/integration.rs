use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kw_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kw");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("towns.csv"),
        "city,zip\nSpringfield,11111\n\"Shelbyville, North\",22222\n",
    )
    .unwrap();
    fs::write(files_dir.join("services.txt"), "plumber\nelectrician\n\nroofer\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/kw.sqlite"

[media]
root = "{root}/data/media"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kw.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kw(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kw_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kw binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn attachment_id(add_stdout: &str) -> String {
    add_stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id: "))
        .expect("media add prints an id")
        .to_string()
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kw(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_kw(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_every_source() {
    let (_tmp, config_path) = setup_test_env();
    run_kw(&config_path, &["init"]);

    let (stdout, stderr, success) = run_kw(&config_path, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    for name in ["local", "csv_file", "csv_url", "database_table", "rss_feed", "spreadsheet", "ai"] {
        assert!(stdout.contains(name), "missing {} in:\n{}", name, stdout);
    }
}

#[test]
fn test_local_keyword_lifecycle() {
    let (tmp, config_path) = setup_test_env();
    run_kw(&config_path, &["init"]);

    let file = tmp.path().join("files/services.txt");
    let file_opt = format!("file={}", file.display());
    let (stdout, stderr, success) = run_kw(
        &config_path,
        &["keyword", "save", "service", "--source", "local", "--option", "data=handyman", "--option", &file_opt],
    );
    assert!(success, "save failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("terms: 4"));

    let (stdout, _, success) = run_kw(&config_path, &["keyword", "list"]);
    assert!(success);
    assert!(stdout.contains("service"));
    assert!(stdout.contains("local"));

    let (stdout, _, success) = run_kw(&config_path, &["keyword", "terms", "service", "--refresh"]);
    assert!(success);
    assert!(stdout.contains("handyman"));
    assert!(stdout.contains("roofer"));

    let (_, _, success) = run_kw(&config_path, &["keyword", "delete", "service"]);
    assert!(success);
    let (_, stderr, success) = run_kw(&config_path, &["keyword", "get", "service"]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_local_column_mismatch_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_kw(&config_path, &["init"]);

    let (_, stderr, success) = run_kw(
        &config_path,
        &[
            "keyword", "save", "town", "--source", "local",
            "--option", "data=Springfield,11111,IL",
            "--option", "delimiter=,",
            "--option", "columns=city,zip",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("(2)") && stderr.contains("(3)"), "stderr: {}", stderr);

    let (stdout, _, _) = run_kw(&config_path, &["keyword", "list"]);
    assert!(stdout.contains("No keywords."));
}

#[test]
fn test_csv_file_keyword_and_missing_attachment() {
    let (tmp, config_path) = setup_test_env();
    run_kw(&config_path, &["init"]);

    let csv = tmp.path().join("files/towns.csv");
    let (stdout, stderr, success) = run_kw(&config_path, &["media", "add", csv.to_str().unwrap()]);
    assert!(success, "media add failed: {}", stderr);
    let id = attachment_id(&stdout);

    let id_opt = format!("attachment_id={}", id);
    let (stdout, stderr, success) = run_kw(
        &config_path,
        &["keyword", "save", "town", "--source", "csv_file", "--option", &id_opt, "--option", "columns_first_row=true"],
    );
    assert!(success, "save failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("columns: city,zip"));
    assert!(stdout.contains("terms: 2"));

    let (stdout, _, success) = run_kw(&config_path, &["keyword", "get", "town"]);
    assert!(success);
    assert!(stdout.contains("zip: 22222"));
    assert!(stdout.contains("city: Shelbyville, North"));

    let (_, _, success) = run_kw(&config_path, &["media", "delete", &id]);
    assert!(success);

    // Refresh fails and names the keyword.
    let (_, stderr, success) = run_kw(&config_path, &["keyword", "refresh", "town"]);
    assert!(!success);
    assert!(stderr.contains("Keyword 'town'"), "stderr: {}", stderr);

    // Falling back keeps the stored terms.
    let (stdout, stderr, success) =
        run_kw(&config_path, &["keyword", "terms", "town", "--refresh", "--ignore-errors"]);
    assert!(success, "terms failed: {}", stderr);
    assert!(stdout.contains("Springfield"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_kw(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
