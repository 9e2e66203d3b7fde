use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cix_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cix");
    path
}

const DOCS: &str = r#"{"content": "/// Sums invoice lines.\npub fn calculate_invoice_total(lines: &[Line]) -> u64 {\n    lines.iter().map(|l| l.amount).sum()\n}", "metadata": {"source_type": "code", "file_path": "src/invoice.rs", "tenant_id": "acme"}}
{"content": "pub fn reconcile_ledger_entries(book: &mut Book) {\n    book.settle();\n}", "metadata": {"source_type": "code", "file_path": "src/ledger.rs", "tenant_id": "acme"}}
{"content": "fn foreign() {}", "metadata": {"source_type": "code", "file_path": "src/other.rs", "tenant_id": "globex"}}
"#;

const DEMO_DOCS: &str = r#"{"content": "pub fn demo_widget() -> u32 { 42 }", "metadata": {"source_type": "code", "file_path": "src/widget.rs", "tenant_id": "demo"}}
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(root.join("docs.jsonl"), DOCS).unwrap();
    fs::write(root.join("demo.jsonl"), DEMO_DOCS).unwrap();

    let config_content = format!(
        r#"[store]
root = "{}/stores"
backend = "sqlite"

[chunking]
max_tokens = 256
overlap_tokens = 20

[indexing]
quality_threshold = 0.0

[embedding]
provider = "hashing"
dims = 256

[tenants.acme]
max_documents = 100
"#,
        root.display()
    );

    let config_path = config_dir.join("cix.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cix(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cix_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cix binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout))
}

fn docs_path(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join(name)
        .display()
        .to_string()
}

fn index_acme(config_path: &Path) -> serde_json::Value {
    let file = docs_path(config_path, "docs.jsonl");
    let (stdout, stderr, success) = run_cix(
        config_path,
        &["index", &file, "--category", "code", "--user", "u1", "--org", "acme"],
    );
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    json(&stdout)
}

#[test]
fn test_index_reports_and_creates_store() {
    let (tmp, config_path) = setup_test_env();
    let report = index_acme(&config_path);

    assert_eq!(report["tenant"], "acme");
    assert_eq!(report["collection"], "org_acme_code");
    assert_eq!(report["success"], true);
    assert_eq!(report["documents_received"], 3);
    assert_eq!(report["documents_processed"], 2);
    assert_eq!(report["failed_documents"].as_array().unwrap().len(), 1);
    assert!(report["chunks_created"].as_u64().unwrap() >= 2);

    assert!(tmp.path().join("stores/acme/index.sqlite").exists());
    assert!(!tmp.path().join("stores/demo").exists());
}

#[test]
fn test_index_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let first = index_acme(&config_path);
    let second = index_acme(&config_path);
    assert_eq!(second["chunks_created"], 0);
    assert_eq!(second["chunks_skipped_existing"], first["chunks_created"]);
}

#[test]
fn test_search_is_tenant_scoped() {
    let (_tmp, config_path) = setup_test_env();
    index_acme(&config_path);

    let (stdout, stderr, success) = run_cix(
        &config_path,
        &[
            "search",
            "reconcile_ledger_entries",
            "--category",
            "code",
            "--user",
            "u1",
            "--org",
            "acme",
            "-n",
            "1",
        ],
    );
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    let resp = json(&stdout);
    assert_eq!(resp["metadatas"][0]["document_id"], "src/ledger.rs");
    assert_eq!(resp["aggregate_analysis"]["total_results"], 1);

    let (stdout, _, success) = run_cix(
        &config_path,
        &[
            "search",
            "reconcile_ledger_entries",
            "--category",
            "code",
            "--user",
            "u2",
            "--org",
            "globex",
        ],
    );
    assert!(success);
    assert!(json(&stdout)["ids"].as_array().unwrap().is_empty());
}

#[test]
fn test_unauthenticated_request_lands_in_demo() {
    let (tmp, config_path) = setup_test_env();
    let file = docs_path(&config_path, "demo.jsonl");
    let (stdout, stderr, success) = run_cix(
        &config_path,
        &["index", &file, "--category", "code", "--org", "acme"],
    );
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    let report = json(&stdout);
    assert_eq!(report["collection"], "demo_code");
    assert_eq!(report["documents_processed"], 1);
    assert!(tmp.path().join("stores/demo/index.sqlite").exists());
}

#[test]
fn test_invalid_category_fails() {
    let (_tmp, config_path) = setup_test_env();
    let file = docs_path(&config_path, "docs.jsonl");
    let (_, stderr, success) = run_cix(
        &config_path,
        &["index", &file, "--category", "wiki", "--user", "u1", "--org", "acme"],
    );
    assert!(!success);
    assert!(stderr.contains("wiki"), "stderr={}", stderr);
}

#[test]
fn test_stats_and_health() {
    let (_tmp, config_path) = setup_test_env();
    index_acme(&config_path);

    let (stdout, stderr, success) = run_cix(&config_path, &["stats", "--org", "acme"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("org_acme_code"));
    assert!(stdout.contains("hashing-256"));

    let (stdout, _, success) = run_cix(&config_path, &["health", "--org", "acme"]);
    assert!(success);
    assert_eq!(json(&stdout)["status"], "healthy");

    let (stdout, _, success) = run_cix(&config_path, &["health", "--demo"]);
    assert!(success);
    assert_eq!(json(&stdout)["status"], "empty");
}

#[test]
fn test_admin_requires_explicit_tenant() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_cix(&config_path, &["admin", "delete-tenant"]);
    assert!(!success);
    let (_, _, success) = run_cix(
        &config_path,
        &["admin", "delete-tenant", "--org", "acme", "--demo"],
    );
    assert!(!success);
}

#[test]
fn test_backup_delete_restore() {
    let (tmp, config_path) = setup_test_env();
    let report = index_acme(&config_path);
    let backup = tmp.path().join("backups/acme.json");
    let backup_str = backup.display().to_string();

    let (stdout, stderr, success) = run_cix(
        &config_path,
        &["admin", "backup", &backup_str, "--org", "acme"],
    );
    assert!(success, "backup failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(json(&stdout)["records"], report["chunks_created"]);

    let (_, _, success) = run_cix(&config_path, &["admin", "delete-tenant", "--org", "acme"]);
    assert!(success);
    let (stdout, _, _) = run_cix(&config_path, &["health", "--org", "acme"]);
    assert_eq!(json(&stdout)["status"], "empty");

    // A backup cannot be restored into another tenant.
    let (_, _, success) = run_cix(
        &config_path,
        &["admin", "restore", &backup_str, "--org", "globex"],
    );
    assert!(!success);

    let (stdout, stderr, success) = run_cix(
        &config_path,
        &["admin", "restore", &backup_str, "--org", "acme"],
    );
    assert!(success, "restore failed: stdout={}, stderr={}", stdout, stderr);
    let (stdout, _, _) = run_cix(&config_path, &["health", "--org", "acme"]);
    assert_eq!(json(&stdout)["total_documents"], report["chunks_created"]);
}

#[test]
fn test_admin_delete_document() {
    let (_tmp, config_path) = setup_test_env();
    index_acme(&config_path);
    let (stdout, stderr, success) = run_cix(
        &config_path,
        &[
            "admin",
            "delete-document",
            "src/ledger.rs",
            "--category",
            "code",
            "--org",
            "acme",
        ],
    );
    assert!(success, "delete-document failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Removed 1 chunk(s)"));
}

#[test]
fn test_analyze_prints_summary() {
    let (_tmp, config_path) = setup_test_env();
    let file = docs_path(&config_path, "docs.jsonl");
    let (stdout, stderr, success) = run_cix(&config_path, &["analyze", &file]);
    assert!(success, "analyze failed: stdout={}, stderr={}", stdout, stderr);
    let out = json(&stdout);
    assert_eq!(out["summary"]["total_documents"], 3);
    assert_eq!(out["documents"].as_array().unwrap().len(), 3);
}

#[test]
fn test_openai_without_key_is_a_config_error() {
    let (tmp, config_path) = setup_test_env();
    let config = fs::read_to_string(&config_path)
        .unwrap()
        .replace(
            "provider = \"hashing\"\ndims = 256",
            "provider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536",
        );
    fs::write(&config_path, config).unwrap();

    let file = docs_path(&config_path, "docs.jsonl");
    let (_, stderr, success) = run_cix(
        &config_path,
        &["index", &file, "--category", "code", "--user", "u1", "--org", "acme"],
    );
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr={}", stderr);
    assert!(!tmp.path().join("stores/acme").exists());
}
