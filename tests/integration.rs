use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ctrack_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ctrack");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ctrack.sqlite"

[search]
final_limit = 10

[server]
bind = "127.0.0.1:7340"
"#,
        root.display()
    );

    let config_path = config_dir.join("ctrack.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ctrack(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctrack_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctrack binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn must(config_path: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_ctrack(config_path, args);
    assert!(
        success,
        "{:?} failed: stdout={}, stderr={}",
        args, stdout, stderr
    );
    stdout
}

/// init + one course with four lessons + user 7 enrolled as enrollment 1.
fn seed(config_path: &Path) {
    must(config_path, &["init"]);
    must(
        config_path,
        &["course", "add", "rust-101", "Rust 101", "--teacher", "100"],
    );
    must(config_path, &["course", "module", "rust-101", "basics", "Basics"]);
    for (slug, title) in [
        ("l1", "Hello"),
        ("l2", "Ownership"),
        ("l3", "Borrowing"),
        ("l4", "Lifetimes"),
    ] {
        must(config_path, &["course", "lesson", "basics", slug, title]);
    }
    must(config_path, &["enroll", "7", "rust-101"]);
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let stdout = must(&config_path, &["init"]);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ctrack(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ctrack(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_ctrack(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_course_show_lists_lessons() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let stdout = must(&config_path, &["course", "show", "rust-101"]);
    assert!(stdout.contains("Rust 101"));
    assert!(stdout.contains("lessons: 4"));
    assert!(stdout.contains("l3 Borrowing"));
}

#[test]
fn test_duplicate_course_rejected() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let (_, stderr, success) = run_ctrack(&config_path, &["course", "add", "rust-101", "Again"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_complete_lessons_reaches_100() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let out = must(&config_path, &["complete", "1", "l1"]);
    assert!(out.contains("progress:     25%"));
    must(&config_path, &["complete", "1", "l2"]);
    let out = must(&config_path, &["complete", "1", "l3"]);
    assert!(out.contains("progress:     75%"));
    assert!(out.contains("completed_at: -"));

    let out = must(&config_path, &["complete", "1", "l4"]);
    assert!(out.contains("progress:     100%"));
    assert!(out.contains("Course completed."));
}

#[test]
fn test_repeat_completion_is_noop() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    must(&config_path, &["complete", "1", "l1"]);
    let out = must(&config_path, &["complete", "1", "l1"]);
    assert!(out.contains("already completed"));
    assert!(out.contains("progress:     25%"));
    assert!(out.contains("lessons:      1 / 4"));
}

#[test]
fn test_complete_unknown_lesson_fails() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let (_, stderr, success) = run_ctrack(&config_path, &["complete", "1", "nope"]);
    assert!(!success);
    assert!(stderr.contains("lesson not found"));
}

#[test]
fn test_added_lesson_lowers_progress_after_refresh() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);
    for l in ["l1", "l2", "l3", "l4"] {
        must(&config_path, &["complete", "1", l]);
    }

    must(&config_path, &["course", "lesson", "basics", "l5", "Traits"]);
    let out = must(&config_path, &["progress", "1", "--refresh"]);
    assert!(out.contains("progress:     80%"));
    // completion timestamp survives the drop below 100%
    assert!(!out.contains("completed_at: -"));
}

#[test]
fn test_remove_lesson_with_refresh() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);
    must(&config_path, &["complete", "1", "l1"]);
    must(&config_path, &["complete", "1", "l2"]);

    let out = must(&config_path, &["course", "remove-lesson", "l2", "--refresh"]);
    assert!(out.contains("Recomputed 1 enrollment(s)"));

    let out = must(&config_path, &["progress", "1"]);
    assert!(out.contains("progress:     33%"));
    assert!(out.contains("lessons:      1 / 3"));
}

#[test]
fn test_remove_last_lesson_with_reject_policy_skips_each_enrollment() {
    let (_tmp, config_path) = setup_test_env();
    let mut body = fs::read_to_string(&config_path).unwrap();
    body.push_str("\n[progress]\nempty_course = \"reject\"\n");
    fs::write(&config_path, body).unwrap();

    must(&config_path, &["init"]);
    must(&config_path, &["course", "add", "solo", "Solo"]);
    must(&config_path, &["course", "module", "solo", "only", "Only"]);
    must(&config_path, &["course", "lesson", "only", "s1", "Single"]);
    must(&config_path, &["enroll", "7", "solo"]);
    must(&config_path, &["enroll", "8", "solo"]);
    must(&config_path, &["complete", "1", "s1"]);

    let out = must(&config_path, &["course", "remove-lesson", "s1", "--refresh"]);
    assert!(out.contains("Removed lesson s1"));
    assert!(out.contains("Recomputed 0 enrollment(s)"));
    assert!(out.contains("Skipped 2 enrollment(s)"));

    let out = must(&config_path, &["progress", "2"]);
    assert!(out.contains("lessons:      0 / 0"));
}

#[test]
fn test_certificate_issue_and_verify() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);

    let (_, stderr, success) = run_ctrack(&config_path, &["certificate", "issue", "1"]);
    assert!(!success);
    assert!(stderr.contains("has not completed"));

    for l in ["l1", "l2", "l3", "l4"] {
        must(&config_path, &["complete", "1", l]);
    }
    let first = must(&config_path, &["certificate", "issue", "1"]);
    let second = must(&config_path, &["certificate", "issue", "1"]);
    assert_eq!(first, second);

    let code = first
        .lines()
        .find_map(|l| l.strip_prefix("code:"))
        .map(|c| c.trim().to_string())
        .unwrap();
    let out = must(&config_path, &["certificate", "verify", &code]);
    assert!(out.contains("valid: enrollment 1"));

    let (_, _, success) = run_ctrack(&config_path, &["certificate", "verify", "0000000000000000"]);
    assert!(!success);
}

#[test]
fn test_unenroll_blocks_completion_and_reenroll_restores() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);
    must(&config_path, &["complete", "1", "l1"]);
    must(&config_path, &["unenroll", "1"]);

    let (_, stderr, success) = run_ctrack(&config_path, &["complete", "1", "l2"]);
    assert!(!success);
    assert!(stderr.contains("inactive"));

    let out = must(&config_path, &["enroll", "7", "rust-101"]);
    assert!(out.contains("Enrollment 1"));
    assert!(out.contains("25%"));

    let out = must(&config_path, &["enrollments", "7"]);
    assert!(out.contains("rust-101"));
    assert!(out.contains("active"));
}

#[test]
fn test_search_aggregates_file() {
    let (tmp, config_path) = setup_test_env();
    seed(&config_path);
    must(&config_path, &["course", "add", "go-101", "Go 101"]);

    let input = tmp.path().join("matches.json");
    fs::write(
        &input,
        r#"{
            "course": [{ "slug": "rust-101", "score": 0.5 }, { "slug": "go-101", "score": 0.3 }],
            "module": [{ "slug": "basics", "score": 0.9 }],
            "lesson": [
                { "slug": "ghost", "score": 1.0 },
                { "slug": "x", "score": 0.9, "metadata": { "course_slug": "py-101" } }
            ]
        }"#,
    )
    .unwrap();

    let out = must(&config_path, &["search", input.to_str().unwrap()]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3, "unexpected output: {}", out);
    assert!(lines[0].contains("[0.7200] rust-101 (module) Rust 101"));
    assert!(lines[1].contains("[0.5400] py-101 (lesson) (not in catalog)"));
    assert!(lines[2].contains("go-101 (course)"));

    let out = must(&config_path, &["search", input.to_str().unwrap(), "--limit", "1"]);
    assert_eq!(out.lines().count(), 1);
}

#[test]
fn test_report_and_stats() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path);
    must(&config_path, &["enroll", "8", "rust-101"]);
    for l in ["l1", "l2", "l3", "l4"] {
        must(&config_path, &["complete", "1", l]);
    }

    let out = must(&config_path, &["course", "report", "rust-101"]);
    assert!(out.contains("Enrolled:    2"));
    assert!(out.contains("Completed:   1"));
    assert!(out.contains("Average:     50.0%"));

    let out = must(&config_path, &["stats"]);
    assert!(out.contains("Courses:      1"));
    assert!(out.contains("Lessons:      4"));
    assert!(out.contains("rust-101"));
}
