use std::process::{Command, Output};

fn run(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_explainthisrepo"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn rust_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Cargo.toml"),
        "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\ntokio = \"1\"\n",
    )
    .unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    dir
}

#[test]
fn help_describes_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Explain GitHub repositories in plain English"));
    assert!(stdout.contains("--council"));
}

#[test]
fn unsupported_host_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["https://gitlab.com/owner/repo", "--quick"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported host"), "{stderr}");
}

#[test]
fn modes_are_mutually_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["owner/repo", "--quick", "--simple"]);
    assert!(!output.status.success());
}

#[test]
fn interactive_requires_agent() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["owner/repo", "--interactive"]);
    assert!(!output.status.success());
}

#[test]
fn local_stack_needs_no_network() {
    let project = rust_project();
    let output = run(project.path(), &[".", "--stack"]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Stack summary for"));
    assert!(stdout.contains("Cargo"));
}

#[test]
fn local_stack_as_json() {
    let project = rust_project();
    let output = run(project.path(), &[".", "--stack", "--format", "json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["package_managers"][0], "Cargo");
    assert_eq!(report["runtimes"][0], "Rust");
}

#[test]
fn council_rejects_local_paths() {
    let project = rust_project();
    let output = run(project.path(), &[".", "--council"]);
    assert!(!output.status.success());
}
