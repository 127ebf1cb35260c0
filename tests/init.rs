use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_explainthisrepo"))
        .arg("--init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "explainthisrepo --init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".explain.toml");
    assert!(config_path.exists(), ".explain.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    for section in ["[llm]", "[github]", "[output]", "[agent]"] {
        assert!(content.contains(section), "missing {section}");
    }

    let config: explain_core::ExplainConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.output.file, "EXPLAIN.md");
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".explain.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_explainthisrepo"))
        .arg("--init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join(".explain.toml")).unwrap();
    assert_eq!(content, "# existing");
}
