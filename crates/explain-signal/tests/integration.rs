//! Integration test: extract → detect stack on this crate's own directory.

use std::path::Path;

use explain_signal::{detect_stack, extract, infer_languages, LocalTree};

#[tokio::test]
async fn end_to_end_on_own_crate() {
    let crate_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let tree = LocalTree::new(crate_root).unwrap();

    let signals = extract(&tree).await.unwrap();
    assert_eq!(signals.tree[0], "Cargo.toml", "root files come first");
    assert!(signals.tree.iter().any(|p| p == "src/extract.rs"));
    assert!(signals.tree.iter().any(|p| p == "tests/integration.rs"));

    let manifest = signals.key_file("Cargo.toml").expect("manifest is a key file");
    assert!(manifest.content.contains("explain-signal"));
    assert!(signals.files_text.starts_with("### Cargo.toml\n"));

    let languages = infer_languages(&signals.tree);
    let report = detect_stack(&languages, &signals.tree, &signals.key_files);
    assert_eq!(report.languages, vec!["Rust"]);
    assert_eq!(report.runtimes, vec!["Rust"]);
    assert_eq!(report.package_managers, vec!["Cargo"]);
}

#[tokio::test]
async fn repeated_extraction_matches() {
    let crate_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let tree = LocalTree::new(crate_root).unwrap();
    let a = extract(&tree).await.unwrap();
    let b = extract(&tree).await.unwrap();
    assert_eq!(a.tree_text, b.tree_text);
    assert_eq!(a.files_text, b.files_text);
}
