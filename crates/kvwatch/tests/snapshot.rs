//! Snapshot tests
//!
//! Flattens each *.json file in /tests/ at root `/` and compares if the
//! resulting keys or values change.

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("KVWATCH_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("*.json", |path| {
        let reader = std::fs::read_to_string(path).unwrap();
        let document: serde_json::Value =
            serde_json::from_str(&reader).expect("must be valid json");

        let flattened = kvwatch::value::flatten("/", &document.into());

        insta::assert_json_snapshot!(flattened);
    });
}
