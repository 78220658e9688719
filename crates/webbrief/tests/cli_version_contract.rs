#[test]
fn webbrief_version_json_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("webbrief");
    let out = std::process::Command::new(bin)
        .args(["version"])
        .output()
        .expect("run version");
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("version json");
    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("version"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["name"].as_str(), Some("webbrief"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn webbrief_version_text_output() {
    let bin = assert_cmd::cargo::cargo_bin!("webbrief");
    let out = std::process::Command::new(bin)
        .args(["version", "--output", "text"])
        .output()
        .expect("run version");
    assert!(out.status.success());

    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.starts_with("webbrief "), "stdout={s:?}");
    assert!(
        serde_json::from_str::<serde_json::Value>(s.trim()).is_err(),
        "text output should not be json"
    );
}
