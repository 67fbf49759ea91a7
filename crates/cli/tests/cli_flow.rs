use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn cli(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("launch-settings").expect("binary");
    cmd.arg("--project")
        .arg(project)
        .arg("--quiet")
        .env_remove("LAUNCH_SETTINGS_SAVE_DELAY_MS");
    cmd
}

fn run_json(cmd: &mut Command) -> (bool, Value) {
    let output = cmd.output().expect("command run");
    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    (output.status.success(), body)
}

fn settings_file(project: &Path) -> Value {
    let raw = fs::read_to_string(project.join("Properties/launchSettings.json"))
        .expect("settings file written");
    serde_json::from_str(&raw).expect("settings file is json")
}

#[test]
fn show_creates_web_defaults() {
    let temp = tempdir().unwrap();
    let (ok, body) = run_json(cli(temp.path()).args(["--kind", "web", "show"]));
    assert!(ok);
    assert_eq!(body["active_profile"], json!("IIS Express"));
    assert_eq!(body["profiles"][0]["kind"], json!("IISExpress"));

    let file = settings_file(temp.path());
    let url = file["iisSettings"]["iisExpress"]["applicationUrl"]
        .as_str()
        .unwrap_or_default();
    assert!(url.starts_with("http://localhost:"), "unexpected url {url}");
    assert!(file["profiles"]["IIS Express"].is_object());
}

#[test]
fn console_project_show_leaves_disk_alone() {
    let temp = tempdir().unwrap();
    let project = temp.path().join("Tool");
    fs::create_dir_all(&project).unwrap();

    let (ok, body) = run_json(cli(&project).arg("show"));
    assert!(ok);
    assert_eq!(body["profiles"][0]["name"], json!("Tool"));
    assert_eq!(body["profiles"][0]["persisted"], json!(false));
    assert!(!project.join("Properties").exists());
}

#[test]
fn edits_round_trip_through_the_file() {
    let temp = tempdir().unwrap();
    let root = temp.path();

    let (ok, body) = run_json(cli(root).args([
        "--kind",
        "library",
        "add-profile",
        "tool",
        "--executable",
        "/usr/bin/tool",
        "--args",
        "--fast",
        "--env",
        "MODE=dev",
    ]));
    assert!(ok);
    assert_eq!(body["profiles"][0]["name"], json!("tool"));
    let file = settings_file(root);
    assert_eq!(file["profiles"]["tool"]["executablePath"], json!("/usr/bin/tool"));
    assert_eq!(file["profiles"]["tool"]["commandLineArgs"], json!("--fast"));
    assert_eq!(
        file["profiles"]["tool"]["environmentVariables"],
        json!({"MODE": "dev"})
    );

    let (ok, _) = run_json(cli(root).args([
        "--kind",
        "library",
        "set-global",
        "docker",
        r#"{"image":"api"}"#,
    ]));
    assert!(ok);
    assert_eq!(settings_file(root)["docker"], json!({"image": "api"}));

    let (ok, _) = run_json(cli(root).args(["--kind", "library", "remove-global", "docker"]));
    assert!(ok);
    assert!(settings_file(root).get("docker").is_none());

    let (ok, body) = run_json(cli(root).args(["--kind", "library", "remove-profile", "tool"]));
    assert!(ok);
    assert_eq!(body["profiles"][0]["kind"], json!("NoAction"));
    assert_eq!(settings_file(root), json!({"profiles": {}}));
}

#[test]
fn build_commands_become_profiles() {
    let temp = tempdir().unwrap();
    let (ok, body) = run_json(cli(temp.path()).args([
        "--kind",
        "library",
        "--command",
        "web=Microsoft.AspNet.Server.Kestrel --server.urls http://localhost:5001",
        "show",
    ]));
    assert!(ok);
    let web = &body["profiles"][0];
    assert_eq!(web["name"], json!("web"));
    assert_eq!(web["kind"], json!("BuiltInCommand"));
    assert_eq!(web["launch_browser"], json!(true));
    assert_eq!(web["application_url"], json!("http://localhost:5001"));
    assert_eq!(
        web["environment_variables"]["ASPNETCORE_ENVIRONMENT"],
        json!("Development")
    );
}

#[test]
fn malformed_file_is_reported_and_fails() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join("Properties");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("launchSettings.json"), "{ \"profiles\": ").unwrap();

    let (ok, body) = run_json(cli(temp.path()).arg("show"));
    assert!(!ok, "expected non-zero exit for malformed settings");
    assert!(body["error"].is_string());
    assert_eq!(body["profiles"][0]["kind"], json!("ErrorPlaceholder"));

    cli(temp.path())
        .args(["remove-profile", "x"])
        .assert()
        .failure()
        .stderr(contains("contains errors"));
}

#[test]
fn blank_profile_name_is_rejected() {
    let temp = tempdir().unwrap();
    cli(temp.path())
        .args(["add-profile", " "])
        .assert()
        .failure()
        .stderr(contains("profile name must not be empty"));
}
