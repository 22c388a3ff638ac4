use std::fs;
use std::process::Command;

use tempfile::TempDir;

#[test]
fn run_writes_layout_json() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("layout.json");

    let status = Command::new(env!("CARGO_BIN_EXE_graphvis"))
        .args([
            "run",
            "--chain",
            "5",
            "--frames",
            "3",
            "--output",
            output.to_str().unwrap(),
        ])
        .status()
        .expect("Failed to execute graphvis");
    assert!(status.success(), "graphvis exited with error");

    let json = fs::read_to_string(&output).expect("Failed to read layout.json");
    let layout: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(layout["positions"].as_array().unwrap().len(), 5);
    assert_eq!(layout["links"].as_array().unwrap().len(), 4);
    assert_eq!(layout["links"][0], serde_json::json!([0, 1]));
    assert!(layout["iterations"].as_u64().unwrap() >= 3);
}

#[test]
fn run_reads_yaml_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("layout.yaml");
    fs::write(
        &config,
        "optimizer:\n  IterationsPerFrame: 2\nparticles:\n  seed: 9\n",
    )
    .unwrap();
    let output = dir.path().join("layout.json");

    let status = Command::new(env!("CARGO_BIN_EXE_graphvis"))
        .args(["run", "--chain", "4", "--frames", "2", "--config"])
        .arg(&config)
        .arg("--output")
        .arg(&output)
        .status()
        .expect("Failed to execute graphvis");
    assert!(status.success());

    let layout: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    // Two iterations per frame, at least one try each
    assert!(layout["iterations"].as_u64().unwrap() >= 4);
}

#[test]
fn run_rejects_unknown_config_format() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("layout.toml");
    fs::write(&config, "capacity = 8\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_graphvis"))
        .args(["run", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to execute graphvis");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported configuration format"), "{stderr}");
}

#[test]
fn config_prints_defaults_as_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_graphvis"))
        .args(["config", "--format", "json"])
        .output()
        .expect("Failed to execute graphvis");
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["optimizer"]["SearchIterations"], 10);
    assert_eq!(config["optimizer"]["SwitchToManualAfter"], 50);
    assert_eq!(config["capacity"], 1024);
}
