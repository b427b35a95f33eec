use std::process::Command;

#[test]
fn cli_compiles_without_warnings() {
    let status = Command::new(env!("CARGO"))
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .args(["check", "--quiet", "--bin", "corral"])
        .status()
        .expect("failed to invoke cargo check for corral CLI binary");

    assert!(status.success(), "cargo check --bin corral should succeed");
}

#[test]
fn bundled_farm_runs_to_completion() {
    let output = Command::new(env!("CARGO_BIN_EXE_corral"))
        .args(["--ticks", "2000", "--until-settled"])
        .output()
        .expect("failed to run corral CLI binary");

    assert!(output.status.success(), "corral should exit cleanly");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SlideStarted"), "taps start slides: {stdout}");
    assert!(stdout.lines().any(|line| line.starts_with("slots: [")));
}
