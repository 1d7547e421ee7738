use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

fn cli() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_drill_shield"));
    command.current_dir(env!("CARGO_MANIFEST_DIR"));
    command
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("drill_shield_cli_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn write_tone(path: &Path) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for i in 0..24_000 {
        let v = ((i as f32 * 2.0 * std::f32::consts::PI * 440.0 / 48_000.0).sin() * 12_000.0) as i16;
        writer.write_sample(v).unwrap();
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn presets_lists_builtin_variants() {
    let output = cli().arg("presets").output().expect("failed to run presets");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    for name in ["shelf", "duck", "overdrive", "parallel"] {
        assert!(stdout.contains(name), "missing {name} in {stdout}");
    }
}

#[test]
fn presets_json_includes_chains() {
    let output = cli()
        .args(["presets", "--json"])
        .output()
        .expect("failed to run presets --json");
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).expect("presets JSON");
    let presets = json.as_array().expect("array of presets");
    assert_eq!(presets.len(), 4);
    assert_eq!(presets[0]["name"], "shelf");
    assert_eq!(
        presets[0]["config"]["chain"]["stages"][0]["kind"]["type"],
        "high_shelf"
    );
}

#[test]
fn simulate_prints_one_report_per_tick() {
    let output = cli()
        .args(["simulate", "--readings", "5,5,60,60,5", "--dt", "1"])
        .output()
        .expect("failed to run simulate");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    let steps: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON line"))
        .collect();
    let states: Vec<&str> = steps.iter().map(|s| s["state"].as_str().unwrap()).collect();
    assert_eq!(states, ["IDLE", "IDLE", "BOOSTED", "BOOSTED", "IDLE"]);
    assert_eq!(steps[2]["stages"][0]["name"], "air");
    assert_eq!(steps[2]["stages"][0]["target"], 15.0);
}

#[test]
fn unknown_preset_fails() {
    let output = cli()
        .args(["--preset", "jackhammer", "simulate", "--readings", "1"])
        .output()
        .expect("failed to run simulate");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("unknown preset"), "got {stderr}");
}

#[test]
fn unreadable_config_fails() {
    let output = cli()
        .args(["--config", "/definitely/not/here.json", "presets"])
        .output()
        .expect("failed to run presets");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn render_writes_wav_and_report() {
    let dir = scratch_dir("render");
    let input = dir.join("tone.wav");
    let output_path = dir.join("masked.wav");
    let report_path = dir.join("report.json");
    write_tone(&input);

    let output = cli()
        .args([
            "--preset",
            "overdrive",
            "render",
            input.to_str().unwrap(),
            "--readings",
            "0,80,80,0",
            "--tick-ms",
            "50",
            "--output",
            output_path.to_str().unwrap(),
            "--report",
            report_path.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run render");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let reader = hound::WavReader::open(&output_path).expect("rendered wav");
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 48_000);
    assert_eq!(reader.len(), 4 * 2_400 * 2);

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    let ticks = report["ticks"].as_array().unwrap();
    assert_eq!(ticks.len(), 4);
    assert_eq!(ticks[1]["state"], "BOOSTED");
    assert!(ticks.iter().all(|t| t["peak"].as_f64().unwrap() <= 1.0));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn tracks_lists_catalog() {
    let output = cli().arg("tracks").output().expect("failed to run tracks");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    assert!(stdout.contains("rain"), "got {stdout}");
}

#[test]
fn play_with_stub_backend_runs_and_stops() {
    let dir = scratch_dir("play");
    let input = dir.join("tone.wav");
    write_tone(&input);

    let output = cli()
        .args([
            "play",
            input.to_str().unwrap(),
            "--backend",
            "stub",
            "--duration-secs",
            "1",
        ])
        .output()
        .expect("failed to run play");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    assert!(stdout.contains("Loading Audio..."), "got {stdout}");
    assert!(stdout.contains("Stopped"), "got {stdout}");

    std::fs::remove_dir_all(&dir).ok();
}
