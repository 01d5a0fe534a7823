use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize)]
struct Coordinates {
    time_seconds: f64,
    channel_index: Option<usize>,
    channel_name: String,
    is_valid: bool,
}

#[derive(Deserialize)]
struct Diagnostics {
    is_valid: bool,
    time_in_view: bool,
    channel_visible: bool,
}

#[derive(Deserialize)]
struct MappedGaze {
    coordinates: Coordinates,
    diagnostics: Diagnostics,
}

#[test]
fn map_gaze_single_point() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("eegaze");
    cmd.args(["map-gaze", "--x", "0.25", "--y", "0.35", "--view-start", "20"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let mapped: MappedGaze = serde_json::from_slice(&out)?;
    assert!(mapped.coordinates.is_valid);
    assert!((mapped.coordinates.time_seconds - 22.5).abs() < 1e-6);
    assert_eq!(mapped.coordinates.channel_index, Some(3));
    assert_eq!(mapped.coordinates.channel_name, "Ch4");
    assert!(mapped.diagnostics.is_valid);
    assert!(mapped.diagnostics.time_in_view);
    assert!(mapped.diagnostics.channel_visible);
    Ok(())
}

#[test]
fn map_gaze_reads_csv_and_skips_missing_samples() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("gaze.csv");
    std::fs::write(
        &input,
        "timestamp,x,y,valid_left,valid_right\n0.0,0.1,0.05,1,1\n0.1,0,0,0,0\n0.2,0.9,0.95,1,0\n",
    )?;
    let mut cmd = cargo_bin_cmd!("eegaze");
    cmd.args(["map-gaze", "--input", input.to_str().unwrap()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let lines: Vec<MappedGaze> = String::from_utf8(out)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].coordinates.channel_name, "Ch1");
    assert_eq!(lines[1].coordinates.channel_name, "Ch10");
    Ok(())
}

#[test]
fn map_gaze_requires_a_point() {
    let mut cmd = cargo_bin_cmd!("eegaze");
    cmd.args(["map-gaze", "--x", "0.5"]);
    cmd.assert().failure();
}
