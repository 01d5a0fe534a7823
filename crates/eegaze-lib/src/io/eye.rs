use crate::signal::GazeSample;
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::File;
use std::path::Path;

pub const GAZE_CSV_HEADER: [&str; 6] = [
    "timestamp",
    "x",
    "y",
    "valid_left",
    "valid_right",
    "confidence",
];

/// Read recorded gaze samples. `timestamp`, `x` and `y` are required; eye
/// validity defaults to true and confidence to 1.0 when their columns are absent.
pub fn read_gaze_csv(path: &Path, delimiter: u8) -> Result<Vec<GazeSample>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(file);
    let headers = reader.headers().context("reading header")?.clone();

    let ts_idx = locate_column(&headers, "timestamp")?;
    let x_idx = locate_column(&headers, "x")?;
    let y_idx = locate_column(&headers, "y")?;
    let left_idx = locate_column(&headers, "valid_left").ok();
    let right_idx = locate_column(&headers, "valid_right").ok();
    let conf_idx = locate_column(&headers, "confidence").ok();

    let mut samples = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("reading gaze record {}", row + 1))?;
        let number = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .ok_or_else(|| anyhow!("row {}: missing {}", row + 1, name))?
                .trim()
                .parse::<f64>()
                .with_context(|| format!("row {}: parsing {}", row + 1, name))
        };
        let flag = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(parse_flag)
                .unwrap_or(true)
        };
        samples.push(GazeSample {
            timestamp: number(ts_idx, "timestamp")?,
            x: number(x_idx, "x")?,
            y: number(y_idx, "y")?,
            valid_left: flag(left_idx),
            valid_right: flag(right_idx),
            confidence: conf_idx
                .and_then(|idx| record.get(idx))
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(1.0),
        });
    }
    Ok(samples)
}

pub fn write_gaze_csv(path: &Path, samples: &[GazeSample]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(GAZE_CSV_HEADER)?;
    for s in samples {
        writer.write_record([
            format!("{:.6}", s.timestamp),
            format!("{:.6}", s.x),
            format!("{:.6}", s.y),
            (s.valid_left as u8).to_string(),
            (s.valid_right as u8).to_string(),
            format!("{:.3}", s.confidence),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "invalid" | ""
    )
}

fn locate_column(headers: &StringRecord, requested: &str) -> Result<usize> {
    headers
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case(requested))
        .ok_or_else(|| anyhow!("missing {} column", requested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn reads_gaze_fixture() {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let path = manifest_dir
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace")
            .join("test_data/gaze_sample.csv");
        let samples = read_gaze_csv(&path, b',').unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].x, 0.5);
        assert!(!samples[2].has_valid_eye());
        assert!(samples[3].valid_left && !samples[3].valid_right);
        assert_eq!(samples[4].confidence, 0.85);
    }

    #[test]
    fn optional_columns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaze.tsv");
        std::fs::write(&path, "Timestamp\tX\tY\n0.0\t0.1\t0.2\n0.1\t0.1\t0.2\n").unwrap();
        let samples = read_gaze_csv(&path, b'\t').unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[1].valid_left && samples[1].valid_right);
        assert_eq!(samples[1].confidence, 1.0);
    }

    #[test]
    fn missing_coordinate_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "timestamp,x\n0.0,0.5\n").unwrap();
        let err = read_gaze_csv(&path, b',').unwrap_err();
        assert!(err.to_string().contains("missing y column"));
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let samples = vec![
            GazeSample::new(0.25, 0.75, 0.0, 0.9),
            GazeSample {
                valid_left: false,
                valid_right: false,
                ..GazeSample::new(0.0, 0.0, 0.05, 0.0)
            },
        ];
        write_gaze_csv(&path, &samples).unwrap();
        let back = read_gaze_csv(&path, b',').unwrap();
        assert_eq!(back, samples);
    }
}
