use crate::signal::RecordingSource;
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use edf_reader::file_reader::SyncFileReader;
use edf_reader::sync_reader::SyncEDFReader;
use log::{debug, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Positional reads against an EDF file on disk.
struct DiskFileReader {
    path: PathBuf,
}

impl DiskFileReader {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl SyncFileReader for DiskFileReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Load every channel of an EDF file that shares the first channel's sampling
/// rate. Channels recorded at other rates (annotations, auxiliary sensors) are
/// skipped with a warning.
pub fn load_edf_recording(path: &Path) -> Result<RecordingSource> {
    let reader = SyncEDFReader::init_with_file_reader(DiskFileReader::new(path))
        .with_context(|| format!("opening EDF {}", path.display()))?;
    let header = &reader.edf_header;
    if header.channels.is_empty() {
        return Err(anyhow!("EDF file {} has no channels", path.display()));
    }
    if header.block_duration == 0 {
        return Err(anyhow!("EDF file {} has zero block duration", path.display()));
    }
    let total_duration = header.block_duration * header.number_of_blocks;
    let data_matrix = reader.read_data_window(0, total_duration)?;

    let rate_of = |idx: usize| {
        header.channels[idx].number_of_samples_in_data_record as f64 * 1000.0
            / header.block_duration as f64
    };
    let fs = rate_of(0);
    let mut names = Vec::new();
    let mut data = Vec::new();
    for (idx, channel) in header.channels.iter().enumerate() {
        let label = channel.label.trim().to_string();
        if (rate_of(idx) - fs).abs() > f64::EPSILON {
            warn!(
                "skipping EDF channel {} ({:.1} Hz, expected {:.1} Hz)",
                label,
                rate_of(idx),
                fs
            );
            continue;
        }
        let samples = data_matrix
            .get(idx)
            .ok_or_else(|| anyhow!("missing data for channel {}", label))?;
        names.push(label);
        data.push(samples.iter().map(|v| *v as f64).collect());
    }
    debug!(
        "loaded {} EDF channels at {:.1} Hz from {}",
        names.len(),
        fs,
        path.display()
    );
    Ok(RecordingSource::new(fs, names, data)?)
}

/// Load a recording stored as CSV: one column per channel, the header row
/// carries channel names, and every row is one sample at `fs`.
pub fn load_signal_csv(path: &Path, fs: f64) -> Result<RecordingSource> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let names: Vec<String> = reader
        .headers()
        .context("reading header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if names.is_empty() {
        return Err(anyhow!("signal file {} has no channels", path.display()));
    }
    let mut data = vec![Vec::new(); names.len()];
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("reading signal row {}", row + 1))?;
        for (col, channel) in data.iter_mut().enumerate() {
            let value = record
                .get(col)
                .ok_or_else(|| anyhow!("row {}: missing column {}", row + 1, names[col]))?
                .trim()
                .parse::<f64>()
                .with_context(|| format!("row {}: parsing {}", row + 1, names[col]))?;
            channel.push(value);
        }
    }
    Ok(RecordingSource::new(fs, names, data)?)
}

/// Pick the loader from the file extension.
pub fn load_recording(path: &Path, csv_fs: f64) -> Result<RecordingSource> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("edf") => load_edf_recording(path),
        Some("csv") => load_signal_csv(path, csv_fs),
        _ => Err(anyhow!(
            "unsupported recording format for {}",
            path.display()
        )),
    }
}
