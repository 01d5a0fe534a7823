use anyhow::{anyhow, Context, Result};
use eegaze_lib::signal::GazeSample;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A scripted viewing session.
#[derive(Debug, Deserialize, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Uniform jitter added to every valid sample (normalized units).
    #[serde(default)]
    pub noise: f64,
    /// Starting gaze position; defaults to the screen centre.
    #[serde(default)]
    pub start: Option<(f64, f64)>,
    #[serde(rename = "segment", default)]
    pub segments: Vec<Segment>,
}

fn default_sample_rate() -> f64 {
    60.0
}

fn default_confidence() -> f64 {
    0.95
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    /// Hold the gaze at one point.
    Dwell {
        x: f64,
        y: f64,
        duration: f64,
        #[serde(default = "default_confidence")]
        confidence: f64,
    },
    /// Linear sweep from the current position to the target.
    Saccade { x: f64, y: f64, duration: f64 },
    /// Both eyes closed.
    Blink { duration: f64 },
    /// Only the left eye tracked, e.g. head turned.
    MonocularDwell { x: f64, y: f64, duration: f64 },
}

impl Segment {
    fn duration(&self) -> f64 {
        match self {
            Segment::Dwell { duration, .. }
            | Segment::Saccade { duration, .. }
            | Segment::Blink { duration }
            | Segment::MonocularDwell { duration, .. } => *duration,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionManifest {
    pub scenario: String,
    pub seed: Option<u64>,
    pub sample_rate_hz: f64,
    pub noise: f64,
    pub total_samples: usize,
    pub duration_secs: f64,
    pub dwell_segments: usize,
    pub blink_segments: usize,
    pub missing_samples: usize,
    pub start_time_unix: f64,
}

pub struct SessionBundle {
    pub samples: Vec<GazeSample>,
    pub manifest: SessionManifest,
}

pub fn read_scenario(path: &Path) -> Result<ScenarioSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario: ScenarioSpec = toml::from_str(&contents)
        .with_context(|| format!("parsing scenario {}", path.display()))?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

fn validate_scenario(scenario: &ScenarioSpec) -> Result<()> {
    if scenario.sample_rate_hz.is_nan() || scenario.sample_rate_hz <= 0.0 {
        return Err(anyhow!(
            "sample_rate_hz must be positive, got {}",
            scenario.sample_rate_hz
        ));
    }
    if scenario.noise.is_nan() || scenario.noise < 0.0 {
        return Err(anyhow!("noise must be non-negative, got {}", scenario.noise));
    }
    if scenario.segments.is_empty() {
        return Err(anyhow!("scenario '{}' has no segments", scenario.name));
    }
    for (idx, segment) in scenario.segments.iter().enumerate() {
        let duration = segment.duration();
        if duration.is_nan() || duration <= 0.0 {
            return Err(anyhow!(
                "segment {} has non-positive duration {}",
                idx + 1,
                duration
            ));
        }
    }
    Ok(())
}

/// Render the scenario into tracker samples. The same seed always yields the
/// same samples.
pub fn simulate_session(scenario: &ScenarioSpec) -> Result<SessionBundle> {
    validate_scenario(scenario)?;
    let seed = scenario.seed.unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let dt = 1.0 / scenario.sample_rate_hz;
    let noise = scenario.noise;
    let jitter = |rng: &mut StdRng| {
        if noise > 0.0 {
            rng.gen_range(-noise..=noise)
        } else {
            0.0
        }
    };

    let (mut x, mut y) = scenario.start.unwrap_or((0.5, 0.5));
    let mut t = 0.0;
    let mut index = 0usize;
    let mut samples = Vec::new();
    let mut missing_samples = 0;

    for segment in &scenario.segments {
        let count = (segment.duration() * scenario.sample_rate_hz).round().max(1.0) as usize;
        match *segment {
            Segment::Dwell {
                x: tx,
                y: ty,
                confidence,
                ..
            } => {
                x = tx;
                y = ty;
                for _ in 0..count {
                    let jx = jitter(&mut rng);
                    let jy = jitter(&mut rng);
                    samples.push(GazeSample::new(
                        clamp_unit(x + jx),
                        clamp_unit(y + jy),
                        t,
                        confidence,
                    ));
                    index += 1;
                    t = index as f64 * dt;
                }
            }
            Segment::Saccade { x: tx, y: ty, .. } => {
                let (sx, sy) = (x, y);
                for step in 1..=count {
                    let frac = step as f64 / count as f64;
                    samples.push(GazeSample::new(
                        clamp_unit(sx + (tx - sx) * frac),
                        clamp_unit(sy + (ty - sy) * frac),
                        t,
                        default_confidence(),
                    ));
                    index += 1;
                    t = index as f64 * dt;
                }
                x = tx;
                y = ty;
            }
            Segment::Blink { .. } => {
                for _ in 0..count {
                    samples.push(GazeSample {
                        valid_left: false,
                        valid_right: false,
                        ..GazeSample::new(0.0, 0.0, t, 0.0)
                    });
                    missing_samples += 1;
                    index += 1;
                    t = index as f64 * dt;
                }
            }
            Segment::MonocularDwell { x: tx, y: ty, .. } => {
                x = tx;
                y = ty;
                for _ in 0..count {
                    let jx = jitter(&mut rng);
                    let jy = jitter(&mut rng);
                    samples.push(GazeSample {
                        valid_right: false,
                        ..GazeSample::new(clamp_unit(x + jx), clamp_unit(y + jy), t, 0.7)
                    });
                    index += 1;
                    t = index as f64 * dt;
                }
            }
        }
    }

    let count_kind =
        |pred: fn(&Segment) -> bool| scenario.segments.iter().filter(|s| pred(s)).count();
    let start_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.0);
    let manifest = SessionManifest {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        sample_rate_hz: scenario.sample_rate_hz,
        noise,
        total_samples: samples.len(),
        duration_secs: samples.len() as f64 * dt,
        dwell_segments: count_kind(|s| {
            matches!(s, Segment::Dwell { .. } | Segment::MonocularDwell { .. })
        }),
        blink_segments: count_kind(|s| matches!(s, Segment::Blink { .. })),
        missing_samples,
        start_time_unix: start_time,
    };
    Ok(SessionBundle { samples, manifest })
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

pub fn write_manifest(path: &Path, manifest: &SessionManifest) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, manifest)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<SessionManifest> {
    let file =
        fs::File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let manifest = serde_json::from_reader::<_, SessionManifest>(file)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scenario(noise: f64, seed: Option<u64>) -> ScenarioSpec {
        ScenarioSpec {
            name: "unit".into(),
            sample_rate_hz: 50.0,
            seed,
            noise,
            start: None,
            segments: vec![
                Segment::Dwell {
                    x: 0.3,
                    y: 0.4,
                    duration: 0.5,
                    confidence: 0.9,
                },
                Segment::Saccade {
                    x: 0.8,
                    y: 0.2,
                    duration: 0.06,
                },
                Segment::Blink { duration: 0.1 },
                Segment::MonocularDwell {
                    x: 0.8,
                    y: 0.2,
                    duration: 0.2,
                },
            ],
        }
    }

    #[test]
    fn renders_segments_in_order() {
        let bundle = simulate_session(&scenario(0.0, Some(1))).unwrap();
        let samples = &bundle.samples;
        assert_eq!(samples.len(), 25 + 3 + 5 + 10);
        assert_eq!(samples[0].x, 0.3);
        assert_eq!(samples[24].y, 0.4);
        assert!((samples[27].x - 0.8).abs() < 1e-12);
        assert!(samples[28..33].iter().all(|s| !s.has_valid_eye()));
        assert!(samples[33].valid_left && !samples[33].valid_right);
        assert_eq!(bundle.manifest.missing_samples, 5);
        assert_eq!(bundle.manifest.dwell_segments, 2);
        assert_eq!(bundle.manifest.blink_segments, 1);
    }

    #[test]
    fn timestamps_follow_sample_rate() {
        let bundle = simulate_session(&scenario(0.0, None)).unwrap();
        for pair in bundle.samples.windows(2) {
            assert!((pair[1].timestamp - pair[0].timestamp - 0.02).abs() < 1e-9);
        }
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let a = simulate_session(&scenario(0.002, Some(42))).unwrap();
        let b = simulate_session(&scenario(0.002, Some(42))).unwrap();
        let c = simulate_session(&scenario(0.002, Some(43))).unwrap();
        assert_eq!(a.samples, b.samples);
        assert_ne!(a.samples, c.samples);
        assert!(a.samples[..25]
            .iter()
            .all(|s| (s.x - 0.3).abs() <= 0.002 + 1e-12));
    }

    #[test]
    fn rejects_empty_scenario() {
        let mut spec = scenario(0.0, None);
        spec.segments.clear();
        assert!(simulate_session(&spec).is_err());
    }

    #[test]
    fn reads_scenario_fixture() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join("test_data/dwell_scenario.toml");
        let spec = read_scenario(&path).unwrap();
        assert_eq!(spec.name, "dwell-review");
        assert_eq!(spec.seed, Some(7));
        assert!(matches!(spec.segments[0], Segment::Dwell { .. }));
        let bundle = simulate_session(&spec).unwrap();
        assert!(bundle.manifest.total_samples > 0);
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let bundle = simulate_session(&scenario(0.0, Some(3))).unwrap();
        write_manifest(&path, &bundle.manifest).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), bundle.manifest);
    }
}
