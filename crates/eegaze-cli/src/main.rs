use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use eegaze_lib::{
    annotate::{AnnotatorStats, GazeAnnotator, JsonLinesStore},
    clock::ManualClock,
    config::{read_config, PipelineConfig},
    detectors::fixation::{DetectorStatistics, Fixation, FixationAlgorithm, FixationDetector},
    io::{eeg as eeg_io, eye as eye_io},
    mapping::{CoordinateDiagnostics, CoordinateMapper, EdfCoordinates, EdfViewContext},
    metrics::{
        ContextAnalyzer, EegContextAnalysis, EegContextFlags, PatternRecognizer, PatternReport,
    },
    pipeline::{BinocularFrame, ConfigUpdate, GazeProcessor, PipelineEvent, ProcessingStats},
    scroll::{AutoScrollController, ScrollDriver, ScrollEvent, ScrollState, ScrollStatistics},
    signal::{GazeSample, SignalSource},
};
use eegaze_sim::{read_scenario, simulate_session, write_manifest};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "eegaze",
    version,
    about = "EEGaze: gaze-driven EEG review and annotation tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AlgorithmArg {
    #[value(name = "ivt")]
    Ivt,
    #[value(name = "idt")]
    Idt,
    #[value(name = "imst")]
    Imst,
}

impl From<AlgorithmArg> for FixationAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Ivt => FixationAlgorithm::Ivt,
            AlgorithmArg::Idt => FixationAlgorithm::Idt,
            AlgorithmArg::Imst => FixationAlgorithm::Imst,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect fixations in a recorded gaze CSV
    DetectFixations {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        algorithm: Option<AlgorithmArg>,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Map normalized gaze points onto recording time and channel
    MapGaze {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        x: Option<f64>,
        #[arg(long)]
        y: Option<f64>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 0.0)]
        view_start: f64,
    },
    /// Characterize the EEG around one time point on one channel
    AnalyzeContext {
        /// EDF or CSV recording
        #[arg(long)]
        recording: PathBuf,
        #[arg(long)]
        time: f64,
        /// Channel name or zero-based index
        #[arg(long)]
        channel: String,
        /// Sampling rate for CSV recordings
        #[arg(long)]
        fs: Option<f64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the full gaze pipeline over a recorded session
    Replay {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        recording: Option<PathBuf>,
        /// Sampling rate for CSV recordings
        #[arg(long)]
        fs: Option<f64>,
        /// Write annotation JSON lines here instead of stdout
        #[arg(long)]
        annotations: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        auto_scroll: bool,
        /// Review length when no recording is given (seconds)
        #[arg(long)]
        total_duration: Option<f64>,
    },
    /// Generate a synthetic gaze session from a TOML scenario
    Simulate {
        #[arg(long)]
        scenario: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::DetectFixations {
            input,
            config,
            algorithm,
            delimiter,
        } => cmd_detect_fixations(&input, config.as_deref(), algorithm, delimiter)?,
        Commands::MapGaze {
            input,
            x,
            y,
            config,
            view_start,
        } => cmd_map_gaze(input.as_deref(), x, y, config.as_deref(), view_start)?,
        Commands::AnalyzeContext {
            recording,
            time,
            channel,
            fs,
            config,
        } => cmd_analyze_context(&recording, time, &channel, fs, config.as_deref())?,
        Commands::Replay {
            input,
            config,
            recording,
            fs,
            annotations,
            auto_scroll,
            total_duration,
        } => cmd_replay(
            &input,
            config.as_deref(),
            recording.as_deref(),
            fs,
            annotations.as_deref(),
            auto_scroll,
            total_duration,
        )?,
        Commands::Simulate {
            scenario,
            out,
            manifest,
        } => cmd_simulate(&scenario, &out, manifest.as_deref())?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => read_config(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter).map_err(|_| anyhow!("delimiter '{}' is not a single byte", delimiter))
}

fn open_recording(
    path: &Path,
    fs: Option<f64>,
    config: &PipelineConfig,
) -> Result<Box<dyn SignalSource + Send>> {
    let fs = fs.unwrap_or(config.context.sampling_rate);
    Ok(Box::new(eeg_io::load_recording(path, fs)?))
}

#[derive(Serialize)]
struct FixationSummary {
    start_time: f64,
    end_time: f64,
    x: f64,
    y: f64,
    duration: f64,
    confidence: f64,
    dispersion: f64,
    stability: f64,
}

impl From<&Fixation> for FixationSummary {
    fn from(f: &Fixation) -> Self {
        Self {
            start_time: f.start_time,
            end_time: f.end_time,
            x: f.x,
            y: f.y,
            duration: f.duration,
            confidence: f.confidence,
            dispersion: f.dispersion,
            stability: f.stability,
        }
    }
}

#[derive(Serialize)]
struct DetectionOutput {
    fixations: Vec<FixationSummary>,
    skipped_samples: usize,
    statistics: DetectorStatistics,
}

fn cmd_detect_fixations(
    input: &Path,
    config: Option<&Path>,
    algorithm: Option<AlgorithmArg>,
    delimiter: char,
) -> Result<()> {
    let config = load_config(config)?;
    let samples = eye_io::read_gaze_csv(input, delimiter_byte(delimiter)?)?;
    let mut detection = config.detection.clone();
    if let Some(algorithm) = algorithm {
        detection.algorithm = algorithm.into();
    }
    detection.reference_screen = config.display.screen();
    let threshold = detection.confidence_threshold;
    let mut detector = FixationDetector::new(detection)?;

    let mut fixations = Vec::new();
    let mut skipped = 0;
    for sample in samples {
        if !sample.has_valid_eye() || sample.confidence < threshold {
            skipped += 1;
            continue;
        }
        if let Some(fixation) = detector.process_gaze_point(sample) {
            fixations.push(FixationSummary::from(&fixation));
        }
    }
    if let Some(fixation) = detector.flush() {
        fixations.push(FixationSummary::from(&fixation));
    }
    info!("{} fixations from {}", fixations.len(), input.display());
    let output = DetectionOutput {
        fixations,
        skipped_samples: skipped,
        statistics: detector.statistics(),
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

#[derive(Serialize)]
struct MappedGaze {
    x: f64,
    y: f64,
    timestamp: Option<f64>,
    coordinates: EdfCoordinates,
    diagnostics: CoordinateDiagnostics,
}

fn cmd_map_gaze(
    input: Option<&Path>,
    x: Option<f64>,
    y: Option<f64>,
    config: Option<&Path>,
    view_start: f64,
) -> Result<()> {
    let config = load_config(config)?;
    let mut context = config.display.view_context();
    context.view_start_time = view_start;
    let mapper = CoordinateMapper::with_viewport(config.display.viewport(), context)?;

    let points: Vec<(f64, f64, Option<f64>)> = match (input, x, y) {
        (Some(path), _, _) => eye_io::read_gaze_csv(path, b',')?
            .into_iter()
            .filter(GazeSample::has_valid_eye)
            .map(|s| (s.x, s.y, Some(s.timestamp)))
            .collect(),
        (None, Some(x), Some(y)) => vec![(x, y, None)],
        _ => return Err(anyhow!("map-gaze needs --input or both --x and --y")),
    };
    for (x, y, timestamp) in points {
        let coordinates = mapper.map_gaze_to_edf(x, y);
        let diagnostics = mapper.validate_coordinates(&coordinates);
        let mapped = MappedGaze {
            x,
            y,
            timestamp,
            coordinates,
            diagnostics,
        };
        println!("{}", serde_json::to_string(&mapped)?);
    }
    Ok(())
}

#[derive(Serialize)]
struct ContextOutput {
    context: EegContextAnalysis,
    flags: EegContextFlags,
    patterns: PatternReport,
}

fn cmd_analyze_context(
    recording: &Path,
    time: f64,
    channel: &str,
    fs: Option<f64>,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let source = open_recording(recording, fs, &config)?;
    let names = source.channel_names();
    let index = names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(channel))
        .or_else(|| channel.parse::<usize>().ok().filter(|&i| i < names.len()))
        .ok_or_else(|| {
            anyhow!(
                "channel '{}' not found; available: {}",
                channel,
                names.join(", ")
            )
        })?;
    let analyzer = ContextAnalyzer::new(config.context.clone());
    let context = analyzer.analyze_source(source.as_ref(), time, index, &names[index]);
    let patterns = PatternRecognizer::new().recognize_patterns(&context);
    let output = ContextOutput {
        flags: EegContextFlags::from(&context),
        context,
        patterns,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// Stands in for the viewer's auto-move toggle during offline replay.
#[derive(Debug, Default)]
struct ReplayDriver {
    moving: bool,
}

impl ScrollDriver for ReplayDriver {
    fn set_auto_move(&mut self, active: bool) {
        self.moving = active;
    }

    fn is_auto_moving(&self) -> bool {
        self.moving
    }
}

#[derive(Serialize)]
struct ReplaySummary {
    processing: ProcessingStats,
    annotator: Option<AnnotatorStats>,
    scroll: Option<ScrollStatistics>,
    events: BTreeMap<&'static str, usize>,
    view_start_time: f64,
}

fn event_kind(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::Fixation(_) => "fixation",
        PipelineEvent::AnnotationSuggested(_) => "annotation_suggested",
        PipelineEvent::AnnotationTriggered(_) => "annotation_triggered",
        PipelineEvent::Blink { .. } => "blink",
        PipelineEvent::Scroll(ScrollEvent::Completed) => "scroll_completed",
        PipelineEvent::Scroll(_) => "scroll",
        PipelineEvent::Statistics(_) => "statistics",
        PipelineEvent::ProcessingError { .. } => "processing_error",
        PipelineEvent::ConfigRejected { .. } => "config_rejected",
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    input: &Path,
    config: Option<&Path>,
    recording: Option<&Path>,
    fs: Option<f64>,
    annotations: Option<&Path>,
    auto_scroll: bool,
    total_duration: Option<f64>,
) -> Result<()> {
    let config = load_config(config)?;
    let samples = eye_io::read_gaze_csv(input, b',')?;
    let clock = Arc::new(ManualClock::new());
    let mut processor = GazeProcessor::new(config.clone(), clock.clone())?;
    let events = processor.subscribe();
    let updates = processor.config_sender();

    let mut total = total_duration;
    if let Some(path) = recording {
        let source = open_recording(path, fs, &config)?;
        total = total.or(Some(source.total_duration()));
        processor.set_signal_source(source);
    }

    let writer: Box<dyn Write + Send> = match annotations {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    processor.set_annotator(GazeAnnotator::new(
        config.annotation.clone(),
        config.analyzer.clone(),
        Box::new(JsonLinesStore::new(writer)),
    ));

    let mut view = config.display.view_context();
    if auto_scroll {
        let total = total
            .ok_or_else(|| anyhow!("auto-scroll needs --recording or --total-duration"))?;
        let mut controller = AutoScrollController::new(config.scroll.clone(), clock.clone());
        controller.attach_driver(Box::new(ReplayDriver::default()));
        controller.start_enhanced_scroll(total, view.view_duration)?;
        processor.set_scroll_controller(controller);
    }

    processor.start_processing()?;
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut last_timestamp = samples.first().map(|s| s.timestamp);
    for sample in &samples {
        if let Some(previous) = last_timestamp {
            let step = (sample.timestamp - previous).max(0.0);
            clock.advance_secs(step);
            let moved = total.is_some_and(|total| advance_view(&processor, &mut view, step, total));
            if moved && updates.send(ConfigUpdate::ViewContext(view.clone())).is_err() {
                warn!("view update channel closed");
            }
        }
        last_timestamp = Some(sample.timestamp);
        processor.process_frame(&BinocularFrame::from(*sample));
        for event in events.try_iter() {
            *counts.entry(event_kind(&event)).or_insert(0) += 1;
        }
    }
    processor.flush();
    processor.stop_processing();
    let scroll = processor.scroll_mut().map(|scroll| {
        scroll.stop_enhanced_scroll();
        scroll.statistics()
    });
    for event in events.try_iter() {
        *counts.entry(event_kind(&event)).or_insert(0) += 1;
    }

    let summary = ReplaySummary {
        processing: processor.stats().clone(),
        annotator: processor.annotator().map(|a| a.stats().clone()),
        scroll,
        events: counts,
        view_start_time: processor.mapper().view_context().view_start_time,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

/// Moves the view while auto-scroll is running; returns true when it moved.
fn advance_view(
    processor: &GazeProcessor,
    view: &mut EdfViewContext,
    step: f64,
    total: f64,
) -> bool {
    let Some(scroll) = processor.scroll() else {
        return false;
    };
    if scroll.state() != ScrollState::Scrolling || step <= 0.0 {
        return false;
    }
    let seconds_per_page = scroll.scroll_speed();
    let last_start = (total - view.view_duration).max(0.0);
    let next =
        (view.view_start_time + step * view.view_duration / seconds_per_page).min(last_start);
    if (next - view.view_start_time).abs() < f64::EPSILON {
        return false;
    }
    view.view_start_time = next;
    true
}

fn cmd_simulate(scenario: &Path, out: &Path, manifest: Option<&Path>) -> Result<()> {
    let spec = read_scenario(scenario)?;
    let bundle = simulate_session(&spec)?;
    eye_io::write_gaze_csv(out, &bundle.samples)?;
    if let Some(path) = manifest {
        write_manifest(path, &bundle.manifest)?;
    }
    println!("{}", serde_json::to_string(&bundle.manifest)?);
    Ok(())
}
