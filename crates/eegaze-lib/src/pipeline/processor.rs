use crate::annotate::{GazeAnnotator, PlotBounds, TriggerMode};
use crate::clock::Clock;
use crate::config::{BlinkConfig, PipelineConfig};
use crate::detectors::fixation::{DetectionConfig, Fixation, FixationDetector, ScreenSize};
use crate::error::GazeResult;
use crate::mapping::{
    CalibrationData, CoordinateMapper, EdfCoordinates, EdfViewContext, ViewportBounds,
};
use crate::metrics::context::{ContextAnalyzer, EegContextAnalysis, EegContextFlags};
use crate::metrics::patterns::{
    ConfidenceReport, ConfidenceScorer, PatternRecognizer, PatternReport,
};
use crate::pipeline::tracker::{BinocularFrame, GazeTracker};
use crate::scroll::{AutoScrollController, ScrollEvent};
use crate::signal::{GazeSample, SignalSource};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LATENCY_WINDOW: usize = 100;
const STATS_INTERVAL: Duration = Duration::from_secs(1);
const CHANNEL_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub total_gaze_points: u64,
    pub valid_gaze_points: u64,
    pub fixations_detected: u64,
    pub annotations_created: u64,
    pub average_latency_ms: f64,
    pub peak_latency_ms: f64,
    pub processing_rate_hz: f64,
    pub error_count: u64,
}

/// A detected fixation with its center re-mapped into recording space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixationEvent {
    pub fixation: Fixation,
    pub edf: EdfCoordinates,
    pub context: Option<EegContextAnalysis>,
    pub patterns: Option<PatternReport>,
    pub confidence: Option<ConfidenceReport>,
}

impl FixationEvent {
    pub fn context_flags(&self) -> Option<EegContextFlags> {
        self.context.as_ref().map(EegContextFlags::from)
    }
}

/// Downstream payload for one annotation trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationTrigger {
    pub start_time: f64,
    pub duration: f64,
    pub description: String,
    pub channel: String,
    pub confidence: f64,
    pub fixation_duration: f64,
    pub gaze_coordinates: (f64, f64),
    pub edf: EdfCoordinates,
    pub patterns: Option<PatternReport>,
    pub confidence_report: Option<ConfidenceReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Fixation(FixationEvent),
    /// Fixation waiting on `confirm_pending_annotation`
    AnnotationSuggested(FixationEvent),
    AnnotationTriggered(AnnotationTrigger),
    Blink { start: f64, duration: f64 },
    Scroll(ScrollEvent),
    Statistics(ProcessingStats),
    ProcessingError { message: String },
    ConfigRejected { message: String },
}

/// Configuration change applied between samples.
#[derive(Debug, Clone)]
pub enum ConfigUpdate {
    Calibration(CalibrationData),
    Viewport(ViewportBounds),
    ViewContext(EdfViewContext),
    Detection(DetectionConfig),
    DataDuration(f64),
}

#[derive(Debug, Clone, Default)]
struct BlinkTracker {
    gap_start: Option<f64>,
}

impl BlinkTracker {
    /// Returns `(start, duration)` when a closed gap qualifies as a blink.
    fn observe(
        &mut self,
        timestamp: f64,
        eye_valid: bool,
        config: &BlinkConfig,
    ) -> Option<(f64, f64)> {
        if !eye_valid {
            self.gap_start.get_or_insert(timestamp);
            return None;
        }
        let start = self.gap_start.take()?;
        let duration = timestamp - start;
        (duration >= config.min_duration && duration <= config.max_duration)
            .then_some((start, duration))
    }
}

/// Runs each tracker sample through mapping, detection and the trigger policy.
pub struct GazeProcessor {
    config: PipelineConfig,
    mapper: CoordinateMapper,
    detector: FixationDetector,
    context_analyzer: ContextAnalyzer,
    recognizer: PatternRecognizer,
    scorer: ConfidenceScorer,
    signal: Option<Box<dyn SignalSource + Send>>,
    data_duration: Option<f64>,
    annotator: Option<GazeAnnotator>,
    scroll: Option<AutoScrollController>,
    tracker: Option<Box<dyn GazeTracker>>,
    clock: Arc<dyn Clock>,
    active: bool,
    stats: ProcessingStats,
    latencies: VecDeque<f64>,
    last_stats_update: Instant,
    points_at_last_update: u64,
    subscribers: Vec<Sender<PipelineEvent>>,
    config_tx: Sender<ConfigUpdate>,
    config_rx: Receiver<ConfigUpdate>,
    blink: BlinkTracker,
    awaiting_blink: Option<FixationEvent>,
    pending_confirm: Option<FixationEvent>,
    last_gaze: Option<EdfCoordinates>,
}

impl GazeProcessor {
    pub fn new(config: PipelineConfig, clock: Arc<dyn Clock>) -> GazeResult<Self> {
        config.validate()?;
        let mut detection = config.detection.clone();
        detection.reference_screen = config.display.screen();
        let detector = FixationDetector::new(detection)?;
        let mapper = CoordinateMapper::with_viewport(
            config.display.viewport(),
            config.display.view_context(),
        )?;
        let (config_tx, config_rx) = bounded(CHANNEL_CAPACITY);
        let now = clock.now();
        info!(
            "gaze processor ready: {} detection, trigger {}",
            config.detection.algorithm, config.annotation.trigger_mode
        );
        Ok(Self {
            context_analyzer: ContextAnalyzer::new(config.context.clone()),
            config,
            mapper,
            detector,
            recognizer: PatternRecognizer::new(),
            scorer: ConfidenceScorer::default(),
            signal: None,
            data_duration: None,
            annotator: None,
            scroll: None,
            tracker: None,
            clock,
            active: false,
            stats: ProcessingStats::default(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            last_stats_update: now,
            points_at_last_update: 0,
            subscribers: Vec::new(),
            config_tx,
            config_rx,
            blink: BlinkTracker::default(),
            awaiting_blink: None,
            pending_confirm: None,
            last_gaze: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn detector(&self) -> &FixationDetector {
        &self.detector
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mapped position of the latest valid sample, for a cursor overlay.
    pub fn last_gaze(&self) -> Option<&EdfCoordinates> {
        self.last_gaze.as_ref()
    }

    pub fn recent_fixations(&self, duration: f64) -> Vec<Fixation> {
        self.detector.recent_fixations(duration)
    }

    /// Receive pipeline events; a subscriber that falls behind loses events.
    pub fn subscribe(&mut self) -> Receiver<PipelineEvent> {
        let (tx, rx) = bounded(EVENT_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    /// Handle for configuration changes coming from another thread.
    pub fn config_sender(&self) -> Sender<ConfigUpdate> {
        self.config_tx.clone()
    }

    pub fn set_gaze_tracker(&mut self, tracker: Box<dyn GazeTracker>) {
        self.tracker = Some(tracker);
    }

    pub fn set_signal_source(&mut self, source: Box<dyn SignalSource + Send>) {
        info!(
            "signal source attached: {} channels at {} Hz, {:.1}s",
            source.channel_count(),
            source.sampling_rate(),
            source.total_duration()
        );
        self.data_duration = Some(source.total_duration());
        self.signal = Some(source);
        self.sync_annotator_display();
    }

    pub fn set_annotator(&mut self, annotator: GazeAnnotator) {
        self.annotator = Some(annotator);
        self.sync_annotator_display();
    }

    pub fn annotator(&self) -> Option<&GazeAnnotator> {
        self.annotator.as_ref()
    }

    pub fn set_scroll_controller(&mut self, controller: AutoScrollController) {
        self.scroll = Some(controller);
    }

    pub fn scroll(&self) -> Option<&AutoScrollController> {
        self.scroll.as_ref()
    }

    pub fn scroll_mut(&mut self) -> Option<&mut AutoScrollController> {
        self.scroll.as_mut()
    }

    pub fn set_calibration(&mut self, calibration: CalibrationData) -> GazeResult<()> {
        self.mapper.set_calibration(calibration)
    }

    /// Also rescales detector thresholds and annotation geometry to the new screen.
    pub fn set_viewport(&mut self, viewport: ViewportBounds) -> GazeResult<()> {
        self.mapper.set_viewport(viewport)?;
        let screen = ScreenSize {
            width: viewport.screen_w,
            height: viewport.screen_h,
        };
        self.detector.set_reference_screen(screen);
        self.sync_annotator_display();
        Ok(())
    }

    pub fn set_view_context(&mut self, context: EdfViewContext) -> GazeResult<()> {
        self.mapper.set_view_context(context)?;
        self.sync_annotator_display();
        Ok(())
    }

    pub fn update_detection_config(&mut self, mut detection: DetectionConfig) -> GazeResult<()> {
        if let Some(viewport) = self.mapper.viewport() {
            detection.reference_screen = ScreenSize {
                width: viewport.screen_w,
                height: viewport.screen_h,
            };
        }
        self.detector.update_config(detection.clone())?;
        self.config.detection = detection;
        Ok(())
    }

    pub fn set_data_duration(&mut self, seconds: f64) {
        self.data_duration = Some(seconds);
        self.sync_annotator_display();
    }

    /// Starts the attached tracker, if any, and resets statistics.
    pub fn start_processing(&mut self) -> GazeResult<()> {
        if self.active {
            return Ok(());
        }
        if let Some(tracker) = self.tracker.as_mut() {
            if let Err(e) = tracker.start_streaming() {
                self.stats.error_count += 1;
                let message = format!("failed to start gaze streaming: {}", e);
                error!("{}", message);
                self.emit(PipelineEvent::ProcessingError { message });
                return Err(e.into());
            }
        }
        self.stats = ProcessingStats::default();
        self.latencies.clear();
        self.last_stats_update = self.clock.now();
        self.points_at_last_update = 0;
        self.active = true;
        info!("gaze processing started");
        Ok(())
    }

    /// Idempotent. Keeps completed fixations, drops the candidate run.
    pub fn stop_processing(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.stop_streaming();
        }
        self.detector.reset_transient();
        self.blink = BlinkTracker::default();
        self.awaiting_blink = None;
        info!(
            "gaze processing stopped after {} samples",
            self.stats.total_gaze_points
        );
    }

    /// Drain every ready frame from the attached tracker; returns frames processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while self.active {
            let Some(tracker) = self.tracker.as_mut() else {
                break;
            };
            match tracker.poll_sample() {
                Ok(Some(frame)) => {
                    self.process_frame(&frame);
                    processed += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    self.stats.error_count += 1;
                    let message = format!("gaze tracker error: {}", e);
                    error!("{}", message);
                    self.emit(PipelineEvent::ProcessingError { message });
                    break;
                }
            }
        }
        processed
    }

    pub fn process_frame(&mut self, frame: &BinocularFrame) {
        let s = frame.fuse();
        self.on_gaze_sample(s.x, s.y, s.timestamp, s.valid_left, s.valid_right, s.confidence);
    }

    /// Tracker callback. Frames with neither eye valid count only toward blinks.
    pub fn on_gaze_sample(
        &mut self,
        x: f64,
        y: f64,
        timestamp: f64,
        valid_left: bool,
        valid_right: bool,
        confidence: f64,
    ) {
        self.apply_config_updates();
        if !self.active {
            return;
        }
        let started = self.clock.now();
        let eye_valid = valid_left || valid_right;
        let blink = self
            .blink
            .observe(timestamp, eye_valid, &self.config.blink);
        if let Some((start, duration)) = blink {
            debug!("blink at {:.2}s lasting {:.0} ms", start, duration * 1000.0);
            self.emit(PipelineEvent::Blink { start, duration });
            self.confirm_with_blink(timestamp);
        }
        self.expire_blink_wait(timestamp);
        if !eye_valid {
            return;
        }

        self.stats.total_gaze_points += 1;
        let edf = self.mapper.map_gaze_to_edf(x, y);
        if !edf.is_valid {
            self.refresh_statistics();
            return;
        }
        self.stats.valid_gaze_points += 1;
        self.last_gaze = Some(edf);

        let sample = GazeSample {
            x,
            y,
            timestamp,
            valid_left,
            valid_right,
            confidence,
        };
        if confidence >= self.config.detection.confidence_threshold {
            if let Some(fixation) = self.detector.process_gaze_point(sample) {
                self.stats.fixations_detected += 1;
                self.handle_fixation(fixation);
            }
        }

        let latency_ms = self
            .clock
            .now()
            .saturating_duration_since(started)
            .as_secs_f64()
            * 1000.0;
        self.record_latency(latency_ms);
        self.refresh_statistics();
    }

    /// Trigger the held Manual Confirm suggestion.
    pub fn confirm_pending_annotation(&mut self) -> Option<AnnotationTrigger> {
        let event = self.pending_confirm.take()?;
        Some(self.trigger(event))
    }

    pub fn pending_annotation(&self) -> Option<&FixationEvent> {
        self.pending_confirm.as_ref()
    }

    /// Close any open candidate run, e.g. at the end of a recording.
    pub fn flush(&mut self) {
        if let Some(fixation) = self.detector.flush() {
            self.stats.fixations_detected += 1;
            self.handle_fixation(fixation);
        }
    }

    fn handle_fixation(&mut self, fixation: Fixation) {
        let edf = self.mapper.map_gaze_to_edf(fixation.x, fixation.y);
        let context = self.analyze_context(&edf);
        let patterns = context
            .as_ref()
            .map(|ctx| self.recognizer.recognize_patterns(ctx));
        let confidence = context
            .as_ref()
            .zip(patterns.as_ref())
            .map(|(ctx, pat)| self.scorer.calculate_confidence(&fixation, ctx, pat));
        debug!(
            "fixation on {} at {:.2}s lasting {:.2}s",
            edf.channel_name, edf.time_seconds, fixation.duration
        );
        let event = FixationEvent {
            fixation,
            edf,
            context,
            patterns,
            confidence,
        };
        self.emit(PipelineEvent::Fixation(event.clone()));

        if let Some(scroll) = self.scroll.as_mut() {
            let interest = event.context.as_ref().map(|c| c.clinical_significance);
            scroll.handle_fixation_detected(&event.fixation, interest);
        }
        self.forward_scroll_events();

        match self.config.annotation.trigger_mode {
            TriggerMode::FixationOnly => {
                self.trigger(event);
            }
            TriggerMode::FixationBlink => {
                self.awaiting_blink = Some(event);
            }
            TriggerMode::ManualConfirm => {
                self.emit(PipelineEvent::AnnotationSuggested(event.clone()));
                self.pending_confirm = Some(event);
            }
        }
    }

    fn analyze_context(&self, edf: &EdfCoordinates) -> Option<EegContextAnalysis> {
        let source = self.signal.as_deref()?;
        let display_idx = edf.channel_index?;
        let channel_idx = source
            .channel_names()
            .iter()
            .position(|name| *name == edf.channel_name)
            .or_else(|| (display_idx < source.channel_count()).then_some(display_idx))?;
        Some(self.context_analyzer.analyze_source(
            source,
            edf.time_seconds,
            channel_idx,
            &edf.channel_name,
        ))
    }

    fn confirm_with_blink(&mut self, blink_end: f64) {
        let window = self.config.blink.confirm_window;
        let confirmed = self.awaiting_blink.as_ref().is_some_and(|event| {
            let after = blink_end - event.fixation.end_time;
            after >= 0.0 && after <= window
        });
        if confirmed {
            if let Some(event) = self.awaiting_blink.take() {
                self.trigger(event);
            }
        }
    }

    fn expire_blink_wait(&mut self, now: f64) {
        let window = self.config.blink.confirm_window;
        let blink_open = self.blink.gap_start.is_some();
        if let Some(event) = &self.awaiting_blink {
            // a blink already underway may still close inside the window
            if !blink_open && now - event.fixation.end_time > window {
                debug!(
                    "fixation at {:.2}s expired without a blink",
                    event.fixation.start_time
                );
                self.awaiting_blink = None;
            }
        }
    }

    fn trigger(&mut self, event: FixationEvent) -> AnnotationTrigger {
        let payload = self.annotation_payload(&event);
        self.stats.annotations_created += 1;
        self.emit(PipelineEvent::AnnotationTriggered(payload.clone()));

        if let Some(annotator) = self.annotator.as_mut() {
            let flags = event.context_flags();
            let channel = Some(event.edf.channel_name.as_str()).filter(|c| !c.is_empty());
            let created = annotator.process_fixation(&event.fixation, channel, flags.as_ref());
            if created {
                if let Some(scroll) = self.scroll.as_mut() {
                    scroll.handle_annotation_created();
                }
            }
        }
        self.forward_scroll_events();
        payload
    }

    fn annotation_payload(&self, event: &FixationEvent) -> AnnotationTrigger {
        let annotation = &self.config.annotation;
        let fixation = &event.fixation;
        let description = if annotation.auto_description {
            let length = if fixation.duration < 1.0 { "brief" } else { "sustained" };
            let certainty = if fixation.confidence > 0.8 { "high" } else { "moderate" };
            format!(
                "{} - {} fixation ({} confidence)",
                annotation.default_category, length, certainty
            )
        } else {
            annotation.default_category.to_string()
        };
        let mut start_time = event.edf.time_seconds - fixation.duration / 2.0;
        if let Some(total) = self.data_duration {
            start_time = start_time.min(total - fixation.duration);
        }
        AnnotationTrigger {
            start_time: start_time.max(0.0),
            duration: fixation.duration,
            description,
            channel: event.edf.channel_name.clone(),
            confidence: fixation.confidence,
            fixation_duration: fixation.duration,
            gaze_coordinates: (fixation.x, fixation.y),
            edf: event.edf.clone(),
            patterns: event.patterns.clone(),
            confidence_report: event.confidence.clone(),
        }
    }

    fn record_latency(&mut self, latency_ms: f64) {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
        self.stats.peak_latency_ms = self.stats.peak_latency_ms.max(latency_ms);
        self.stats.average_latency_ms =
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64;
    }

    /// Throughput and scroll progress, at most once per interval.
    fn refresh_statistics(&mut self) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.last_stats_update);
        if elapsed < STATS_INTERVAL {
            return;
        }
        let points = self.stats.total_gaze_points - self.points_at_last_update;
        self.stats.processing_rate_hz = points as f64 / elapsed.as_secs_f64();
        self.last_stats_update = now;
        self.points_at_last_update = self.stats.total_gaze_points;
        self.emit(PipelineEvent::Statistics(self.stats.clone()));

        // progress follows the centre of the visible window
        let ctx = self.mapper.view_context();
        let position = ctx.view_start_time + ctx.view_duration / 2.0;
        if let Some(scroll) = self.scroll.as_mut() {
            scroll.tick(position);
        }
        self.forward_scroll_events();
    }

    fn forward_scroll_events(&mut self) {
        let Some(scroll) = self.scroll.as_mut() else {
            return;
        };
        for event in scroll.take_events() {
            self.emit(PipelineEvent::Scroll(event));
        }
    }

    fn apply_config_updates(&mut self) {
        while let Ok(update) = self.config_rx.try_recv() {
            let result = match update {
                ConfigUpdate::Calibration(c) => self.set_calibration(c),
                ConfigUpdate::Viewport(v) => self.set_viewport(v),
                ConfigUpdate::ViewContext(c) => self.set_view_context(c),
                ConfigUpdate::Detection(d) => self.update_detection_config(d),
                ConfigUpdate::DataDuration(d) => {
                    self.set_data_duration(d);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!("configuration update rejected: {}", e);
                self.emit(PipelineEvent::ConfigRejected {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Hand the annotator the plot geometry the mapper is using.
    fn sync_annotator_display(&mut self) {
        let Some(annotator) = self.annotator.as_mut() else {
            return;
        };
        let ctx = self.mapper.view_context();
        let Some(viewport) = self.mapper.viewport().copied() else {
            return;
        };
        let channels: Vec<String> = ctx
            .channel_names
            .iter()
            .skip(ctx.channel_scroll_offset)
            .take(ctx.visible_channel_count)
            .cloned()
            .collect();
        let rows = channels.len().max(1) as f64;
        annotator.set_screen(ScreenSize {
            width: viewport.screen_w,
            height: viewport.screen_h,
        });
        annotator.set_display_context(
            channels,
            (ctx.view_start_time, ctx.view_end_time()),
            PlotBounds {
                x: viewport.widget_x,
                y: viewport.widget_y,
                width: viewport.widget_w,
                height: viewport.widget_h,
            },
            viewport.widget_h / rows,
            self.data_duration.unwrap_or_else(|| ctx.view_end_time()),
        );
    }

    fn emit(&mut self, event: PipelineEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl fmt::Debug for GazeProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GazeProcessor")
            .field("active", &self.active)
            .field("stats", &self.stats)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}
