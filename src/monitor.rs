use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{GrayImage, RgbImage};
use serde::Serialize;
use thiserror::Error;

use crate::alert::AlertDispatcher;
use crate::analytics::{DetectionPipeline, Preprocessor};
use crate::camera::{FfmpegSource, FrameSource, SourceError};
use crate::config::{Config, SourceConfig};
use crate::display::{AnnotatedFrame, Display};
use crate::zone::{self, SharedZone};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
    #[error("no frame could be read from the source")]
    FirstFrameMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    EndOfStream,
    Stopped,
    SourceFailed,
}

#[derive(Debug)]
pub struct RunSummary {
    pub frames: u64,
    pub alerts: u64,
    pub reason: EndReason,
}

/// Counters shared with the HTTP status endpoint.
#[derive(Default)]
pub struct MonitorStats {
    frames: AtomicU64,
    alerts: AtomicU64,
    running: AtomicBool,
    working_width: AtomicU32,
    working_height: AtomicU32,
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub frames: u64,
    pub alerts: u64,
    pub working_width: u32,
    pub working_height: u32,
}

impl MonitorStats {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            working_width: self.working_width.load(Ordering::Relaxed),
            working_height: self.working_height.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl From<&SourceConfig> for RetryPolicy {
    fn from(config: &SourceConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            delay: Duration::from_millis(config.reconnect_delay_ms),
        }
    }
}

enum FrameRead {
    Frame(RgbImage),
    End(EndReason),
}

type Clock = Box<dyn FnMut() -> Instant + Send>;

/// The per-frame loop: read, downscale, detect, alert, render.
pub struct Monitor {
    preprocessor: Preprocessor,
    pipeline: DetectionPipeline,
    dispatcher: AlertDispatcher,
    display: Option<Box<dyn Display>>,
    zone: SharedZone,
    stats: Arc<MonitorStats>,
    retry: RetryPolicy,
    clock: Clock,
}

impl Monitor {
    pub fn new(
        config: &Config,
        zone: SharedZone,
        dispatcher: AlertDispatcher,
        display: Option<Box<dyn Display>>,
        stats: Arc<MonitorStats>,
    ) -> Self {
        let det = &config.detection;
        let working = det.working_width.zip(det.working_height);

        Self {
            preprocessor: Preprocessor::new(det.downscale, working),
            pipeline: DetectionPipeline::new(det),
            dispatcher,
            display,
            zone,
            stats,
            retry: RetryPolicy::from(&config.source),
            clock: Box::new(Instant::now),
        }
    }

    /// Replaces the wall clock used to time frames.
    pub fn with_clock(mut self, clock: impl FnMut() -> Instant + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        shutdown: &AtomicBool,
    ) -> Result<RunSummary, MonitorError> {
        let first = match self.read_frame(source, shutdown) {
            FrameRead::Frame(frame) => frame,
            FrameRead::End(EndReason::Stopped) => {
                tracing::info!("stopped before the first frame");
                return Ok(RunSummary {
                    frames: 0,
                    alerts: 0,
                    reason: EndReason::Stopped,
                });
            }
            FrameRead::End(_) => return Err(MonitorError::FirstFrameMissing),
        };

        self.stats.running.store(true, Ordering::Relaxed);
        let summary = self.run_loop(first, source, shutdown);
        self.stats.running.store(false, Ordering::Relaxed);

        tracing::info!(
            frames = summary.frames,
            alerts = summary.alerts,
            reason = ?summary.reason,
            "monitor stopped"
        );
        Ok(summary)
    }

    fn run_loop(
        &mut self,
        first: RgbImage,
        source: &mut dyn FrameSource,
        shutdown: &AtomicBool,
    ) -> RunSummary {
        let at = (self.clock)();
        let first = self.preprocessor.prepare(first);
        if let Some((width, height)) = self.preprocessor.working_size() {
            self.stats.working_width.store(width, Ordering::Relaxed);
            self.stats.working_height.store(height, Ordering::Relaxed);
        }
        self.pipeline.prime(&first, at);
        self.render_primed(first);

        let mut frames = 1u64;
        let mut alerts = 0u64;
        self.stats.frames.store(frames, Ordering::Relaxed);

        tracing::info!("monitor started");

        let mut stats_at = Instant::now();
        let mut stats_frames = frames;

        let reason = loop {
            if shutdown.load(Ordering::Relaxed) {
                break EndReason::Stopped;
            }

            let raw = match self.read_frame(source, shutdown) {
                FrameRead::Frame(frame) => frame,
                FrameRead::End(reason) => break reason,
            };
            let at = (self.clock)();

            alerts += self.step(raw, at, frames) as u64;
            frames += 1;
            self.stats.frames.store(frames, Ordering::Relaxed);
            self.stats.alerts.store(alerts, Ordering::Relaxed);

            let since = stats_at.elapsed();
            if since >= STATS_INTERVAL {
                tracing::info!(
                    frames,
                    alerts,
                    fps = format!("{:.1}", (frames - stats_frames) as f64 / since.as_secs_f64()),
                    "monitor stats"
                );
                stats_at = Instant::now();
                stats_frames = frames;
            }
        };

        RunSummary {
            frames,
            alerts,
            reason,
        }
    }

    fn step(&mut self, raw: RgbImage, at: Instant, frame_index: u64) -> usize {
        let frame = self.preprocessor.prepare(raw);
        let zone = zone::snapshot(&self.zone);

        let analysis = self.pipeline.process(&frame, &zone, at);

        let mut annotated = AnnotatedFrame::new(frame, zone);
        let alerts = self
            .dispatcher
            .dispatch(frame_index, &analysis.detections, &mut annotated);

        if let Some(display) = &mut self.display {
            display.render(&annotated, &analysis.mask);
        }

        alerts
    }

    fn render_primed(&mut self, frame: RgbImage) {
        if let Some(display) = &mut self.display {
            let mask = GrayImage::new(frame.width(), frame.height());
            let zone = zone::snapshot(&self.zone);
            display.render(&AnnotatedFrame::new(frame, zone), &mask);
        }
    }

    /// Retries transient failures with linear backoff.
    fn read_frame(&self, source: &mut dyn FrameSource, shutdown: &AtomicBool) -> FrameRead {
        let mut attempt = 0;
        loop {
            match source.next_frame() {
                Ok(Some(frame)) => return FrameRead::Frame(frame),
                Ok(None) => {
                    tracing::info!("end of stream");
                    return FrameRead::End(EndReason::EndOfStream);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.retry.attempts {
                        tracing::error!(error = %e, attempts = attempt - 1, "frame source failed");
                        return FrameRead::End(EndReason::SourceFailed);
                    }
                    tracing::warn!(error = %e, attempt, "frame read failed, retrying");
                    thread::sleep(self.retry.delay * attempt);
                    if shutdown.load(Ordering::Relaxed) {
                        return FrameRead::End(EndReason::Stopped);
                    }
                }
            }
        }
    }
}

/// Opens the source and runs the monitor on a blocking thread.
pub fn spawn_monitor(
    monitor: Monitor,
    source_config: SourceConfig,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<Result<RunSummary, MonitorError>> {
    tokio::task::spawn_blocking(move || {
        tracing::info!(url = %source_config.url, "opening frame source");
        let mut source =
            FfmpegSource::open(&source_config).map_err(MonitorError::SourceUnavailable)?;
        monitor.run(&mut source, &shutdown)
    })
}
