//! The acquisition loop and its state machine.
//!
//! `Initializing -> Running -> (Cancelled | Failed) -> Terminated`, with a direct
//! `Initializing -> Terminated` edge when fewer than two cameras are attached.
//!
//! Retrieval is sequential: camera 1's call completes before camera 2's starts,
//! so the measured skew includes that latency on top of the true sensor offset.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::composite::CompositeComposer;
use crate::config::SessionConfig;
use crate::io::{OutputLayout, Persister};
use crate::monitor::Monitor;
use crate::mosaic::{common_height, MosaicAccumulator};
use crate::skew::{SkewEstimator, SkewStats};
use crate::source::{Grab, Rig};
use crate::stamp::{Clock, FrameStamper};
use crate::{CaptureSource, Error, Frame, GrabStrategy, Result, SourceFactory};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Running,
    Cancelled,
    Failed,
    Terminated,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Initialization was refused before any camera was opened.
    NotStarted { reason: String },
    Cancelled,
    Failed { error: String, timeout: bool },
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub outcome: Outcome,
    /// Pairs fully processed and persisted.
    pub frames: u64,
    /// Pairs dropped because either grab was incomplete.
    pub skipped_pairs: u64,
    pub skew_samples_ms: Vec<f64>,
    pub mean_skew_ms: Option<f64>,
    /// Size of the last composite written, if any.
    pub composite_size: Option<(u32, u32)>,
}

impl SessionReport {
    /// Operator-facing closing lines.
    pub fn summary(&self) -> Vec<String> {
        match &self.outcome {
            Outcome::NotStarted { reason } => vec![reason.clone()],
            Outcome::Cancelled => vec![format!(
                "Session cancelled. Total number of images captured: {}",
                self.frames
            )],
            Outcome::Failed { error, .. } => {
                let average = match self.mean_skew_ms {
                    Some(ms) => format!("Average: {ms:.3} ms"),
                    None => "Average: no statistics available".to_string(),
                };
                vec![
                    format!("An error occurred: {error}"),
                    average,
                    format!("Total number of images captured: {}", self.frames),
                ]
            }
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

pub struct Session<C: Clock, M: Monitor> {
    config: SessionConfig,
    stamper: FrameStamper<C>,
    estimator: SkewEstimator,
    composer: CompositeComposer,
    monitor: M,
    state: SessionState,
    frames: u64,
    skipped: u64,
    skew: SkewStats,
    mosaics: [MosaicAccumulator; 2],
    composite_size: Option<(u32, u32)>,
}

impl<C: Clock, M: Monitor> Session<C, M> {
    pub fn new(config: SessionConfig, clock: C, monitor: M) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stamper: FrameStamper::new(clock),
            estimator: SkewEstimator::new(config.skew_mode),
            composer: CompositeComposer::new(config.gap_px),
            config,
            monitor,
            state: SessionState::Initializing,
            frames: 0,
            skipped: 0,
            skew: SkewStats::default(),
            mosaics: [MosaicAccumulator::new(), MosaicAccumulator::new()],
            composite_size: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn skew(&self) -> &SkewStats {
        &self.skew
    }

    pub fn mosaics(&self) -> &[MosaicAccumulator; 2] {
        &self.mosaics
    }

    /// Drive one session to termination. Errors never escape: they become the
    /// `Failed` transition and are carried in the report.
    pub fn run<F: SourceFactory>(&mut self, factory: &F) -> SessionReport {
        let outcome = match self.initialize(factory) {
            Ok((rig, persister)) => self.acquire(rig, &persister),
            Err(Error::Configuration(reason)) => {
                warn!(%reason, "session not started");
                Outcome::NotStarted { reason }
            }
            Err(e) => self.fail(e),
        };
        self.monitor.close();
        self.state = SessionState::Terminated;
        info!(frames = self.frames, "session terminated");
        self.report(outcome)
    }

    fn initialize<F: SourceFactory>(
        &mut self,
        factory: &F,
    ) -> Result<(Rig<F::Source>, Persister)> {
        self.state = SessionState::Initializing;
        let profile = self.config.active_profile();
        let mut rig = Rig::assemble(factory, &profile)?;
        let persister = Persister::create(
            OutputLayout::new(&self.config.output_root),
            self.config.image_format,
        )?;
        rig.start_streaming(GrabStrategy::LatestFrameOnly)?;
        Ok((rig, persister))
    }

    fn acquire<S: CaptureSource>(&mut self, mut rig: Rig<S>, persister: &Persister) -> Outcome {
        self.state = SessionState::Running;
        info!(
            first = %rig.first.info().name,
            second = %rig.second.info().name,
            timeout_ms = self.config.timeout_ms,
            "acquisition running"
        );
        loop {
            match self.iterate(&mut rig, persister) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    self.state = SessionState::Cancelled;
                    info!(frames = self.frames, "session cancelled");
                    return Outcome::Cancelled;
                }
                // `rig` drops on return, stopping and closing both cameras.
                Err(e) => return self.fail(e),
            }
        }
    }

    fn fail(&mut self, e: Error) -> Outcome {
        self.state = SessionState::Failed;
        error!(error = %e, frames = self.frames, "session failed");
        Outcome::Failed {
            timeout: e.is_timeout(),
            error: e.to_string(),
        }
    }

    fn iterate<S: CaptureSource>(
        &mut self,
        rig: &mut Rig<S>,
        persister: &Persister,
    ) -> Result<Flow> {
        let timeout_ms = self.config.timeout_ms;
        let mut g1 = Grab::retrieve(&mut rig.first, timeout_ms)?;
        let mut g2 = Grab::retrieve(&mut rig.second, timeout_ms)?;

        if g1.succeeded() && g2.succeeded() {
            let (Some(f1), Some(f2)) = (g1.take_frame(), g2.take_frame()) else {
                return Err(Error::Backend("grab result without frame".into()));
            };
            self.process_pair(f1, f2, persister)?;
        } else {
            self.skipped += 1;
            warn!(
                first = g1.incomplete_reason().unwrap_or("ok"),
                second = g2.incomplete_reason().unwrap_or("ok"),
                "incomplete grab, pair skipped"
            );
        }
        drop(g2);
        drop(g1);

        if self.monitor.cancel_requested() {
            return Ok(Flow::Stop);
        }
        if self.config.max_frames.is_some_and(|n| self.frames >= n) {
            info!(limit = self.frames, "frame limit reached");
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn process_pair(&mut self, f1: Frame, f2: Frame, persister: &Persister) -> Result<()> {
        let (f1, ts1) = self.stamper.stamp(f1)?;
        let (f2, ts2) = self.stamper.stamp(f2)?;
        let skew = self.estimator.estimate(&ts1, &ts2)?;
        self.skew.record(skew);
        debug!(index = self.frames, %ts1, %ts2, skew_ms = skew.millis(), "pair stamped");

        persister.write_frame(1, &ts1, &f1)?;
        persister.write_frame(2, &ts2, &f2)?;

        let [m1, m2] = &mut self.mosaics;
        m1.push(f1)?;
        m2.push(f2)?;
        let target = common_height(m1, m2);
        let s1 = m1.snapshot(target)?;
        let s2 = m2.snapshot(target)?;
        persister.write_mosaic(1, &s1)?;
        persister.write_mosaic(2, &s2)?;

        let composite = self.composer.compose(&s1, &s2)?;
        persister.write_composite(&composite)?;
        self.composite_size = Some((composite.width, composite.height));

        let index = self.frames;
        self.frames += 1;
        self.monitor.present(index, skew, &composite)
    }

    fn report(&self, outcome: Outcome) -> SessionReport {
        SessionReport {
            outcome,
            frames: self.frames,
            skipped_pairs: self.skipped,
            skew_samples_ms: self.skew.samples().iter().map(|s| s.millis()).collect(),
            mean_skew_ms: self.skew.mean(),
            composite_size: self.composite_size,
        }
    }
}
