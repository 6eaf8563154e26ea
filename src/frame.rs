//! Frame driver: calls `render` once per display refresh until the host
//! stops asking.
//!
//! A failed frame is never fatal. It is logged and counted, and the next
//! tick simply tries again.

use crate::marshal::CallError;
use crate::runtime::ModuleHandle;
use crate::session::HostSession;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// The host's "run again soon" primitive.
pub trait FrameScheduler {
    /// Wait for the next frame. `false` means no more frames are wanted.
    fn next_frame(&mut self) -> impl Future<Output = bool>;
}

/// Cancels an [`IntervalScheduler`] from elsewhere in the host.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Ticks at a fixed refresh rate, optionally for a limited number of frames.
#[derive(Debug)]
pub struct IntervalScheduler {
    interval: Interval,
    remaining: Option<u64>,
    stop: StopToken,
}

impl IntervalScheduler {
    /// Must be created inside a tokio runtime.
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            remaining: None,
            stop: StopToken::new(),
        }
    }

    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }
}

impl FrameScheduler for IntervalScheduler {
    async fn next_frame(&mut self) -> bool {
        if self.stop.is_stopped() || self.remaining == Some(0) {
            return false;
        }
        self.interval.tick().await;
        if self.stop.is_stopped() {
            return false;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        true
    }
}

/// What happened on one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// The call errored or the graphics bridge recorded a failure during it.
    Failed(String),
    /// The module was not instantiated yet, so nothing was called.
    Skipped,
}

/// Totals for a [`FrameDriver::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frames: u64,
    pub drawn: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_failure: Option<String>,
}

impl FrameReport {
    fn record(&mut self, outcome: FrameOutcome) {
        self.frames += 1;
        match outcome {
            FrameOutcome::Drawn => self.drawn += 1,
            FrameOutcome::Skipped => self.skipped += 1,
            FrameOutcome::Failed(reason) => {
                self.failed += 1;
                self.last_failure = Some(reason);
            }
        }
    }
}

/// Repeatedly renders one surface.
#[derive(Debug, Clone)]
pub struct FrameDriver {
    surface_id: String,
}

impl FrameDriver {
    pub fn new(surface_id: impl Into<String>) -> Self {
        Self {
            surface_id: surface_id.into(),
        }
    }

    /// Render a single frame.
    pub fn frame(&self, module: &mut ModuleHandle) -> FrameOutcome {
        let before = module.graphics().diagnostic_count();
        let outcome = match module.render(&self.surface_id) {
            Err(e) => FrameOutcome::Failed(e.to_string()),
            Ok(()) if module.graphics().diagnostic_count() > before => {
                let reason = module
                    .graphics()
                    .diagnostics()
                    .last()
                    .map(|d| format!("{} failed with {}: {}", d.operation, d.code, d.detail))
                    .unwrap_or_else(|| "graphics failure".to_string());
                FrameOutcome::Failed(reason)
            }
            Ok(()) => FrameOutcome::Drawn,
        };
        if let FrameOutcome::Failed(reason) = &outcome {
            tracing::debug!(surface = %self.surface_id, %reason, "frame failed");
        }
        outcome
    }

    /// Render one frame through a session, skipping while it is pending.
    pub fn session_frame(&self, session: &mut HostSession) -> FrameOutcome {
        session.poll();
        match session.module() {
            Ok(module) => self.frame(module),
            Err(CallError::NotReady) => FrameOutcome::Skipped,
            Err(e) => FrameOutcome::Failed(e.to_string()),
        }
    }

    /// Render every frame the scheduler asks for.
    pub async fn run<S: FrameScheduler>(
        &self,
        module: &mut ModuleHandle,
        scheduler: &mut S,
    ) -> FrameReport {
        let mut report = FrameReport::default();
        while scheduler.next_frame().await {
            report.record(self.frame(module));
        }
        tracing::info!(surface = %self.surface_id, ?report, "frame loop finished");
        report
    }

    /// Like [`FrameDriver::run`], but through a session that may still be
    /// instantiating. Stops early if instantiation fails.
    pub async fn run_session<S: FrameScheduler>(
        &self,
        session: &mut HostSession,
        scheduler: &mut S,
    ) -> FrameReport {
        let mut report = FrameReport::default();
        while scheduler.next_frame().await {
            let outcome = self.session_frame(session);
            let unavailable = session.failure().is_some();
            report.record(outcome);
            if unavailable {
                break;
            }
        }
        tracing::info!(surface = %self.surface_id, ?report, "frame loop finished");
        report
    }
}
