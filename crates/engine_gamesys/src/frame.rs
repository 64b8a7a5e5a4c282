//! Fixed-rate frame loop.
//!
//! Drives a root collection through its update, render and post-update
//! passes once per frame, sleeping off whatever is left of the frame budget.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collection::{Collection, UpdateContext};

/// Configuration for the frame loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target frames per second.
    pub tick_rate: f64,
    /// Maximum number of frames to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Duration of one frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(f64::EPSILON))
    }
}

/// Runs a root collection at a fixed rate.
pub struct FrameLoop {
    frame: u64,
    config: TickConfig,
    root: Box<dyn Collection>,
    failed_frames: u64,
}

impl FrameLoop {
    /// Create a frame loop over `root`, running its init pass.
    #[must_use]
    pub fn new(config: TickConfig, mut root: Box<dyn Collection>) -> Self {
        root.init();
        Self {
            frame: 0,
            config,
            root,
            failed_frames: 0,
        }
    }

    /// Frames run so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Frames in which a pass reported a failure.
    #[must_use]
    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }

    /// The root collection.
    #[must_use]
    pub fn root(&self) -> &dyn Collection {
        self.root.as_ref()
    }

    /// Mutable access to the root collection.
    pub fn root_mut(&mut self) -> &mut dyn Collection {
        self.root.as_mut()
    }

    /// Run one frame with delta `dt` seconds. Returns `false` if any pass
    /// failed.
    pub fn tick(&mut self, dt: f32) -> bool {
        let ctx = UpdateContext::new(dt, self.frame);
        let updated = self.root.update(&ctx);
        let rendered = self.root.render();
        let post_updated = self.root.post_update();
        self.frame += 1;

        let ok = updated && rendered && post_updated;
        if !ok {
            self.failed_frames += 1;
            debug!(frame = ctx.frame, updated, rendered, post_updated, "frame reported failures");
        }
        ok
    }

    /// Run the loop for the configured number of frames, or indefinitely.
    pub fn run(&mut self) {
        self.run_with(|_| {});
    }

    /// Like [`FrameLoop::run`], calling `after_frame` with the frame number
    /// once each frame's passes are done.
    pub fn run_with(&mut self, mut after_frame: impl FnMut(u64)) {
        let frame_duration = self.config.frame_duration();
        let dt = frame_duration.as_secs_f32();
        let mut frame_count = 0u64;

        info!(
            collection = self.root.name(),
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting frame loop"
        );

        loop {
            let start = Instant::now();
            self.tick(dt);
            after_frame(self.frame - 1);

            frame_count += 1;
            if self.config.max_ticks > 0 && frame_count >= self.config.max_ticks {
                info!(frames = frame_count, failed = self.failed_frames, "frame loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            } else {
                warn!(
                    frame = self.frame,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = frame_duration.as_millis() as u64,
                    "frame exceeded time budget"
                );
            }
        }
    }

    /// Run the final pass and hand the root collection back.
    pub fn finish(mut self) -> Box<dyn Collection> {
        self.root.finalize();
        self.root
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("frame", &self.frame)
            .field("config", &self.config)
            .field("root", &self.root.name())
            .finish_non_exhaustive()
    }
}
