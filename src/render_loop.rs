//! Per-frame driver: clear, detect, place, draw.

use anyhow::{bail, Result};
use image::RgbImage;
use std::time::{Duration, Instant};
use vmask_vision::{
    compute_placement, render, FaceSource, FeatureKind, FrameSource, RasterSurface, Surface,
};

use crate::controls::{ControlPanel, Snapshot};
use crate::display::Preview;
use crate::smoothing::Smoother;

/// Consecutive failed captures after which the preview gives up on the camera.
pub const MAX_CAPTURE_FAILURES: u32 = 25;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub faces: usize,
    /// Features drawn successfully.
    pub drawn: usize,
    /// Features whose draw call failed.
    pub failed: usize,
    pub detection_failed: bool,
}

pub struct RenderLoop<F> {
    source: F,
    smoother: Smoother,
    ticks: u64,
}

impl<F: FaceSource> RenderLoop<F> {
    pub fn new(source: F, smoothing_threshold: f32) -> Self {
        Self {
            source,
            smoother: Smoother::new(smoothing_threshold),
            ticks: 0,
        }
    }

    pub fn source_mut(&mut self) -> &mut F {
        &mut self.source
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one tick against `surface`. Never fails: a detection error skips
    /// the drawing for this tick and a failing feature is skipped on its own.
    pub fn tick<S: Surface + ?Sized>(
        &mut self,
        frame: &RgbImage,
        surface: &mut S,
        snapshot: &Snapshot,
    ) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();
        surface.clear();

        let faces = match self.source.detect(frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("tick {}: face detection failed: {:#}", self.ticks, e);
                self.smoother.reset();
                report.detection_failed = true;
                return report;
            }
        };
        report.faces = faces.len();
        self.smoother.begin_tick(faces.len());

        for (index, face) in faces.iter().enumerate() {
            for kind in FeatureKind::ALL {
                let spec = snapshot.spec(kind);
                if !spec.enabled {
                    continue;
                }
                let placement = compute_placement(*face, kind, spec);
                let placement = self.smoother.apply(index, kind, face, placement);

                match render(surface, &placement, snapshot.image(kind), kind.fallback_color()) {
                    Ok(()) => report.drawn += 1,
                    Err(e) => {
                        log::warn!("face {} {}: draw failed: {:#}", index, kind, e);
                        report.failed += 1;
                    }
                }
            }
        }

        log::debug!(
            "tick {}: {} face(s), {} feature(s) drawn",
            self.ticks,
            report.faces,
            report.drawn
        );
        report
    }

    /// Tick onto the raster overlay and blend it into `frame` in place.
    pub fn compose(
        &mut self,
        frame: &mut RgbImage,
        overlay: &mut RasterSurface,
        snapshot: &Snapshot,
    ) -> Result<TickReport> {
        if overlay.dimensions() != frame.dimensions() {
            let (w, h) = frame.dimensions();
            log::debug!("resizing overlay to {}x{}", w, h);
            *overlay = RasterSurface::new(w, h);
        }
        let report = self.tick(frame, overlay, snapshot);
        overlay.composite_onto(frame)?;
        Ok(report)
    }
}

/// Drive the preview until it is closed: capture, compose, present, pace.
///
/// A failed capture skips the tick but still refreshes the preview, showing
/// the last good frame if there is one, so it keeps handling input. After
/// [`MAX_CAPTURE_FAILURES`] failures in a row the camera is considered gone.
pub fn run_preview<C, F, P>(
    camera: &mut C,
    render_loop: &mut RenderLoop<F>,
    preview: &mut P,
    panel: &mut ControlPanel,
    pacer: &mut Pacer,
) -> Result<()>
where
    C: FrameSource + ?Sized,
    F: FaceSource,
    P: Preview + ?Sized,
{
    let mut overlay = RasterSurface::new(0, 0);
    let mut last_frame: Option<RgbImage> = None;
    let mut failures = 0;

    while preview.is_open() {
        preview.handle_input(panel);

        match camera.frame() {
            Ok(mut frame) => {
                failures = 0;
                let report = render_loop.compose(&mut frame, &mut overlay, &panel.snapshot())?;
                if report.failed > 0 {
                    log::warn!("{} feature(s) failed to draw", report.failed);
                }
                preview.present(&frame)?;
                last_frame = Some(frame);
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_CAPTURE_FAILURES {
                    bail!("camera gave no frame {} times in a row: {:#}", failures, e);
                }
                log::warn!("skipping tick: {:#}", e);
                match &last_frame {
                    Some(frame) => preview.present(frame)?,
                    None => preview.idle(),
                }
            }
        }

        pacer.wait();
    }
    Ok(())
}

/// Fixed minimum spacing between ticks. Ticks are chained, so a slow
/// detection simply delays the next one; two never overlap.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    started: Instant,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
        }
    }

    /// Time left in the current interval as of `now`.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Sleep out the rest of the interval and start the next one.
    pub fn wait(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.started = Instant::now();
    }
}
