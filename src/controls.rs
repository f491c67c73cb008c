//! User-adjustable feature state.
//!
//! The [`ControlPanel`] is the only mutable copy of the feature settings. The
//! render loop never reads it directly; it works on a [`Snapshot`] taken once
//! per tick.

use anyhow::{Context, Result};
use image::RgbaImage;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use vmask_vision::{FeatureKind, FeatureSpec};

use crate::config::Config;

pub type ImageHandle = Arc<RgbaImage>;

/// What the hat slot shows.
#[derive(Debug, Clone, Default)]
pub enum HatVisual {
    #[default]
    Default,
    Custom(ImageHandle),
}

/// One numeric control of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Height,
    Width,
    X,
    Y,
    Rotation,
}

impl Control {
    pub const ALL: [Control; 5] = [
        Control::Height,
        Control::Width,
        Control::X,
        Control::Y,
        Control::Rotation,
    ];

    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            Control::Height | Control::Width => 0.1..=3.0,
            Control::X | Control::Y => -0.5..=0.5,
            Control::Rotation => -180.0..=180.0,
        }
    }

    pub fn step(self) -> f32 {
        match self {
            Control::Height | Control::Width => 0.05,
            Control::X | Control::Y => 0.01,
            Control::Rotation => 1.0,
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            Control::Height | Control::Width => 1.0,
            Control::X | Control::Y | Control::Rotation => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Control::Height => "height",
            Control::Width => "width",
            Control::X => "x",
            Control::Y => "y",
            Control::Rotation => "rotation",
        }
    }

    pub fn get(self, spec: &FeatureSpec) -> f32 {
        match self {
            Control::Height => spec.scale_height,
            Control::Width => spec.scale_width,
            Control::X => spec.offset_x,
            Control::Y => spec.offset_y,
            Control::Rotation => spec.rotation_degrees,
        }
    }

    fn put(self, spec: &mut FeatureSpec, value: f32) {
        let slot = match self {
            Control::Height => &mut spec.scale_height,
            Control::Width => &mut spec.scale_width,
            Control::X => &mut spec.offset_x,
            Control::Y => &mut spec.offset_y,
            Control::Rotation => &mut spec.rotation_degrees,
        };
        *slot = value;
    }

    fn clamp(self, value: f32) -> f32 {
        let range = self.range();
        value.clamp(*range.start(), *range.end())
    }
}

/// `kind=path`, as given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAssignment {
    pub kind: FeatureKind,
    pub path: PathBuf,
}

impl FromStr for ImageAssignment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, path) = s
            .split_once('=')
            .with_context(|| format!("expected kind=path, got {s:?}"))?;
        if path.is_empty() {
            anyhow::bail!("missing image path for {kind}");
        }
        Ok(Self {
            kind: kind.trim().parse()?,
            path: PathBuf::from(path),
        })
    }
}

/// Immutable view of every feature's settings and image for one tick.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    specs: [FeatureSpec; 5],
    images: [Option<ImageHandle>; 5],
}

impl Snapshot {
    pub fn spec(&self, kind: FeatureKind) -> &FeatureSpec {
        &self.specs[kind.index()]
    }

    /// The image to draw for `kind`, or `None` for the fallback shape.
    pub fn image(&self, kind: FeatureKind) -> Option<&RgbaImage> {
        self.images[kind.index()].as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControlPanel {
    specs: [FeatureSpec; 5],
    /// Custom images for the four facial features; the hat lives in `hat`.
    images: [Option<ImageHandle>; 4],
    hat: HatVisual,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial settings from the config file. Images are not loaded here.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut panel = Self::new();
        for (kind, feature) in cfg.features()? {
            let mut spec = feature.spec();
            for control in Control::ALL {
                let value = control.get(&spec);
                control.put(&mut spec, control.clamp(value));
            }
            panel.specs[kind.index()] = spec;
        }
        Ok(panel)
    }

    pub fn spec(&self, kind: FeatureKind) -> &FeatureSpec {
        &self.specs[kind.index()]
    }

    pub fn get(&self, kind: FeatureKind, control: Control) -> f32 {
        control.get(self.spec(kind))
    }

    /// Set a control, clamped to its range. Returns the stored value.
    pub fn set(&mut self, kind: FeatureKind, control: Control, value: f32) -> f32 {
        let value = if value.is_finite() {
            control.clamp(value)
        } else {
            log::warn!("ignoring non-finite {} for {}", control.label(), kind);
            self.get(kind, control)
        };
        control.put(&mut self.specs[kind.index()], value);
        value
    }

    /// Nudge a control by a whole number of its steps.
    pub fn step(&mut self, kind: FeatureKind, control: Control, steps: i32) -> f32 {
        let current = self.get(kind, control);
        self.set(kind, control, current + control.step() * steps as f32)
    }

    pub fn set_enabled(&mut self, kind: FeatureKind, enabled: bool) {
        self.specs[kind.index()].enabled = enabled;
    }

    pub fn toggle_enabled(&mut self, kind: FeatureKind) -> bool {
        let spec = &mut self.specs[kind.index()];
        spec.enabled = !spec.enabled;
        spec.enabled
    }

    /// Every numeric control of every feature back to its default.
    /// Enabled flags and images are left alone.
    pub fn reset_all(&mut self) {
        for spec in &mut self.specs {
            for control in Control::ALL {
                control.put(spec, control.default_value());
            }
        }
        log::debug!("all feature controls reset");
    }

    /// Associate a decoded image with a feature. A hat image also selects it.
    pub fn set_image(&mut self, kind: FeatureKind, image: RgbaImage) {
        let handle = Arc::new(image);
        match kind {
            FeatureKind::Hat => self.hat = HatVisual::Custom(handle),
            _ => self.images[kind.index()] = Some(handle),
        }
    }

    /// Load an image file for a feature. `None` is a no-op; on a decode
    /// error the previous image stays in place. Returns whether an image was set.
    pub fn upload(&mut self, kind: FeatureKind, path: Option<&Path>) -> Result<bool> {
        let Some(path) = path else {
            return Ok(false);
        };
        let image = image::open(path)
            .with_context(|| format!("loading {} image {}", kind, path.display()))?
            .to_rgba8();
        log::info!(
            "{} image loaded from {} ({}x{})",
            kind,
            path.display(),
            image.width(),
            image.height()
        );
        self.set_image(kind, image);
        Ok(true)
    }

    pub fn image(&self, kind: FeatureKind) -> Option<&ImageHandle> {
        match (kind, &self.hat) {
            (FeatureKind::Hat, HatVisual::Custom(handle)) => Some(handle),
            (FeatureKind::Hat, HatVisual::Default) => None,
            _ => self.images[kind.index()].as_ref(),
        }
    }

    pub fn hat(&self) -> &HatVisual {
        &self.hat
    }

    /// Go back to the built-in hat shape.
    pub fn use_default_hat(&mut self) {
        self.hat = HatVisual::Default;
    }

    /// Display text for a control's current value.
    pub fn readout(&self, kind: FeatureKind, control: Control) -> String {
        let value = self.get(kind, control);
        match control {
            Control::Rotation => format!("{value:.0}°"),
            _ => format!("{value:.2}"),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            specs: self.specs,
            images: FeatureKind::ALL.map(|kind| self.image(kind).cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn scrambled() -> ControlPanel {
        let mut panel = ControlPanel::new();
        for (i, kind) in FeatureKind::ALL.into_iter().enumerate() {
            let n = i as f32 + 1.0;
            panel.set(kind, Control::Height, 0.5 * n);
            panel.set(kind, Control::Width, 0.3 * n);
            panel.set(kind, Control::X, -0.1 * n);
            panel.set(kind, Control::Y, 0.05 * n);
            panel.set(kind, Control::Rotation, 30.0 * n);
        }
        panel.set_enabled(FeatureKind::Mouth, false);
        panel
    }

    #[test]
    fn test_reset_all_restores_defaults() {
        let mut panel = scrambled();
        panel.set_image(FeatureKind::Nose, RgbaImage::new(2, 2));
        panel.reset_all();

        for kind in FeatureKind::ALL {
            assert_eq!(panel.get(kind, Control::Height), 1.0);
            assert_eq!(panel.get(kind, Control::Width), 1.0);
            assert_eq!(panel.get(kind, Control::X), 0.0);
            assert_eq!(panel.get(kind, Control::Y), 0.0);
            assert_eq!(panel.get(kind, Control::Rotation), 0.0);
        }
        // Toggles and images are not part of the reset.
        assert!(!panel.spec(FeatureKind::Mouth).enabled);
        assert!(panel.image(FeatureKind::Nose).is_some());
        assert_eq!(panel.readout(FeatureKind::Hat, Control::Width), "1.00");
        assert_eq!(panel.readout(FeatureKind::Hat, Control::Rotation), "0°");
    }

    #[test]
    fn test_set_clamps_and_steps() {
        let mut panel = ControlPanel::new();
        assert_eq!(panel.set(FeatureKind::Nose, Control::X, 3.0), 0.5);
        assert_eq!(panel.set(FeatureKind::Nose, Control::Width, 0.0), 0.1);
        assert_eq!(panel.set(FeatureKind::Nose, Control::Rotation, -720.0), -180.0);
        assert_eq!(panel.set(FeatureKind::Nose, Control::Rotation, f32::NAN), -180.0);

        let v = panel.step(FeatureKind::Hat, Control::Height, 4);
        assert!((v - 1.2).abs() < 1e-6);
        let v = panel.step(FeatureKind::Hat, Control::Rotation, -3);
        assert_eq!(v, -3.0);
    }

    #[test]
    fn test_hat_visual_selection() {
        let mut panel = ControlPanel::new();
        assert!(matches!(panel.hat(), HatVisual::Default));
        assert!(panel.snapshot().image(FeatureKind::Hat).is_none());

        panel.set_image(FeatureKind::Hat, RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255])));
        assert!(matches!(panel.hat(), HatVisual::Custom(_)));
        assert_eq!(
            panel.snapshot().image(FeatureKind::Hat).map(|i| i.dimensions()),
            Some((3, 3))
        );

        panel.use_default_hat();
        assert!(panel.snapshot().image(FeatureKind::Hat).is_none());
    }

    #[test]
    fn test_upload_without_file_keeps_image() {
        let mut panel = ControlPanel::new();
        panel.set_image(FeatureKind::LeftEye, RgbaImage::new(5, 4));

        assert!(!panel.upload(FeatureKind::LeftEye, None).unwrap());
        assert!(panel
            .upload(FeatureKind::LeftEye, Some(Path::new("/nonexistent/eye.png")))
            .is_err());
        assert_eq!(
            panel.image(FeatureKind::LeftEye).map(|i| i.dimensions()),
            Some((5, 4))
        );
    }

    #[test]
    fn test_upload_from_file() {
        let path = std::env::temp_dir().join(format!("vmask-upload-{}.png", std::process::id()));
        RgbaImage::from_pixel(6, 2, Rgba([0, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let mut panel = ControlPanel::new();
        assert!(panel.upload(FeatureKind::Hat, Some(&path)).unwrap());
        assert!(matches!(panel.hat(), HatVisual::Custom(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut panel = ControlPanel::new();
        let before = panel.snapshot();
        panel.set(FeatureKind::Nose, Control::Width, 2.0);
        panel.set_enabled(FeatureKind::Nose, false);
        assert_eq!(before.spec(FeatureKind::Nose), &FeatureSpec::default());
        assert_eq!(panel.snapshot().spec(FeatureKind::Nose).scale_width, 2.0);
    }

    #[test]
    fn test_image_assignment() {
        let a: ImageAssignment = "rightEye=/tmp/eye.png".parse().unwrap();
        assert_eq!(a.kind, FeatureKind::RightEye);
        assert_eq!(a.path, PathBuf::from("/tmp/eye.png"));
        assert!("nose".parse::<ImageAssignment>().is_err());
        assert!("nose=".parse::<ImageAssignment>().is_err());
        assert!("chin=/tmp/x.png".parse::<ImageAssignment>().is_err());
    }

    #[test]
    fn test_from_config_clamps() {
        let mut cfg = Config::default();
        cfg.features.get_mut("mouth").unwrap().width = 9.0;
        cfg.features.get_mut("mouth").unwrap().enabled = false;
        let panel = ControlPanel::from_config(&cfg).unwrap();
        assert_eq!(panel.get(FeatureKind::Mouth, Control::Width), 3.0);
        assert!(!panel.spec(FeatureKind::Mouth).enabled);
        assert!(panel.spec(FeatureKind::Nose).enabled);
    }
}
