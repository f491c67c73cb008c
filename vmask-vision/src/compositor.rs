//! Feature placement and drawing.
//!
//! Each decorative feature sits at a fixed anchor inside the face box, is
//! sized relative to the box, and can be nudged, scaled and rotated by the
//! user. [`compute_placement`] is the pure mapping; [`render`] turns one
//! placement into drawing calls on a [`Surface`].

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use image::RgbaImage;

use crate::face::FaceBox;
use crate::surface::{Color, Surface};

/// Nominal feature size as a fraction of the face box, on both axes.
pub const BASE_SIZE_RATIO: f32 = 0.2;

pub const FEATURE_FALLBACK: Color = Color::rgba(255, 0, 0, 0.5);
pub const HAT_FALLBACK: Color = Color::rgba(0, 0, 255, 0.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    LeftEye,
    RightEye,
    Nose,
    Mouth,
    Hat,
}

impl FeatureKind {
    /// Draw order; later kinds paint over earlier ones.
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::LeftEye,
        FeatureKind::RightEye,
        FeatureKind::Nose,
        FeatureKind::Mouth,
        FeatureKind::Hat,
    ];

    /// Nominal center as a fraction of the face box `(x, y)`.
    pub fn anchor(self) -> (f32, f32) {
        match self {
            FeatureKind::LeftEye => (0.3, 0.3),
            FeatureKind::RightEye => (0.7, 0.3),
            FeatureKind::Nose => (0.5, 0.5),
            FeatureKind::Mouth => (0.5, 0.7),
            FeatureKind::Hat => (0.5, 0.1),
        }
    }

    pub fn fallback_color(self) -> Color {
        match self {
            FeatureKind::Hat => HAT_FALLBACK,
            _ => FEATURE_FALLBACK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::LeftEye => "leftEye",
            FeatureKind::RightEye => "rightEye",
            FeatureKind::Nose => "nose",
            FeatureKind::Mouth => "mouth",
            FeatureKind::Hat => "hat",
        }
    }

    /// Position in [`FeatureKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureKind {
    type Err = anyhow::Error;

    /// Accepts `leftEye`, `left-eye`, `left_eye` and other casings.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Ok(match key.as_str() {
            "lefteye" => FeatureKind::LeftEye,
            "righteye" => FeatureKind::RightEye,
            "nose" => FeatureKind::Nose,
            "mouth" => FeatureKind::Mouth,
            "hat" => FeatureKind::Hat,
            _ => bail!("unknown feature {s:?} (expected leftEye, rightEye, nose, mouth or hat)"),
        })
    }
}

/// User-adjustable parameters of one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSpec {
    pub enabled: bool,
    /// Fraction of face width added to the anchor.
    pub offset_x: f32,
    /// Fraction of face height added to the anchor.
    pub offset_y: f32,
    pub scale_width: f32,
    pub scale_height: f32,
    pub rotation_degrees: f32,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            offset_x: 0.0,
            offset_y: 0.0,
            scale_width: 1.0,
            scale_height: 1.0,
            rotation_degrees: 0.0,
        }
    }
}

/// Where and how large one feature is drawn for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementParams {
    pub center_x: f32,
    pub center_y: f32,
    pub draw_width: f32,
    pub draw_height: f32,
    pub rotation_degrees: f32,
}

pub fn compute_placement(face: FaceBox, kind: FeatureKind, spec: &FeatureSpec) -> PlacementParams {
    let (ax, ay) = kind.anchor();
    let base_w = face.width * BASE_SIZE_RATIO;
    let base_h = face.height * BASE_SIZE_RATIO;
    PlacementParams {
        center_x: face.left + face.width * (ax + spec.offset_x),
        center_y: face.top + face.height * (ay + spec.offset_y),
        draw_width: base_w * spec.scale_width,
        draw_height: base_h * spec.scale_height,
        rotation_degrees: spec.rotation_degrees,
    }
}

/// Draw one feature: the image stretched over the placement box when given,
/// otherwise a filled ellipse in `fallback`. The surface transform is
/// restored before returning, also when drawing fails.
pub fn render<S: Surface + ?Sized>(
    surface: &mut S,
    placement: &PlacementParams,
    image: Option<&RgbaImage>,
    fallback: Color,
) -> Result<()> {
    surface.save();
    surface.translate(placement.center_x, placement.center_y);
    surface.rotate(placement.rotation_degrees.to_radians());

    let (w, h) = (placement.draw_width, placement.draw_height);
    let drawn = match image {
        Some(image) => surface.draw_image(image, -w / 2.0, -h / 2.0, w, h),
        None => surface.fill_ellipse(w / 2.0, h / 2.0, fallback),
    };

    surface.restore()?;
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{CommandLog, DrawCommand};

    #[test]
    fn test_anchor_table() {
        let face = FaceBox::new(0.0, 0.0, 1.0, 1.0);
        let spec = FeatureSpec::default();
        let centers: Vec<(f32, f32)> = FeatureKind::ALL
            .iter()
            .map(|&k| {
                let p = compute_placement(face, k, &spec);
                (p.center_x, p.center_y)
            })
            .collect();
        assert_eq!(
            centers,
            vec![(0.3, 0.3), (0.7, 0.3), (0.5, 0.5), (0.5, 0.7), (0.5, 0.1)]
        );
    }

    #[test]
    fn test_feature_kind_names() {
        for kind in FeatureKind::ALL {
            assert_eq!(kind.name().parse::<FeatureKind>().unwrap(), kind);
        }
        assert_eq!("left-eye".parse::<FeatureKind>().unwrap(), FeatureKind::LeftEye);
        assert_eq!("RIGHT_EYE".parse::<FeatureKind>().unwrap(), FeatureKind::RightEye);
        assert!("ear".parse::<FeatureKind>().is_err());
        assert_eq!(FeatureKind::Hat.next(), FeatureKind::LeftEye);
        assert_eq!(FeatureKind::Nose.index(), 2);
    }

    #[test]
    fn test_render_rotation_in_radians() {
        let placement = PlacementParams {
            center_x: 10.0,
            center_y: 20.0,
            draw_width: 8.0,
            draw_height: 4.0,
            rotation_degrees: 90.0,
        };
        let mut log = CommandLog::new();
        render(&mut log, &placement, None, FEATURE_FALLBACK).unwrap();
        match log.commands[2] {
            DrawCommand::Rotate { radians } => {
                assert!((radians - std::f32::consts::FRAC_PI_2).abs() < 1e-6)
            }
            ref other => panic!("expected rotate, got {other:?}"),
        }
    }

    #[test]
    fn test_render_restores_after_failure() {
        let placement = PlacementParams {
            center_x: 0.0,
            center_y: 0.0,
            draw_width: f32::NAN,
            draw_height: 4.0,
            rotation_degrees: 0.0,
        };
        let mut log = CommandLog::new();
        assert!(render(&mut log, &placement, None, HAT_FALLBACK).is_err());
        assert_eq!(log.depth(), 0);
        assert_eq!(log.commands.last(), Some(&DrawCommand::Restore));
        assert_eq!(log.draw_calls(), 0);
    }
}
