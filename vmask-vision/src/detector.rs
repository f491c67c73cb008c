use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::Session;
use std::path::Path;

use crate::face::{self, FaceBox};

/// Anything that can report the faces visible in a frame.
///
/// Implementations may keep state between frames, hence `&mut self`. An
/// `Err` means detection failed for this frame only; callers are expected to
/// try again on the next one.
pub trait FaceSource {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>>;
}

impl<F: FaceSource + ?Sized> FaceSource for Box<F> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>> {
        (**self).detect(frame)
    }
}

/// YuNet-backed face source
pub struct Detector {
    pub session: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Detector {
    pub fn open(model: &Path, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        Ok(Self {
            session: crate::model::detector_session(model)?,
            score_threshold,
            nms_threshold,
        })
    }
}

impl FaceSource for Detector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>> {
        let detections = face::detect_faces(
            &mut self.session,
            frame,
            self.score_threshold,
            self.nms_threshold,
        )
        .context("detecting faces")?;
        Ok(detections.into_iter().map(|d| d.bbox).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_an_error() {
        let err = Detector::open(Path::new("/nonexistent/yunet.onnx"), 0.6, 0.3)
            .err()
            .expect("opening a missing model must fail");
        assert!(err.to_string().contains("not found"));
    }
}
