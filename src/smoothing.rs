use std::collections::HashMap;
use vmask_vision::{FaceBox, FeatureKind, PlacementParams};

/// Suppresses small frame-to-frame jitter in feature centers.
///
/// A new center coordinate only replaces the previous one when it moved by
/// more than `threshold` times the face size on that axis. Sizes and
/// rotation pass through untouched. Faces are matched by their index in the
/// detector output, so the cache is dropped whenever the face count changes.
#[derive(Debug, Default)]
pub struct Smoother {
    threshold: f32,
    faces: usize,
    last: HashMap<(usize, FeatureKind), (f32, f32)>,
}

impl Smoother {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold > 0.0
    }

    /// Call once per tick with the number of detected faces.
    pub fn begin_tick(&mut self, faces: usize) {
        if faces != self.faces {
            self.last.clear();
            self.faces = faces;
        }
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }

    pub fn apply(
        &mut self,
        face_index: usize,
        kind: FeatureKind,
        face: &FaceBox,
        placement: PlacementParams,
    ) -> PlacementParams {
        if !self.is_enabled() {
            return placement;
        }

        let key = (face_index, kind);
        let (x, y) = match self.last.get(&key) {
            Some(&(px, py)) => (
                pick(placement.center_x, px, self.threshold * face.width),
                pick(placement.center_y, py, self.threshold * face.height),
            ),
            None => (placement.center_x, placement.center_y),
        };
        self.last.insert(key, (x, y));

        PlacementParams {
            center_x: x,
            center_y: y,
            ..placement
        }
    }
}

fn pick(current: f32, previous: f32, min_move: f32) -> f32 {
    if (current - previous).abs() > min_move {
        current
    } else {
        previous
    }
}
