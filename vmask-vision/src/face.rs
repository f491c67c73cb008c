use crate::yunet;
use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// Axis-aligned face rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceBox {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union of two boxes.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.left.max(other.left);
        let y1 = self.top.max(other.top);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let inter = (x2 - x1) * (y2 - y1);
        inter / (self.area() + other.area() - inter)
    }
}

/// A scored face box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: FaceBox,
    pub score: f32,
}

/// Mapping between a frame and the square, zero-padded detector input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let max_dim = width.max(height).max(1);
        let scale = size as f32 / max_dim as f32;
        let scaled_width = ((width as f32 * scale) as u32).clamp(1, size);
        let scaled_height = ((height as f32 * scale) as u32).clamp(1, size);
        Self {
            size,
            scale,
            offset_x: (size - scaled_width) / 2,
            offset_y: (size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Resize and pad `frame` into the detector's square canvas.
    pub fn apply(&self, frame: &RgbImage) -> RgbImage {
        let resized = imageops::resize(
            frame,
            self.scaled_width,
            self.scaled_height,
            imageops::FilterType::Triangle,
        );
        let mut canvas = RgbImage::new(self.size, self.size);
        imageops::overlay(
            &mut canvas,
            &resized,
            self.offset_x as i64,
            self.offset_y as i64,
        );
        canvas
    }

    /// Map a box from canvas pixels back to frame pixels.
    pub fn unmap(&self, b: &FaceBox) -> FaceBox {
        FaceBox {
            left: (b.left - self.offset_x as f32) / self.scale,
            top: (b.top - self.offset_y as f32) / self.scale,
            width: b.width / self.scale,
            height: b.height / self.scale,
        }
    }
}

/// Pack an RGB canvas into the NCHW BGR float tensor YuNet expects.
fn to_bgr_tensor(canvas: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = canvas.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    let (b_plane, rest) = data.split_at_mut(plane);
    let (g_plane, r_plane) = rest.split_at_mut(plane);

    for (i, px) in canvas.pixels().enumerate() {
        r_plane[i] = px[0] as f32;
        g_plane[i] = px[1] as f32;
        b_plane[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec(
        (1, 3, h as usize, w as usize),
        data,
    )?)
}

/// Detect faces in a frame using the YuNet detector
pub fn detect_faces(
    session: &mut Session,
    frame: &RgbImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (width, height) = frame.dimensions();
    let letterbox = Letterbox::fit(width, height, yunet::INPUT_SIZE);
    let canvas = letterbox.apply(frame);

    let input_tensor = Value::from_array(to_bgr_tensor(&canvas)?)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        output_data.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let output_refs: Vec<(&[i64], &[f32])> = output_data
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let scales = yunet::parse_outputs(&output_refs, yunet::INPUT_SIZE as usize)?;
    let raw = yunet::decode(&scales, score_threshold);
    log::debug!(
        "yunet: {} candidates above {:.2} in {}x{} frame",
        raw.len(),
        score_threshold,
        width,
        height
    );

    let mut detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| Detection {
            bbox: letterbox.unmap(&d.bbox),
            score: d.score,
        })
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }

    Ok(detections)
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}
