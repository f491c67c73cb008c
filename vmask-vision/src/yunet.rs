//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: every cell of the stride 8/16/32 grids predicts a
//! box directly. The 2023mar export emits twelve tensors in this order:
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32,
//! kps_8, kps_16, kps_32`. Only boxes are decoded here; the landmark heads
//! are ignored.
//!
//! For grid cell `(row, col)` at stride `s`:
//! ```text
//! cx = (col + dx) * s        w = exp(dw) * s
//! cy = (row + dy) * s        h = exp(dh) * s
//! score = sqrt(clamp(cls) * clamp(obj))
//! ```

use anyhow::{bail, Result};
use ndarray::Array2;

use crate::face::{Detection, FaceBox};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Side of the square detector input.
pub const INPUT_SIZE: u32 = 640;

/// Raw head outputs for one stride.
#[derive(Debug, Clone)]
pub struct ScaleOutput {
    pub stride: usize,
    /// Cells per grid row.
    pub grid: usize,
    pub cls: Array2<f32>,
    pub obj: Array2<f32>,
    pub bbox: Array2<f32>,
}

fn tensor(
    outputs: &[(&[i64], &[f32])],
    index: usize,
    name: &str,
    cells: usize,
    channels: usize,
) -> Result<Array2<f32>> {
    let Some((shape, data)) = outputs.get(index) else {
        bail!("Missing {} output at index {}", name, index);
    };
    let expected = [1, cells as i64, channels as i64];
    if shape[..] != expected[..] {
        bail!(
            "Unexpected {} shape at index {}: {:?}, expected {:?}",
            name,
            index,
            shape,
            expected
        );
    }
    Ok(Array2::from_shape_vec((cells, channels), data.to_vec())?)
}

/// Split the flat model outputs into per-stride tensors, checking shapes.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<ScaleOutput>> {
    if outputs.len() < 9 {
        bail!("YuNet produced {} outputs, expected at least 9", outputs.len());
    }

    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let grid = input_size / stride;
            let cells = grid * grid;
            Ok(ScaleOutput {
                stride,
                grid,
                cls: tensor(outputs, i, "cls", cells, 1)?,
                obj: tensor(outputs, i + 3, "obj", cells, 1)?,
                bbox: tensor(outputs, i + 6, "bbox", cells, 4)?,
            })
        })
        .collect()
}

/// Decode every grid cell scoring at least `score_threshold` into a box in
/// detector-input pixels.
pub fn decode(scales: &[ScaleOutput], score_threshold: f32) -> Vec<Detection> {
    let mut detections = Vec::new();

    for scale in scales {
        let stride = scale.stride as f32;
        for row in 0..scale.grid {
            for col in 0..scale.grid {
                let idx = row * scale.grid + col;
                let cls = scale.cls[[idx, 0]].clamp(0.0, 1.0);
                let obj = scale.obj[[idx, 0]].clamp(0.0, 1.0);
                let score = (cls * obj).sqrt();
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + scale.bbox[[idx, 0]]) * stride;
                let cy = (row as f32 + scale.bbox[[idx, 1]]) * stride;
                let w = scale.bbox[[idx, 2]].exp() * stride;
                let h = scale.bbox[[idx, 3]].exp() * stride;

                detections.push(Detection {
                    bbox: FaceBox::new(cx - w / 2.0, cy - h / 2.0, w, h),
                    score,
                });
            }
        }
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_scale(stride: usize, input_size: usize) -> ScaleOutput {
        let grid = input_size / stride;
        let cells = grid * grid;
        ScaleOutput {
            stride,
            grid,
            cls: Array2::zeros((cells, 1)),
            obj: Array2::zeros((cells, 1)),
            bbox: Array2::zeros((cells, 4)),
        }
    }

    #[test]
    fn test_decode_single_cell() {
        let input_size = 640;
        let mut scales: Vec<ScaleOutput> = STRIDES
            .iter()
            .map(|&s| empty_scale(s, input_size))
            .collect();

        // One confident cell on the stride-32 grid at (row 10, col 10).
        let s32 = &mut scales[2];
        let idx = 10 * s32.grid + 10;
        s32.cls[[idx, 0]] = 0.81;
        s32.obj[[idx, 0]] = 1.0;
        s32.bbox[[idx, 0]] = 0.5;
        s32.bbox[[idx, 1]] = 0.25;
        s32.bbox[[idx, 2]] = 4.0f32.ln();
        s32.bbox[[idx, 3]] = 4.0f32.ln();

        let detections = decode(&scales, 0.5);
        assert_eq!(detections.len(), 1);
        let d = &detections[0];

        // cx = 10.5 * 32 = 336, cy = 10.25 * 32 = 328, w = h = 4 * 32 = 128
        assert!((d.score - 0.9).abs() < 1e-5);
        assert!((d.bbox.left - 272.0).abs() < 1e-3);
        assert!((d.bbox.top - 264.0).abs() < 1e-3);
        assert!((d.bbox.width - 128.0).abs() < 1e-3);
        assert!((d.bbox.height - 128.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_clamps_scores() {
        let mut scale = empty_scale(32, 64);
        scale.cls[[0, 0]] = 1.7;
        scale.obj[[0, 0]] = -0.2;
        assert!(decode(&[scale], 0.1).is_empty());
    }

    #[test]
    fn test_parse_outputs_shapes() {
        let input_size = 64;
        let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for channels in [1usize, 1, 4, 10] {
            for stride in STRIDES {
                let cells = (input_size / stride) * (input_size / stride);
                owned.push((vec![1, cells as i64, channels as i64], vec![0.0; cells * channels]));
            }
        }
        let refs: Vec<(&[i64], &[f32])> = owned
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let scales = parse_outputs(&refs, input_size).unwrap();
        assert_eq!(scales.len(), 3);
        assert_eq!(scales[0].grid, 8);
        assert_eq!(scales[2].bbox.shape(), &[4, 4]);

        // A wrong bbox channel count is rejected.
        let wrong_shape = [1i64, 64, 5];
        let mut bad = refs.clone();
        bad[6] = (&wrong_shape[..], refs[6].1);
        assert!(parse_outputs(&bad, input_size).is_err());
    }
}
