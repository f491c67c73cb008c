use anyhow::Result;
use vmask_vision::{compute_placement, FaceBox, FeatureKind, FeatureSpec};

const EPS: f32 = 1e-3;

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < EPS
}

fn faces() -> Vec<FaceBox> {
    vec![
        FaceBox::new(0.0, 0.0, 100.0, 100.0),
        FaceBox::new(212.5, 80.0, 160.0, 210.0),
        FaceBox::new(-30.0, 400.0, 64.0, 48.0),
    ]
}

/// Default settings put the nose in the middle of the box at a fifth of its size.
#[test]
fn test_default_nose_placement() -> Result<()> {
    let spec = FeatureSpec::default();
    for face in faces() {
        let p = compute_placement(face, FeatureKind::Nose, &spec);
        assert!(close(p.center_x, face.left + 0.5 * face.width));
        assert!(close(p.center_y, face.top + 0.5 * face.height));
        assert!(close(p.draw_width, 0.2 * face.width));
        assert!(close(p.draw_height, 0.2 * face.height));
        assert_eq!(p.rotation_degrees, 0.0);
    }
    Ok(())
}

#[test]
fn test_offset_shifts_center_linearly() -> Result<()> {
    for face in faces() {
        for kind in FeatureKind::ALL {
            let base = FeatureSpec {
                offset_x: 0.05,
                offset_y: -0.1,
                scale_width: 1.3,
                ..FeatureSpec::default()
            };
            let before = compute_placement(face, kind, &base);

            for delta in [-0.25f32, 0.01, 0.4] {
                let moved = FeatureSpec {
                    offset_x: base.offset_x + delta,
                    ..base
                };
                let after = compute_placement(face, kind, &moved);
                assert!(close(after.center_x - before.center_x, delta * face.width));
                // Nothing else moves.
                assert_eq!(after.center_y, before.center_y);
                assert_eq!(after.draw_width, before.draw_width);
                assert_eq!(after.draw_height, before.draw_height);

                let lowered = FeatureSpec {
                    offset_y: base.offset_y + delta,
                    ..base
                };
                let after = compute_placement(face, kind, &lowered);
                assert!(close(after.center_y - before.center_y, delta * face.height));
                assert_eq!(after.center_x, before.center_x);
            }
        }
    }
    Ok(())
}

#[test]
fn test_scale_is_separable() -> Result<()> {
    let face = FaceBox::new(50.0, 60.0, 120.0, 150.0);
    let base = FeatureSpec {
        rotation_degrees: 12.0,
        ..FeatureSpec::default()
    };

    for kind in FeatureKind::ALL {
        let before = compute_placement(face, kind, &base);
        for k in [0.5f32, 2.0, 2.75] {
            let wide = FeatureSpec {
                scale_width: base.scale_width * k,
                ..base
            };
            let after = compute_placement(face, kind, &wide);
            assert!(close(after.draw_width, before.draw_width * k));
            assert_eq!(after.draw_height, before.draw_height);
            assert_eq!(after.center_x, before.center_x);
            assert_eq!(after.center_y, before.center_y);
            assert_eq!(after.rotation_degrees, 12.0);

            let tall = FeatureSpec {
                scale_height: base.scale_height * k,
                ..base
            };
            let after = compute_placement(face, kind, &tall);
            assert!(close(after.draw_height, before.draw_height * k));
            assert_eq!(after.draw_width, before.draw_width);
        }
    }
    Ok(())
}

#[test]
fn test_hat_sits_above_the_eyes() -> Result<()> {
    let face = FaceBox::new(10.0, 20.0, 200.0, 200.0);
    let spec = FeatureSpec::default();
    let hat = compute_placement(face, FeatureKind::Hat, &spec);
    let left = compute_placement(face, FeatureKind::LeftEye, &spec);
    let right = compute_placement(face, FeatureKind::RightEye, &spec);
    let mouth = compute_placement(face, FeatureKind::Mouth, &spec);

    assert!(close(hat.center_y, 40.0));
    assert!(hat.center_y < left.center_y);
    assert!(close(left.center_y, right.center_y));
    assert!(close(right.center_x - left.center_x, 0.4 * face.width));
    assert!(close(mouth.center_y, 160.0));
    println!("✓ anchors ordered top to bottom: hat, eyes, mouth");
    Ok(())
}
