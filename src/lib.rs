pub mod config;
pub mod controls;
pub mod display;
pub mod error;
pub mod render_loop;
pub mod smoothing;

// Re-export vision types for convenience
pub use vmask_vision::{
    compositor, face, surface, video, Camera, Detector, FaceBox, FaceSource, FeatureKind,
    FeatureSpec, FrameSource, RasterSurface,
};
