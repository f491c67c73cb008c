pub mod compositor;
pub mod detector;
pub mod face;
pub mod model;
pub mod surface;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use compositor::{compute_placement, render, FeatureKind, FeatureSpec, PlacementParams};
pub use detector::{Detector, FaceSource};
pub use face::{Detection, FaceBox};
pub use surface::{Color, CommandLog, DrawCommand, RasterSurface, Surface};
pub use video::{Camera, FrameSource};
