use std::path::PathBuf;
use thiserror::Error;

/// Conditions that keep the render loop from starting at all.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("camera {device} unavailable: {reason}")]
    CameraUnavailable { device: String, reason: String },
    #[error("face detector unavailable ({}): {reason}", .model.display())]
    DetectorUnavailable { model: PathBuf, reason: String },
    #[error("cannot open window: {0}")]
    Window(String),
}

impl StartupError {
    pub fn camera(device: &str, err: anyhow::Error) -> Self {
        Self::CameraUnavailable {
            device: device.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub fn detector(model: &std::path::Path, err: anyhow::Error) -> Self {
        Self::DetectorUnavailable {
            model: model.to_path_buf(),
            reason: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_messages_name_the_resource() {
        let err = StartupError::camera(
            "/dev/video3",
            anyhow::anyhow!("no such device").context("open camera /dev/video3"),
        );
        assert_eq!(
            err.to_string(),
            "camera /dev/video3 unavailable: open camera /dev/video3: no such device"
        );

        let err = StartupError::detector(
            Path::new("/opt/yunet.onnx"),
            anyhow::anyhow!("detector model not found at /opt/yunet.onnx"),
        );
        assert_eq!(
            err.to_string(),
            "face detector unavailable (/opt/yunet.onnx): detector model not found at /opt/yunet.onnx"
        );

        assert_eq!(
            StartupError::Window("no display".into()).to_string(),
            "cannot open window: no display"
        );
    }

    #[test]
    fn test_converts_into_anyhow() {
        let err: anyhow::Error = StartupError::Window("x".into()).into();
        assert!(matches!(
            err.downcast_ref::<StartupError>(),
            Some(StartupError::Window(_))
        ));
    }
}
