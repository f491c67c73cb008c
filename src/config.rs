use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vmask_vision::{FeatureKind, FeatureSpec};

const SYSTEM_CONFIG: &str = "/usr/local/etc/vmask/config.toml";

/// Build-time override first, then the per-user config dir if it already has
/// a config, then the system-wide location.
pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("VMASK_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    directories::ProjectDirs::from("", "", "vmask")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG))
});

pub static MODEL_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("VMASK_MODEL_PATH")
            .unwrap_or("/usr/local/share/vmask/face_detection_yunet_2023mar.onnx"),
    )
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    pub model: PathBuf,
    /// Minimum time between two ticks of the render loop.
    pub detection_interval_ms: u64,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Fraction of the face size below which feature movement is ignored. 0 disables.
    pub smoothing_threshold: f32,
    /// Initial feature settings keyed by feature name (`leftEye`, `hat`, ...).
    pub features: BTreeMap<String, FeatureConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            model: MODEL_PATH.to_path_buf(),
            detection_interval_ms: 200,
            score_threshold: 0.6,
            nms_threshold: 0.3,
            smoothing_threshold: 0.0,
            features: FeatureKind::ALL
                .iter()
                .map(|k| (k.name().to_string(), FeatureConfig::default()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub enabled: bool,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let spec = FeatureSpec::default();
        Self {
            enabled: spec.enabled,
            x: spec.offset_x,
            y: spec.offset_y,
            width: spec.scale_width,
            height: spec.scale_height,
            rotation: spec.rotation_degrees,
            image: None,
        }
    }
}

impl FeatureConfig {
    pub fn spec(&self) -> FeatureSpec {
        FeatureSpec {
            enabled: self.enabled,
            offset_x: self.x,
            offset_y: self.y,
            scale_width: self.width,
            scale_height: self.height,
            rotation_degrees: self.rotation,
        }
    }
}

impl Config {
    /// Feature tables resolved to kinds. Unknown names are an error.
    pub fn features(&self) -> Result<Vec<(FeatureKind, &FeatureConfig)>> {
        self.features
            .iter()
            .map(|(name, feature)| {
                let kind = name
                    .parse::<FeatureKind>()
                    .with_context(|| format!("[features.{name}]"))?;
                Ok((kind, feature))
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        self.features()?;
        if !(0.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!("score_threshold must be within 0..=1, got {}", self.score_threshold);
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            anyhow::bail!("nms_threshold must be within 0..=1, got {}", self.nms_threshold);
        }
        if self.smoothing_threshold < 0.0 {
            anyhow::bail!("smoothing_threshold must not be negative");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vmask-config-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("config.toml")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/vmask.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.detection_interval_ms, 200);
        assert_eq!(cfg.features.len(), 5);
    }

    #[test]
    fn test_partial_file() {
        let path = scratch("partial");
        std::fs::write(
            &path,
            r#"
camera = "/dev/video2"
smoothing_threshold = 0.01

[features.hat]
enabled = false
width = 2.5
image = "/tmp/hat.png"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.camera, "/dev/video2");
        assert_eq!(cfg.nms_threshold, 0.3);
        assert_eq!(cfg.features.len(), 1);

        let features = cfg.features().unwrap();
        let (kind, hat) = features[0];
        assert_eq!(kind, FeatureKind::Hat);
        let spec = hat.spec();
        assert!(!spec.enabled);
        assert_eq!(spec.scale_width, 2.5);
        assert_eq!(spec.scale_height, 1.0);
        assert_eq!(hat.image.as_deref(), Some(Path::new("/tmp/hat.png")));
    }

    #[test]
    fn test_rejects_unknown_feature() {
        let path = scratch("unknown");
        std::fs::write(&path, "[features.ear]\nenabled = true\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("ear"));
    }

    #[test]
    fn test_save_then_load() {
        let path = scratch("save");
        let mut cfg = Config::default();
        cfg.detection_interval_ms = 50;
        cfg.features.get_mut("nose").unwrap().rotation = 15.0;
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }
}
