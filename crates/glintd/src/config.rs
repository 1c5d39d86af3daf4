use glint_core::adjust::{AdjustError, Adjustments};
use glint_core::mesh::{DEFAULT_MIN_DETECTION_CONFIDENCE, DEFAULT_MIN_TRACKING_CONFIDENCE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid adjustments: {0}")]
    Adjust(#[from] AdjustError),
}

/// Daemon configuration: defaults, then the TOML file, then `GLINT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Number of frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Directory containing the face landmark ONNX model.
    pub model_dir: PathBuf,
    pub mesh_model: String,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Directory holding `chains/` and `earrings/` image folders.
    pub asset_dir: PathBuf,
    /// Base URL of the chain list endpoint (`<base>/api/chains`), if any.
    pub api_base_url: Option<String>,
    /// Where screenshots are written.
    pub screenshot_dir: PathBuf,
    /// Adjustments applied at startup.
    pub adjustments: Adjustments,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub camera: CameraSection,
    pub mesh: MeshSection,
    pub assets: AssetSection,
    pub screenshots: ScreenshotSection,
    pub adjustments: Option<Adjustments>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSection {
    pub device: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub warmup_frames: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshSection {
    pub model_dir: Option<PathBuf>,
    pub model: Option<String>,
    pub min_detection_confidence: Option<f32>,
    pub min_tracking_confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetSection {
    pub dir: Option<PathBuf>,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenshotSection {
    pub dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load configuration from the process environment and the config file.
    ///
    /// The file is `$GLINT_CONFIG` if set (and must exist), otherwise
    /// `$XDG_CONFIG_HOME/glint/config.toml` when present.
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();

        let file = match env("GLINT_CONFIG") {
            Some(path) => Some(FileConfig::read(Path::new(&path))?),
            None => {
                let default_path = config_home(&env).join("glint/config.toml");
                if default_path.is_file() {
                    Some(FileConfig::read(&default_path)?)
                } else {
                    None
                }
            }
        };

        Self::from_sources(file.unwrap_or_default(), env)
    }

    /// Merge defaults, `file`, and environment lookups from `env`.
    pub fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let data_dir = data_home(&env).join("glint");

        let model_dir = env("GLINT_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.mesh.model_dir)
            .unwrap_or_else(|| data_dir.join("models"));

        let asset_dir = env("GLINT_ASSET_DIR")
            .map(PathBuf::from)
            .or(file.assets.dir)
            .unwrap_or_else(|| data_dir.join("assets"));

        let screenshot_dir = env("GLINT_SCREENSHOT_DIR")
            .map(PathBuf::from)
            .or(file.screenshots.dir)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join("Pictures")
            });

        let api_base_url = env("GLINT_API_URL")
            .or(file.assets.api_base_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        // File values bypass the setters.
        let mut adjustments = file.adjustments.unwrap_or_default().validated()?;
        if let Some(v) = parsed(&env, "GLINT_CHAIN_SCALE") {
            adjustments.set_chain_scale(v)?;
        }
        if let Some(v) = parsed(&env, "GLINT_VERTICAL_OFFSET") {
            adjustments.set_vertical_offset(v)?;
        }
        if let Some(v) = parsed(&env, "GLINT_EARRING_SCALE") {
            adjustments.set_earring_scale(v)?;
        }
        if let Some(v) = env("GLINT_SHOW_EARRINGS") {
            adjustments.show_earrings = v != "0";
        }

        Ok(Self {
            camera_device: env("GLINT_CAMERA_DEVICE")
                .or(file.camera.device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            capture_width: parsed(&env, "GLINT_CAPTURE_WIDTH")
                .or(file.camera.width)
                .unwrap_or(glint_hw::camera::DEFAULT_WIDTH),
            capture_height: parsed(&env, "GLINT_CAPTURE_HEIGHT")
                .or(file.camera.height)
                .unwrap_or(glint_hw::camera::DEFAULT_HEIGHT),
            warmup_frames: parsed(&env, "GLINT_WARMUP_FRAMES")
                .or(file.camera.warmup_frames)
                .unwrap_or(4),
            model_dir,
            mesh_model: env("GLINT_MESH_MODEL")
                .or(file.mesh.model)
                .unwrap_or_else(|| "face_landmark.onnx".to_string()),
            min_detection_confidence: parsed(&env, "GLINT_MIN_DETECTION_CONFIDENCE")
                .or(file.mesh.min_detection_confidence)
                .unwrap_or(DEFAULT_MIN_DETECTION_CONFIDENCE),
            min_tracking_confidence: parsed(&env, "GLINT_MIN_TRACKING_CONFIDENCE")
                .or(file.mesh.min_tracking_confidence)
                .unwrap_or(DEFAULT_MIN_TRACKING_CONFIDENCE),
            asset_dir,
            api_base_url,
            screenshot_dir,
            adjustments,
        })
    }

    /// Path to the face landmark model.
    pub fn mesh_model_path(&self) -> String {
        self.model_dir
            .join(&self.mesh_model)
            .to_string_lossy()
            .into_owned()
    }
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}

fn data_home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME").map(PathBuf::from).unwrap_or_else(|| {
        let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
        PathBuf::from(home).join(".local/share")
    })
}

fn config_home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_CONFIG_HOME").map(PathBuf::from).unwrap_or_else(|| {
        let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
        PathBuf::from(home).join(".config")
    })
}
