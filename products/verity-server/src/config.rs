use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_FACE_DETECTOR_PATH: &str = "models/blazeface.safetensors";
pub const DEFAULT_FACE_MESH_PATH: &str = "models/face_landmark.onnx";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

/// Directory for date-named log files; read before the rest of the
/// configuration so configuration errors are logged there too.
pub const LOG_DIR_VAR: &str = "VERITY_LOG_DIR";

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "{name} is not set"),
            ConfigError::Invalid { name, value } => write!(f, "{name} has invalid value '{value}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub image_model_path: PathBuf,
    pub video_model_path: PathBuf,
    pub face_detector_path: PathBuf,
    pub face_mesh_path: PathBuf,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub cuda_device: Option<usize>,
}

impl Config {
    /// Read from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| get(name).map(PathBuf::from).ok_or(ConfigError::Missing(name));
        let path_or = |name: &str, default: &str| PathBuf::from(get(name).unwrap_or_else(|| default.to_string()));

        Ok(Config {
            port: parse(&get, "PORT")?.unwrap_or(DEFAULT_PORT),
            image_model_path: required("IMAGE_MODEL_PATH")?,
            video_model_path: required("VIDEO_MODEL_PATH")?,
            face_detector_path: path_or("FACE_DETECTOR_PATH", DEFAULT_FACE_DETECTOR_PATH),
            face_mesh_path: path_or("FACE_MESH_PATH", DEFAULT_FACE_MESH_PATH),
            request_timeout: Duration::from_secs(
                positive(&get, "REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS as usize) as u64,
            ),
            max_upload_bytes: positive(&get, "MAX_UPLOAD_MB")?.unwrap_or(DEFAULT_MAX_UPLOAD_MB)
                * 1024
                * 1024,
            cuda_device: parse(&get, "CUDA_DEVICE")?,
        })
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn positive(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match parse::<usize>(get, name)? {
        Some(0) => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}
