use std::path::PathBuf;
use thiserror::Error;

pub const FFMPEG_DOWNLOAD_URL: &str = "https://www.ffmpeg.org/download.html";

#[derive(Error, Debug)]
pub enum VidshrinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error(
        "{binary} not found in PATH. Please install ffmpeg from {url}",
        url = FFMPEG_DOWNLOAD_URL
    )]
    EngineMissing { binary: String },

    #[error("{}", engine_failure_message(.code))]
    EngineFailure { code: Option<i32> },

    #[error("Hardware probe failed: {0}")]
    Probe(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Input folder not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled by user")]
    Cancelled,
}

fn engine_failure_message(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("ffmpeg failed with return code {}", code),
        None => "ffmpeg was terminated by a signal".to_string(),
    }
}

impl VidshrinkError {
    /// Errors after which no further file in a batch could succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VidshrinkError::EngineMissing { .. }
                | VidshrinkError::InputNotFound(_)
                | VidshrinkError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, VidshrinkError>;
