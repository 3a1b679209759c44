use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, EncodeConfig};
use crate::discovery::{file_size, find_videos, total_video_size};
use crate::error::{Result, VidshrinkError};
use crate::format::{format_duration, format_size, reduction_percent};
use crate::media::{MediaTranscoder, TranscodeRequest};
use crate::output::{OutputOptions, OutputResolver};

/// A file the batch gave up on
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub input: PathBuf,
    pub error: String,
}

/// Outcome of a whole run. Sizes only count files that converted.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub started_at: DateTime<Local>,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed_secs: f64,
}

impl BatchResult {
    fn new() -> Self {
        Self {
            started_at: Local::now(),
            outputs: Vec::new(),
            failures: Vec::new(),
            input_bytes: 0,
            output_bytes: 0,
            elapsed_secs: 0.0,
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.input_bytes, self.output_bytes)
    }

    /// `<input size> -> <output size> (<reduction>%)`
    pub fn summary(&self) -> String {
        format!(
            "{} -> {} ({:.2}%)",
            format_size(self.input_bytes),
            format_size(self.output_bytes),
            self.reduction_percent()
        )
    }

    fn log_summary(&self) {
        info!(
            converted = self.outputs.len(),
            failed = self.failures.len(),
            "{} ({})",
            self.summary(),
            format_duration(std::time::Duration::from_secs_f64(self.elapsed_secs))
        );
    }
}

/// Converts every video under a folder, one at a time
pub struct BatchRunner {
    transcoder: Box<dyn MediaTranscoder>,
    encode: EncodeConfig,
    output: OutputOptions,
    delete_original: bool,
    default_root: Option<PathBuf>,
}

impl BatchRunner {
    pub fn new(config: &Config, transcoder: Box<dyn MediaTranscoder>) -> Self {
        Self {
            transcoder,
            encode: config.encode.clone(),
            output: config.output.options(),
            delete_original: config.output.delete_original,
            default_root: None,
        }
    }

    /// Place default outputs somewhere other than `./converted`
    pub fn with_default_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.default_root = Some(root.into());
        self
    }

    /// Run the batch. Per-file failures are recorded and skipped; a missing
    /// engine or a cancellation stops the run after logging what was done.
    pub async fn run(&self, input_root: &Path, cancel: &CancellationToken) -> Result<BatchResult> {
        if !input_root.is_dir() {
            return Err(VidshrinkError::InputNotFound(input_root.to_path_buf()));
        }
        self.transcoder.preflight()?;

        let resolver = match &self.default_root {
            Some(root) => OutputResolver::with_default_root(input_root, root, self.output.clone()),
            None => OutputResolver::new(input_root, self.output.clone())?,
        };

        info!(
            "{} holds {} of video",
            input_root.display(),
            format_size(total_video_size(input_root))
        );
        let files = find_videos(input_root, self.output.ignore_suffix.as_deref());
        info!("Found {} video files to convert", files.len());

        let started = Instant::now();
        let mut result = BatchResult::new();

        for file in files {
            if cancel.is_cancelled() {
                return Err(self.abort(result, started, VidshrinkError::Cancelled));
            }

            let input_size = file_size(&file);
            info!("Starting conversion for {} ({})", file.display(), format_size(input_size));

            match self.convert(&resolver, &file, cancel).await {
                Ok(output) => {
                    let output_size = file_size(&output);
                    info!(
                        status = "success",
                        "Converted {} ({})",
                        file.display(),
                        format_size(output_size)
                    );
                    result.input_bytes += input_size;
                    result.output_bytes += output_size;
                    result.outputs.push(output);
                }
                Err(e) if e.is_fatal() => {
                    return Err(self.abort(result, started, e));
                }
                Err(e) => {
                    error!("Failed to convert {}: {}", file.display(), e);
                    result.failures.push(FileFailure {
                        input: file,
                        error: e.to_string(),
                    });
                }
            }
        }

        result.elapsed_secs = started.elapsed().as_secs_f64();
        result.log_summary();
        Ok(result)
    }

    async fn convert(
        &self,
        resolver: &OutputResolver,
        file: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let placement = resolver.resolve(file)?;
        let request = TranscodeRequest::new(file, placement, &self.encode, self.delete_original);
        self.transcoder.transcode(&request, cancel).await
    }

    fn abort(
        &self,
        mut result: BatchResult,
        started: Instant,
        reason: VidshrinkError,
    ) -> VidshrinkError {
        warn!("Stopping batch: {}", reason);
        result.elapsed_secs = started.elapsed().as_secs_f64();
        result.log_summary();
        reason
    }
}
