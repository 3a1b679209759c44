use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, EncodeConfig, EngineConfig};
use crate::error::{Result, VidshrinkError};
use crate::media::commands::EngineCommand;
use crate::media::encoder::{build_arguments, hwaccel_input_args, EncoderChoice, Resolution};
use crate::media::probe::CapabilityProber;
use crate::output::OutputPlacement;

/// Lines of engine output kept for failure reports
const STDERR_TAIL_LINES: usize = 20;

/// Everything needed to transcode one file
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub placement: OutputPlacement,
    pub ten_bit: bool,
    pub audio_bitrate: String,
    pub overwrite_existing: bool,
    pub prefer_hardware: bool,
    pub quality: i32,
    pub target_resolution: Resolution,
    pub delete_original: bool,
}

impl TranscodeRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        placement: OutputPlacement,
        encode: &EncodeConfig,
        delete_original: bool,
    ) -> Self {
        Self {
            input: input.into(),
            placement,
            ten_bit: encode.ten_bit,
            audio_bitrate: encode.audio_bitrate.clone(),
            overwrite_existing: encode.overwrite_existing,
            prefer_hardware: encode.prefer_hardware,
            quality: encode.quality,
            target_resolution: encode.target_resolution,
            delete_original,
        }
    }
}

/// Resolve the engine on PATH without running it
pub fn locate_engine(binary: &str) -> Result<PathBuf> {
    which::which(binary).map_err(|e| {
        debug!("Engine lookup for {} failed: {}", binary, e);
        VidshrinkError::EngineMissing {
            binary: binary.to_string(),
        }
    })
}

/// Full invocation: global flags, hardware input flags, input, filter chain,
/// video arguments, AAC audio, output.
pub fn engine_command(
    engine: &Path,
    request: &TranscodeRequest,
    choice: &EncoderChoice,
) -> EngineCommand {
    let video = build_arguments(choice, request.ten_bit, request.quality);

    EngineCommand::new(engine)
        .overwrite(request.overwrite_existing)
        .quiet()
        .args(hwaccel_input_args(choice))
        .input(&request.input)
        .video(&video, request.target_resolution)
        .audio_codec("aac")
        .audio_bitrate(&request.audio_bitrate)
        .output(&request.placement.path)
}

/// Drives one engine process per request
pub struct Transcoder {
    binary_path: String,
    prober: CapabilityProber,
    show_progress: bool,
}

impl Transcoder {
    pub fn new(config: &Config) -> Self {
        Self::with_prober(
            &config.engine,
            CapabilityProber::system(&config.engine, config.encode.allow_qsv),
        )
    }

    pub fn with_prober(engine: &EngineConfig, prober: CapabilityProber) -> Self {
        Self {
            binary_path: engine.binary_path.clone(),
            prober,
            show_progress: true,
        }
    }

    /// Toggle the terminal spinner
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Check the engine is installed
    pub fn preflight(&self) -> Result<PathBuf> {
        locate_engine(&self.binary_path)
    }

    /// Transcode one file and return where the result ended up.
    ///
    /// In overwriting mode the staged output replaces the input only after the
    /// engine exited successfully, and the input path is returned. Outputs of
    /// failed or cancelled runs are left where they are.
    pub async fn transcode(
        &self,
        request: &TranscodeRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let engine = self.preflight()?;

        if !request.input.is_file() {
            return Err(VidshrinkError::Path(format!(
                "{} is not a regular file",
                request.input.display()
            )));
        }
        if let Some(parent) = request.placement.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Probing hardware encoders");
        let choice = self.prober.detect_hardware_encoder(request.prefer_hardware).await;
        if choice.is_hardware() {
            debug!("Using hardware encoder: {}", choice);
        } else if request.prefer_hardware {
            warn!("No hardware HEVC encoder detected, using libx265 (software).");
        }

        debug!("Building ffmpeg command");
        let command = engine_command(&engine, request, &choice);
        debug!("Running ffmpeg: {}", command.display());

        if cancel.is_cancelled() {
            return Err(VidshrinkError::Cancelled);
        }
        self.run(&command, &request.input, cancel).await?;

        debug!("Done: {}", request.placement.path.display());

        if request.placement.overwriting {
            tokio::fs::rename(&request.placement.path, &request.input).await?;
            info!("Replaced original {}", request.input.display());
            return Ok(request.input.clone());
        }

        if request.delete_original {
            tokio::fs::remove_file(&request.input).await?;
            info!("Deleted original {}", request.input.display());
        }

        Ok(request.placement.path.clone())
    }

    async fn run(
        &self,
        command: &EngineCommand,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| VidshrinkError::Process(format!("Failed to execute ffmpeg: {}", e)))?;
        debug!("Launched ffmpeg (pid {:?})", child.id());

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| VidshrinkError::Process("Failed to capture ffmpeg stderr".to_string()))?;

        let spinner = self.spinner(input);
        let drain = tokio::spawn(drain_stderr(stderr, spinner.clone()));

        let status = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        let Some(status) = status else {
            warn!("Interrupted, stopping ffmpeg");
            child
                .kill()
                .await
                .map_err(|e| VidshrinkError::Process(format!("Failed to stop ffmpeg: {}", e)))?;
            drain.abort();
            spinner.finish_and_clear();
            return Err(VidshrinkError::Cancelled);
        };

        let status = status
            .map_err(|e| VidshrinkError::Process(format!("Failed to wait for ffmpeg: {}", e)))?;
        let tail = drain.await.unwrap_or_default();
        spinner.finish_and_clear();
        debug!("ffmpeg exited with {}", status);

        if status.success() {
            return Ok(());
        }

        for line in &tail {
            warn!("ffmpeg: {}", line);
        }
        Err(VidshrinkError::EngineFailure { code: status.code() })
    }

    fn spinner(&self, input: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let spinner = ProgressBar::new_spinner();
        let template = "{spinner} [{elapsed_precise}] {prefix} {msg}";
        if let Ok(style) = ProgressStyle::with_template(template) {
            spinner.set_style(style);
        }
        spinner.set_prefix(
            input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

/// Forward every engine line to the debug log and the spinner, keeping the
/// last few for error reports.
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R, spinner: ProgressBar) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    let result = drain_lines(stderr, |line| {
        debug!("{}", line);
        if line.starts_with("frame=") || line.starts_with("size=") {
            spinner.set_message(line.to_string());
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    })
    .await;

    if let Err(e) = result {
        debug!("Reading ffmpeg output failed: {}", e);
    }
    tail.into()
}

/// Split a stream into lines on `\n` and `\r`. ffmpeg redraws its progress
/// line with carriage returns, so `\n` alone would buffer a whole encode.
pub async fn drain_lines<R, F>(reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut pending = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();
        for &byte in buf {
            if byte == b'\n' || byte == b'\r' {
                emit_line(&mut pending, &mut on_line);
            } else {
                pending.push(byte);
            }
        }
        reader.consume(len);
    }

    emit_line(&mut pending, &mut on_line);
    Ok(())
}

fn emit_line<F: FnMut(&str)>(pending: &mut Vec<u8>, on_line: &mut F) {
    let line = String::from_utf8_lossy(pending);
    let line = line.trim();
    if !line.is_empty() {
        on_line(line);
    }
    pending.clear();
}
