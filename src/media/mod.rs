// Media layer
//
// - Encoder: encoder choices and the argument sets they map to
// - Probe: hardware encoder detection
// - Commands: ordered engine invocation builder
// - Driver: runs one engine process per file

pub mod commands;
pub mod driver;
pub mod encoder;
pub mod probe;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub use commands::EngineCommand;
pub use driver::{TranscodeRequest, Transcoder};
pub use encoder::{build_arguments, ArgumentSet, EncoderChoice, FilterChain, Resolution};
pub use probe::{CapabilityProber, GpuVendor, HostInspector, SystemInspector};

use crate::config::Config;
use crate::error::Result;

/// Seam between the batch and whatever turns one input into one output
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Fail early when the engine cannot be found
    fn preflight(&self) -> Result<PathBuf>;

    /// Transcode a single file, returning the path of the final output
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

#[async_trait]
impl MediaTranscoder for Transcoder {
    fn preflight(&self) -> Result<PathBuf> {
        Transcoder::preflight(self)
    }

    async fn transcode(
        &self,
        request: &TranscodeRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        Transcoder::transcode(self, request, cancel).await
    }
}

/// Factory for creating transcoder instances
pub struct TranscoderFactory;

impl TranscoderFactory {
    /// ffmpeg-backed transcoder with host probing
    pub fn create_transcoder(config: &Config, show_progress: bool) -> Box<dyn MediaTranscoder> {
        Box::new(Transcoder::new(config).with_progress(show_progress))
    }
}
