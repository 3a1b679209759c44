use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, VidshrinkError};

/// Encoding backend chosen for one transcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderChoice {
    /// Nothing detected or hardware not wanted, encode with libx265
    None,
    /// NVIDIA NVENC
    Nvenc,
    /// Intel Quick Sync
    Qsv,
    /// AMD AMF
    Amf,
    /// VAAPI on Linux, through the given render node
    Vaapi { device: PathBuf },
    /// Explicit libx265
    SoftwareX265,
}

impl EncoderChoice {
    pub fn is_hardware(&self) -> bool {
        !matches!(self, EncoderChoice::None | EncoderChoice::SoftwareX265)
    }

    /// ffmpeg encoder name
    pub fn codec_name(&self) -> &'static str {
        match self {
            EncoderChoice::Nvenc => "hevc_nvenc",
            EncoderChoice::Qsv => "hevc_qsv",
            EncoderChoice::Amf => "hevc_amf",
            EncoderChoice::Vaapi { .. } => "hevc_vaapi",
            EncoderChoice::None | EncoderChoice::SoftwareX265 => "libx265",
        }
    }
}

impl fmt::Display for EncoderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderChoice::None => "none",
            EncoderChoice::Nvenc => "nvenc",
            EncoderChoice::Qsv => "qsv",
            EncoderChoice::Amf => "amf",
            EncoderChoice::Vaapi { .. } => "vaapi",
            EncoderChoice::SoftwareX265 => "software-x265",
        };
        f.write_str(name)
    }
}

/// Bounding box for the scale filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = VidshrinkError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            VidshrinkError::Config(format!("Invalid resolution '{}', expected WIDTHxHEIGHT", s))
        };

        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = width.trim().parse().map_err(|_| invalid())?;
        let height: u32 = height.trim().parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// How the `-vf` chain has to treat frames for the chosen backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChain {
    /// Software scale on system-memory frames
    Software,
    /// Tag the format, upload to a hardware surface and scale there
    HardwareUpload { surface_format: &'static str },
}

impl FilterChain {
    /// Render the chain for `resolution`. Sources smaller than the box are never upscaled.
    pub fn render(&self, resolution: Resolution) -> String {
        let Resolution { width, height } = resolution;
        match self {
            FilterChain::Software => format!(
                "scale=w='min({width},iw)':h='min({height},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2"
            ),
            FilterChain::HardwareUpload { surface_format } => format!(
                "format={surface_format},hwupload,scale_vaapi=w='min({width},iw)':h='min({height},ih)':force_original_aspect_ratio=decrease"
            ),
        }
    }
}

/// Backend specific video arguments plus the filter treatment they need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSet {
    pub video: Vec<String>,
    pub filter: FilterChain,
}

const SOFTWARE_CRF: &str = "24";

fn pix_fmt(ten_bit: bool) -> &'static str {
    if ten_bit { "yuv420p10le" } else { "yuv420p" }
}

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

/// Build the video arguments for `choice`.
///
/// `quality` goes to the backend's constant-quality knob untouched; the engine
/// rejects values it cannot use. libx265 uses its own fixed CRF instead.
pub fn build_arguments(choice: &EncoderChoice, ten_bit: bool, quality: i32) -> ArgumentSet {
    let q = quality.to_string();

    match choice {
        EncoderChoice::Nvenc => ArgumentSet {
            video: args(&[
                "-c:v", "hevc_nvenc",
                // p7 is the slowest, best quality preset
                "-preset", "p7",
                "-tune", "hq",
                "-rc:v", "vbr",
                "-cq:v", q.as_str(),
                // let cq drive the bitrate, the ceiling only bounds spikes
                "-b:v", "0",
                "-maxrate", "3M",
                "-bufsize", "6M",
                "-spatial_aq", "1",
                "-aq-strength", "15",
                "-temporal-aq", "1",
                "-bf:v", "3",
                "-b_ref_mode", "middle",
                "-rc-lookahead", "32",
                "-pix_fmt", pix_fmt(ten_bit),
            ]),
            filter: FilterChain::Software,
        },
        EncoderChoice::Qsv => ArgumentSet {
            video: args(&[
                "-c:v", "hevc_qsv",
                "-global_quality", q.as_str(),
                "-pix_fmt", if ten_bit { "p010le" } else { "nv12" },
            ]),
            filter: FilterChain::Software,
        },
        // AMF has no dependable 10-bit path, ten_bit is ignored here
        EncoderChoice::Amf => ArgumentSet {
            video: args(&[
                "-c:v", "hevc_amf",
                "-rc", "cqp",
                "-qp_i", q.as_str(),
                "-qp_p", q.as_str(),
            ]),
            filter: FilterChain::Software,
        },
        EncoderChoice::Vaapi { .. } => {
            let mut video = args(&["-c:v", "hevc_vaapi", "-qp", q.as_str()]);
            if ten_bit {
                video.extend(args(&["-profile:v", "main10"]));
            }
            ArgumentSet {
                video,
                filter: FilterChain::HardwareUpload {
                    surface_format: if ten_bit { "p010" } else { "nv12" },
                },
            }
        }
        EncoderChoice::None | EncoderChoice::SoftwareX265 => ArgumentSet {
            video: args(&[
                "-c:v", "libx265",
                "-preset", "veryslow",
                "-crf", SOFTWARE_CRF,
                "-pix_fmt", pix_fmt(ten_bit),
            ]),
            filter: FilterChain::Software,
        },
    }
}

/// Input side flags that must precede `-i`
pub fn hwaccel_input_args(choice: &EncoderChoice) -> Vec<String> {
    match choice {
        EncoderChoice::Nvenc => args(&["-hwaccel", "cuda"]),
        EncoderChoice::Qsv => args(&["-hwaccel", "qsv"]),
        EncoderChoice::Vaapi { device } => {
            vec!["-vaapi_device".to_string(), device.to_string_lossy().to_string()]
        }
        EncoderChoice::Amf | EncoderChoice::None | EncoderChoice::SoftwareX265 => Vec::new(),
    }
}
