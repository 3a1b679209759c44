use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::media::Resolution;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shrink a folder of videos to HEVC", long_about = None)]
pub struct Args {
    /// Folder containing the videos to convert
    #[arg(required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Mirror the input tree into this folder instead of ./converted
    #[arg(short, long, help_heading = "Output")]
    pub output: Option<PathBuf>,

    /// Suffix appended to output names [default: _converted]
    #[arg(short, long, help_heading = "Output")]
    pub suffix: Option<String>,

    /// Write outputs next to their inputs. With an empty suffix the input is replaced.
    #[arg(long, help_heading = "Output")]
    pub same_dir: bool,

    /// Skip files whose name already ends with this suffix
    #[arg(long, help_heading = "Output")]
    pub ignore_suffix: Option<String>,

    /// Delete each original after it converted successfully
    #[arg(long, help_heading = "Output")]
    pub delete_original: bool,

    /// Never use a hardware encoder
    #[arg(long, help_heading = "Encoding")]
    pub cpu: bool,

    /// Constant quality for hardware encoders, lower is better and bigger
    #[arg(short, long, help_heading = "Encoding")]
    pub quality: Option<i32>,

    /// Bounding box for the output, e.g. 1920x1080
    #[arg(short, long, help_heading = "Encoding")]
    pub resolution: Option<Resolution>,

    /// AAC bitrate, e.g. 128k
    #[arg(short, long, help_heading = "Encoding")]
    pub audio_bitrate: Option<String>,

    /// Encode 8-bit instead of 10-bit for older players
    #[arg(long, help_heading = "Encoding")]
    pub eight_bit: bool,

    /// Leave existing output files untouched
    #[arg(long, help_heading = "Encoding")]
    pub no_overwrite: bool,

    /// Enable debug logging, including ffmpeg output
    #[arg(short, long)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long, value_name = "FILE")]
    pub init_config: Option<PathBuf>,
}

impl Args {
    /// Command line flags take precedence over the configuration file
    pub fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output.output_root = Some(output.clone());
        }
        if let Some(suffix) = &self.suffix {
            config.output.suffix = suffix.clone();
        }
        if self.same_dir {
            config.output.same_dir = true;
        }
        if let Some(ignore) = &self.ignore_suffix {
            config.output.ignore_suffix = Some(ignore.clone());
        }
        if self.delete_original {
            config.output.delete_original = true;
        }

        if self.cpu {
            config.encode.prefer_hardware = false;
        }
        if let Some(quality) = self.quality {
            config.encode.quality = quality;
        }
        if let Some(resolution) = self.resolution {
            config.encode.target_resolution = resolution;
        }
        if let Some(bitrate) = &self.audio_bitrate {
            config.encode.audio_bitrate = bitrate.clone();
        }
        if self.eight_bit {
            config.encode.ten_bit = false;
        }
        if self.no_overwrite {
            config.encode.overwrite_existing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "vidshrink",
            "videos",
            "--suffix",
            "",
            "--same-dir",
            "--cpu",
            "-q",
            "22",
            "-r",
            "1920x1080",
            "--eight-bit",
            "--no-overwrite",
        ])
        .unwrap();

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(args.input, Some(PathBuf::from("videos")));
        assert_eq!(config.output.suffix, "");
        assert!(config.output.same_dir);
        assert!(config.output.options().overwriting());
        assert!(!config.encode.prefer_hardware);
        assert_eq!(config.encode.quality, 22);
        assert_eq!(config.encode.target_resolution.to_string(), "1920x1080");
        assert!(!config.encode.ten_bit);
        assert!(!config.encode.overwrite_existing);
    }

    #[test]
    fn test_malformed_resolution_rejected() {
        assert!(Args::try_parse_from(["vidshrink", "videos", "-r", "720p"]).is_err());
        assert!(Args::try_parse_from(["vidshrink", "videos", "-r", "0x720"]).is_err());
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = Args::try_parse_from(["vidshrink", "videos"]).unwrap();

        let mut config = Config::default();
        config.encode.quality = 19;
        config.output.suffix = "_small".to_string();
        args.apply(&mut config);

        assert_eq!(config.encode.quality, 19);
        assert_eq!(config.output.suffix, "_small");
        assert!(config.encode.prefer_hardware);
    }

    #[test]
    fn test_input_required_unless_init_config() {
        assert!(Args::try_parse_from(["vidshrink"]).is_err());

        let args = Args::try_parse_from(["vidshrink", "--init-config", "vidshrink.toml"]).unwrap();
        assert!(args.input.is_none());
        assert_eq!(args.init_config, Some(PathBuf::from("vidshrink.toml")));
    }

    #[test]
    fn test_output_root_and_report() {
        let args = Args::try_parse_from([
            "vidshrink",
            "in",
            "-o",
            "out",
            "--report",
            "run.json",
            "-d",
        ])
        .unwrap();

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.output.output_root, Some(PathBuf::from("out")));
        assert_eq!(args.report, Some(PathBuf::from("run.json")));
        assert!(args.debug);
    }
}
