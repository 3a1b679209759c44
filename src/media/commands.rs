use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::media::encoder::{ArgumentSet, Resolution};

/// Ordered engine invocation: global flags, input flags, input, filters,
/// video, audio, output.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub binary_path: OsString,
    pub args: Vec<OsString>,
}

impl EngineCommand {
    pub fn new<S: AsRef<OsStr>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    /// `-y` replaces an existing output, `-n` refuses to
    pub fn overwrite(self, overwrite: bool) -> Self {
        self.arg(if overwrite { "-y" } else { "-n" })
    }

    /// Hide the build banner and keep the log at info
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("info")
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref())
    }

    /// Add video filter
    pub fn video_filter<S: AsRef<OsStr>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Set audio codec
    pub fn audio_codec<S: AsRef<OsStr>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: AsRef<OsStr>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref())
    }

    /// Filter chain followed by the backend's video arguments
    pub fn video(self, set: &ArgumentSet, resolution: Resolution) -> Self {
        self.video_filter(set.filter.render(resolution)).args(&set.video)
    }

    /// Shell-quoted rendering for logs
    pub fn display(&self) -> String {
        let words: Vec<String> = std::iter::once(&self.binary_path)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect();

        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }

    /// Process handle with stderr piped for draining. stdin is closed so the
    /// engine never waits for an interactive answer.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::encoder::{build_arguments, EncoderChoice};

    fn strings(cmd: &EngineCommand) -> Vec<String> {
        cmd.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_invocation_order() {
        let set = build_arguments(&EncoderChoice::SoftwareX265, false, 28);
        let cmd = EngineCommand::new("ffmpeg")
            .overwrite(true)
            .quiet()
            .input("in.mp4")
            .video(&set, "1280x720".parse().unwrap())
            .audio_codec("aac")
            .audio_bitrate("96k")
            .output("out.mp4");

        let args = strings(&cmd);
        assert_eq!(&args[..4], ["-y", "-hide_banner", "-loglevel", "info"]);
        assert_eq!(&args[4..6], ["-i", "in.mp4"]);
        assert_eq!(args[6], "-vf");
        assert!(args[7].starts_with("scale="));
        assert_eq!(&args[8..10], ["-c:v", "libx265"]);
        assert_eq!(&args[args.len() - 5..], ["-c:a", "aac", "-b:a", "96k", "out.mp4"]);
    }

    #[test]
    fn test_never_overwrite_flag() {
        let cmd = EngineCommand::new("ffmpeg").overwrite(false);
        assert_eq!(strings(&cmd), ["-n"]);
    }

    #[test]
    fn test_display_quotes_paths() {
        let cmd = EngineCommand::new("ffmpeg").input("my video.mp4");
        assert_eq!(cmd.display(), "ffmpeg -i 'my video.mp4'");
    }
}
