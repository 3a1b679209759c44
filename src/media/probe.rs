use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Result, VidshrinkError};
use crate::media::encoder::EncoderChoice;

/// Any of these means the engine was built with NVENC support
pub const NVENC_FAMILY: &[&str] = &["hevc_nvenc", "h265_nvenc", "h264_nvenc", "vp9_nvenc"];
pub const QSV_FAMILY: &[&str] = &["hevc_qsv"];
pub const AMF_FAMILY: &[&str] = &["hevc_amf", "h265_amf"];
pub const VAAPI_FAMILY: &[&str] = &["hevc_vaapi"];

/// GPU vendor reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Intel,
    Amd,
}

/// Encoders compiled into the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderList(HashSet<String>);

impl EncoderList {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn contains_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.contains(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for EncoderList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Parse `ffmpeg -hide_banner -encoders`.
///
/// Each encoder line is a six character capability field followed by the
/// encoder name, e.g. ` V....D hevc_nvenc  NVIDIA NVENC hevc encoder`.
/// The legend (` V..... = Video`) and the `------` separator are skipped.
pub fn parse_encoder_listing(text: &str) -> EncoderList {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;

            let is_capability_field = flags.len() == 6
                && flags.starts_with(['V', 'A', 'S'])
                && flags.chars().skip(1).all(|c| c == '.' || c.is_ascii_uppercase());

            (is_capability_field && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Classify a device listing from lspci, wmic or system_profiler.
///
/// NVIDIA is deliberately not recognised here; NVENC needs the proprietary
/// driver, which is what `nvidia-smi` confirms. Discrete AMD wins over an
/// Intel iGPU when both are listed.
pub fn vendor_from_device_listing(text: &str) -> Option<GpuVendor> {
    let lines: Vec<String> = text.lines().map(str::to_lowercase).collect();

    // lspci lists every PCI device, keep only display controllers
    let is_pci_display = |l: &String| {
        ["vga compatible controller", "display controller", "3d controller"]
            .iter()
            .any(|class| l.contains(class))
    };
    let candidates: Vec<&String> = if lines.iter().any(is_pci_display) {
        lines.iter().filter(|l| is_pci_display(*l)).collect()
    } else {
        lines.iter().collect()
    };

    let mentions = |needles: &[&str]| {
        candidates
            .iter()
            .any(|l| needles.iter().any(|n| l.contains(n)))
    };

    if mentions(&["advanced micro devices", "amd", "radeon"]) {
        Some(GpuVendor::Amd)
    } else if mentions(&["intel"]) {
        Some(GpuVendor::Intel)
    } else {
        None
    }
}

/// First `renderD*` node in `dri_dir`
pub fn first_render_node(dri_dir: &Path) -> Option<PathBuf> {
    let mut devices: Vec<PathBuf> = std::fs::read_dir(dri_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with("renderD"))
                .unwrap_or(false)
        })
        .map(|e| e.path())
        .collect();

    // renderD128 before renderD129
    devices.sort();
    devices.into_iter().next()
}

/// Host facts the prober decides on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostInspector: Send + Sync {
    /// GPU vendor, `None` when undetermined
    async fn gpu_vendor(&self) -> Option<GpuVendor>;

    /// Encoders the engine reports, empty when it cannot be asked
    async fn engine_encoders(&self) -> EncoderList;

    /// VAAPI render node
    fn render_device(&self) -> Option<PathBuf>;

    /// `std::env::consts::OS` style platform name
    fn platform(&self) -> &'static str;
}

/// Inspects the real machine through short-lived diagnostic processes
pub struct SystemInspector {
    engine_binary: String,
    timeout: Duration,
}

impl SystemInspector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            engine_binary: config.binary_path.clone(),
            timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
        }
    }

    async fn probe_stdout(&self, program: &str, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                VidshrinkError::Probe(format!("{} timed out after {:?}", program, self.timeout))
            })?
            .map_err(|e| VidshrinkError::Probe(format!("Failed to execute {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(VidshrinkError::Probe(format!("{} exited with {}", program, output.status)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn nvidia_gpu_name(&self) -> Result<String> {
        let stdout = self
            .probe_stdout("nvidia-smi", &["--query-gpu=name", "--format=csv,noheader"])
            .await?;

        stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| VidshrinkError::Probe("nvidia-smi reported no GPU".to_string()))
    }

    async fn device_listing(&self) -> Result<String> {
        match self.platform() {
            "windows" => {
                self.probe_stdout("wmic", &["path", "win32_VideoController", "get", "name"])
                    .await
            }
            "macos" => self.probe_stdout("system_profiler", &["SPDisplaysDataType"]).await,
            _ => self.probe_stdout("lspci", &[]).await,
        }
    }
}

#[async_trait]
impl HostInspector for SystemInspector {
    async fn gpu_vendor(&self) -> Option<GpuVendor> {
        match self.nvidia_gpu_name().await {
            Ok(name) => {
                debug!("nvidia-smi reports {}", name);
                return Some(GpuVendor::Nvidia);
            }
            Err(e) => debug!("{}", e),
        }

        match self.device_listing().await {
            Ok(listing) => vendor_from_device_listing(&listing),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    async fn engine_encoders(&self) -> EncoderList {
        match self.probe_stdout(&self.engine_binary, &["-hide_banner", "-encoders"]).await {
            Ok(listing) => parse_encoder_listing(&listing),
            Err(e) => {
                debug!("{}", e);
                EncoderList::default()
            }
        }
    }

    fn render_device(&self) -> Option<PathBuf> {
        first_render_node(Path::new("/dev/dri"))
    }

    fn platform(&self) -> &'static str {
        std::env::consts::OS
    }
}

/// Decides which backend to use, once per prober
pub struct CapabilityProber {
    inspector: Box<dyn HostInspector>,
    allow_qsv: bool,
    decision: OnceCell<EncoderChoice>,
}

impl CapabilityProber {
    pub fn new(inspector: Box<dyn HostInspector>, allow_qsv: bool) -> Self {
        Self {
            inspector,
            allow_qsv,
            decision: OnceCell::new(),
        }
    }

    /// Prober backed by the real host
    pub fn system(config: &EngineConfig, allow_qsv: bool) -> Self {
        Self::new(Box::new(SystemInspector::new(config)), allow_qsv)
    }

    /// Backend to encode with. Never fails; anything that cannot be probed
    /// counts as not detected.
    pub async fn detect_hardware_encoder(&self, prefer_gpu: bool) -> EncoderChoice {
        if !prefer_gpu {
            return EncoderChoice::None;
        }

        self.decision.get_or_init(|| self.probe()).await.clone()
    }

    async fn probe(&self) -> EncoderChoice {
        let vendor = self.inspector.gpu_vendor().await;
        let encoders = self.inspector.engine_encoders().await;
        debug!("GPU vendor: {:?}, engine encoders: {}", vendor, encoders.len());

        let choice = match vendor {
            Some(GpuVendor::Nvidia) if encoders.contains_any(NVENC_FAMILY) => EncoderChoice::Nvenc,
            Some(GpuVendor::Intel) if self.allow_qsv && encoders.contains_any(QSV_FAMILY) => {
                EncoderChoice::Qsv
            }
            Some(GpuVendor::Amd) if encoders.contains_any(AMF_FAMILY) => EncoderChoice::Amf,
            None if self.inspector.platform() == "linux" && encoders.contains_any(VAAPI_FAMILY) => {
                match self.inspector.render_device() {
                    Some(device) => EncoderChoice::Vaapi { device },
                    None => {
                        debug!("hevc_vaapi is available but no render node was found");
                        EncoderChoice::None
                    }
                }
            }
            _ => EncoderChoice::None,
        };

        if choice.is_hardware() {
            info!("Detected hardware encoder: {}", choice);
        }
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 .F.... = Frame-level multithreading
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 V....D libx265              libx265 H.265 / HEVC (codec hevc)
 V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)
 V....D hevc_qsv             HEVC (Intel Quick Sync Video acceleration) (codec hevc)
 V....D hevc_vaapi           H.265/HEVC (VAAPI) (codec hevc)
 V....D hevc_amf             AMD AMF HEVC encoder (codec hevc)
 A....D aac                  AAC (Advanced Audio Coding)
";

    fn inspector(
        vendor: Option<GpuVendor>,
        encoders: &'static str,
        platform: &'static str,
        device: Option<&'static str>,
    ) -> MockHostInspector {
        let mut mock = MockHostInspector::new();
        mock.expect_gpu_vendor().returning(move || vendor);
        mock.expect_engine_encoders()
            .returning(move || parse_encoder_listing(encoders));
        mock.expect_platform().return_const(platform);
        mock.expect_render_device()
            .returning(move || device.map(PathBuf::from));
        mock
    }

    #[test]
    fn test_parse_encoder_listing() {
        let list = parse_encoder_listing(ENCODERS);
        assert!(list.contains("hevc_nvenc"));
        assert!(list.contains("libx265"));
        assert!(list.contains("aac"));
        assert!(!list.contains("="));
        assert!(!list.contains("------"));
        assert_eq!(list.len(), 7);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_encoder_listing("").is_empty());
        assert!(parse_encoder_listing("command not found\nsegfault").is_empty());
    }

    #[test]
    fn test_vendor_from_lspci() {
        let lspci = "00:00.0 Host bridge: Intel Corporation Device 4650 (rev 05)
00:02.0 VGA compatible controller: Intel Corporation Alder Lake-S GT1 [UHD Graphics 730] (rev 0c)
00:14.0 USB controller: Intel Corporation Alder Lake-S PCH USB 3.2";
        assert_eq!(vendor_from_device_listing(lspci), Some(GpuVendor::Intel));

        let amd = "00:14.0 USB controller: Intel Corporation Device
03:00.0 VGA compatible controller: Advanced Micro Devices, Inc. [AMD/ATI] Navi 23";
        assert_eq!(vendor_from_device_listing(amd), Some(GpuVendor::Amd));

        let nvidia_only = "01:00.0 VGA compatible controller: NVIDIA Corporation GA106 [GeForce RTX 3060]
00:14.0 USB controller: Intel Corporation Device";
        assert_eq!(vendor_from_device_listing(nvidia_only), None);
    }

    #[test]
    fn test_vendor_from_wmic() {
        let wmic = "Name\r\nAMD Radeon RX 6600\r\n";
        assert_eq!(vendor_from_device_listing(wmic), Some(GpuVendor::Amd));
        let intel = "Name\r\nIntel(R) UHD Graphics 770\r\n";
        assert_eq!(vendor_from_device_listing(intel), Some(GpuVendor::Intel));
    }

    #[test]
    fn test_first_render_node() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["card0", "renderD129", "renderD128"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(first_render_node(dir.path()), Some(dir.path().join("renderD128")));
        assert_eq!(first_render_node(&dir.path().join("missing")), None);
    }

    #[tokio::test]
    async fn test_vaapi_when_vendor_undetermined_on_linux() {
        let prober = CapabilityProber::new(
            Box::new(inspector(
                None,
                " V....D hevc_vaapi  H.265/HEVC (VAAPI)",
                "linux",
                Some("/dev/dri/renderD128"),
            )),
            true,
        );
        assert_eq!(
            prober.detect_hardware_encoder(true).await,
            EncoderChoice::Vaapi { device: PathBuf::from("/dev/dri/renderD128") }
        );
    }

    #[tokio::test]
    async fn test_vaapi_needs_linux_and_render_node() {
        let prober = CapabilityProber::new(
            Box::new(inspector(None, ENCODERS, "windows", Some("/dev/dri/renderD128"))),
            true,
        );
        assert_eq!(prober.detect_hardware_encoder(true).await, EncoderChoice::None);

        let prober =
            CapabilityProber::new(Box::new(inspector(None, ENCODERS, "linux", None)), true);
        assert_eq!(prober.detect_hardware_encoder(true).await, EncoderChoice::None);
    }

    #[tokio::test]
    async fn test_vendor_precedence() {
        let cases = [
            (Some(GpuVendor::Nvidia), EncoderChoice::Nvenc),
            (Some(GpuVendor::Intel), EncoderChoice::Qsv),
            (Some(GpuVendor::Amd), EncoderChoice::Amf),
        ];
        for (vendor, expected) in cases {
            let prober = CapabilityProber::new(
                Box::new(inspector(vendor, ENCODERS, "linux", Some("/dev/dri/renderD128"))),
                true,
            );
            assert_eq!(prober.detect_hardware_encoder(true).await, expected, "{:?}", vendor);
        }
    }

    #[tokio::test]
    async fn test_vendor_without_matching_encoder_falls_back() {
        let software_only = " V....D libx265  libx265 H.265 / HEVC (codec hevc)";
        let prober = CapabilityProber::new(
            Box::new(inspector(Some(GpuVendor::Nvidia), software_only, "linux", None)),
            true,
        );
        assert_eq!(prober.detect_hardware_encoder(true).await, EncoderChoice::None);
    }

    #[tokio::test]
    async fn test_qsv_disabled_by_policy() {
        let prober = CapabilityProber::new(
            Box::new(inspector(
                Some(GpuVendor::Intel),
                ENCODERS,
                "linux",
                Some("/dev/dri/renderD128"),
            )),
            false,
        );
        assert_eq!(prober.detect_hardware_encoder(true).await, EncoderChoice::None);
    }

    #[tokio::test]
    async fn test_no_probe_without_gpu_preference() {
        let mut mock = MockHostInspector::new();
        mock.expect_gpu_vendor().never();
        mock.expect_engine_encoders().never();

        let prober = CapabilityProber::new(Box::new(mock), true);
        assert_eq!(prober.detect_hardware_encoder(false).await, EncoderChoice::None);
    }

    #[tokio::test]
    async fn test_decision_is_cached() {
        let mut mock = MockHostInspector::new();
        mock.expect_gpu_vendor().times(1).returning(|| Some(GpuVendor::Nvidia));
        mock.expect_engine_encoders()
            .times(1)
            .returning(|| parse_encoder_listing(ENCODERS));
        mock.expect_platform().return_const("linux");

        let prober = CapabilityProber::new(Box::new(mock), true);
        assert_eq!(prober.detect_hardware_encoder(true).await, EncoderChoice::Nvenc);
        assert_eq!(prober.detect_hardware_encoder(true).await, EncoderChoice::Nvenc);
    }

    #[tokio::test]
    async fn test_missing_tools_degrade_to_software() {
        let config = EngineConfig {
            binary_path: "vidshrink-no-such-engine".to_string(),
            probe_timeout_secs: 2,
            ..EngineConfig::default()
        };
        let inspector = SystemInspector::new(&config);
        assert!(inspector.engine_encoders().await.is_empty());
    }
}
