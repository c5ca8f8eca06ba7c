//! Encoder detection from `ffmpeg -encoders` and the host's GPUs.

use super::run_captured;
use crate::capability::{CodecInfo, HardwareClass};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

const GPU_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Which GPU vendors the host appears to have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuPresence {
    pub nvidia: bool,
    pub intel: bool,
}

impl GpuPresence {
    /// Read vendor presence from `lspci` or `wmic` output.
    pub fn from_device_listing(listing: &str) -> Self {
        let lower = listing.to_lowercase();
        Self {
            nvidia: lower.contains("nvidia"),
            intel: lower.contains("intel") && lower.contains("graphics"),
        }
    }
}

/// Software encoders assumed present in every ffmpeg build.
pub fn cpu_codecs() -> Vec<CodecInfo> {
    vec![
        CodecInfo::new("h264", "H.264 (CPU)", HardwareClass::Cpu, &["mp4"]),
        CodecInfo::new("hevc", "HEVC (CPU)", HardwareClass::Cpu, &["mp4"]),
    ]
}

/// Codecs usable on this host given ffmpeg's encoder list.
///
/// Apple encoders are only offered on macOS; NVIDIA and Intel encoders only
/// when the matching GPU was detected.
pub fn codecs_from_encoder_list(encoders: &str, macos: bool, gpus: GpuPresence) -> Vec<CodecInfo> {
    let mut codecs = cpu_codecs();
    let mut offer = |name: &str, display: &str, hw: HardwareClass, format: &str| {
        if encoders.contains(name) {
            codecs.push(CodecInfo::new(name, display, hw, &[format]));
        }
    };

    if macos {
        offer("hevc_videotoolbox", "HEVC (Apple Silicon/Intel)", HardwareClass::Apple, "mp4");
        offer("h264_videotoolbox", "H.264 (Apple Silicon/Intel)", HardwareClass::Apple, "mp4");
    } else {
        if gpus.nvidia {
            offer("hevc_nvenc", "HEVC (NVIDIA GPU)", HardwareClass::Nvidia, "mp4");
            offer("h264_nvenc", "H.264 (NVIDIA GPU)", HardwareClass::Nvidia, "mp4");
        }
        if gpus.intel {
            offer("hevc_qsv", "HEVC (Intel QuickSync)", HardwareClass::Intel, "mp4");
            offer("h264_qsv", "H.264 (Intel QuickSync)", HardwareClass::Intel, "mp4");
        }
    }

    if encoders.contains("libvpx") {
        codecs.push(CodecInfo::new("vp8", "VP8", HardwareClass::Cpu, &["webm"]));
    }
    if encoders.contains("libvpx-vp9") {
        codecs.push(CodecInfo::new("vp9", "VP9", HardwareClass::Cpu, &["webm"]));
    }

    codecs
}

async fn detect_gpus() -> GpuPresence {
    let mut presence = GpuPresence::default();

    if cfg!(target_os = "linux") {
        if let Ok(output) = run_captured(Command::new("lspci"), GPU_PROBE_TIMEOUT).await {
            presence = GpuPresence::from_device_listing(&String::from_utf8_lossy(&output.stdout));
        }
    } else if cfg!(windows) {
        presence.nvidia = run_captured(Command::new("nvidia-smi"), GPU_PROBE_TIMEOUT)
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);

        let mut wmic = Command::new("wmic");
        wmic.args(["path", "win32_VideoController", "get", "name"]);
        if let Ok(output) = run_captured(wmic, GPU_PROBE_TIMEOUT).await {
            presence.intel =
                GpuPresence::from_device_listing(&String::from_utf8_lossy(&output.stdout)).intel;
        }
    }

    log::debug!("detected GPUs: {:?}", presence);
    presence
}

/// List the codecs this host can encode with.
///
/// Falls back to [`cpu_codecs`] when ffmpeg cannot be queried.
pub async fn detect_codecs(ffmpeg_bin: &Path, timeout: Duration) -> Vec<CodecInfo> {
    let mut cmd = Command::new(ffmpeg_bin);
    cmd.args(["-hide_banner", "-encoders"]);

    let encoders = match run_captured(cmd, timeout).await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).to_string()
        }
        Ok(output) => {
            log::warn!(
                "ffmpeg -encoders exited with {}, using default codecs only",
                output.status
            );
            return cpu_codecs();
        }
        Err(e) => {
            log::warn!("failed to get ffmpeg encoder list ({}), using default codecs only", e);
            return cpu_codecs();
        }
    };

    let macos = cfg!(target_os = "macos");
    let gpus = if macos {
        GpuPresence::default()
    } else {
        detect_gpus().await
    };
    codecs_from_encoder_list(&encoders, macos, gpus)
}
