//! Container format to codec capability table.
//!
//! The static half lists which codecs a container may carry and the quality
//! defaults per codec family. The dynamic half is the engine's own codec
//! list, which must be filtered by the selected output format before use.

use crate::options::QualityMode;
use serde::{Deserialize, Serialize};

/// Codecs permitted per output container.
pub const SUPPORTED_FORMATS: &[(&str, &[&str])] = &[
    (
        "mp4",
        &[
            "h264",
            "h264_nvenc",
            "h264_qsv",
            "h264_videotoolbox",
            "hevc",
            "hevc_nvenc",
            "hevc_qsv",
            "hevc_videotoolbox",
        ],
    ),
    ("webm", &["vp8", "vp9"]),
];

pub fn codecs_for_format(format: &str) -> Option<&'static [&'static str]> {
    SUPPORTED_FORMATS
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, codecs)| *codecs)
}

pub fn is_supported_format(format: &str) -> bool {
    codecs_for_format(format).is_some()
}

pub fn format_permits_codec(format: &str, codec: &str) -> bool {
    codecs_for_format(format)
        .map(|codecs| codecs.contains(&codec))
        .unwrap_or(false)
}

/// Quality parameters used to pre-populate the options editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDefaults {
    pub mode: QualityMode,
    pub default_value: u32,
    pub min: u32,
    pub max: u32,
}

impl CodecDefaults {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Codec family of an encoder name: `"hevc_nvenc"` belongs to `"hevc"`.
pub fn codec_family(codec: &str) -> &str {
    codec.split('_').next().unwrap_or(codec)
}

/// Defaults for a codec, looked up by family. Unknown families have none.
pub fn codec_defaults(codec: &str) -> Option<CodecDefaults> {
    let (default_value, max) = match codec_family(codec) {
        "h264" => (23, 51),
        "hevc" => (28, 51),
        "vp9" => (31, 63),
        _ => return None,
    };
    Some(CodecDefaults {
        mode: QualityMode::Crf,
        default_value,
        min: 0,
        max,
    })
}

/// Kind of hardware an encoder runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareClass {
    Cpu,
    Nvidia,
    Intel,
    Apple,
}

impl HardwareClass {
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, HardwareClass::Cpu)
    }
}

impl std::fmt::Display for HardwareClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareClass::Cpu => write!(f, "cpu"),
            HardwareClass::Nvidia => write!(f, "nvidia"),
            HardwareClass::Intel => write!(f, "intel"),
            HardwareClass::Apple => write!(f, "apple"),
        }
    }
}

/// An encoder the engine reports as usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecInfo {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "hardware")]
    pub hardware_class: HardwareClass,
    #[serde(rename = "formats")]
    pub compatible_formats: Vec<String>,
}

impl CodecInfo {
    pub fn new(name: &str, display_name: &str, hardware_class: HardwareClass, formats: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            hardware_class,
            compatible_formats: formats.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn supports_format(&self, format: &str) -> bool {
        self.compatible_formats.iter().any(|f| f == format)
    }
}

/// Engine codecs usable with `format`, in engine order.
pub fn compatible_codecs<'a>(codecs: &'a [CodecInfo], format: &str) -> Vec<&'a CodecInfo> {
    codecs.iter().filter(|c| c.supports_format(format)).collect()
}

/// Codec to keep selected after the output format changes.
///
/// Keeps `current` when it is still compatible, otherwise falls back to the
/// first compatible codec. `None` when nothing is compatible.
pub fn reconcile_codec(codecs: &[CodecInfo], format: &str, current: &str) -> Option<String> {
    let compatible = compatible_codecs(codecs, format);
    if compatible.iter().any(|c| c.name == current) {
        return Some(current.to_string());
    }
    compatible.first().map(|c| c.name.clone())
}
