//! Encoding options: the editable draft and the immutable payload sent to the engine.

use crate::capability::{
    codec_defaults, codecs_for_format, format_permits_codec, reconcile_codec, CodecInfo,
};
use crate::config::EncodingDefaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    /// Constant rate factor: fixed quality, variable size.
    #[default]
    Crf,
    /// Target bitrate in kbit/s.
    Bitrate,
}

impl std::fmt::Display for QualityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityMode::Crf => write!(f, "crf"),
            QualityMode::Bitrate => write!(f, "bitrate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("unsupported video format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported codec {codec} for format {format}")]
    UnsupportedCodec { codec: String, format: String },

    #[error("quality value {value} out of range [{min}-{max}] for codec {codec}")]
    QualityOutOfRange {
        codec: String,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("2-pass encoding is only available with bitrate mode")]
    TwoPassRequiresBitrate,

    #[error("bitrate mode needs a positive bitrate")]
    ZeroBitrate,
}

/// Options for one batch. Built once per batch and never mutated afterwards.
///
/// Empty audio codec and zero audio bitrate/sample rate mean "keep the source's".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingOptions {
    pub video_format: String,
    pub video_codec: String,
    pub quality_mode: QualityMode,
    /// CRF value or bitrate in kbit/s, depending on `quality_mode`.
    pub quality_value: u32,
    pub two_pass: bool,
    pub resize: bool,
    pub width: u32,
    pub height: u32,
    pub output_dir: Option<PathBuf>,
    pub prefix: String,
    pub postfix: String,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
}

impl EncodingOptions {
    /// Check the options against the capability table.
    ///
    /// A zero CRF value is replaced by the codec's default, which is why this
    /// consumes and returns the options.
    pub fn validate(mut self) -> Result<Self, OptionsError> {
        if codecs_for_format(&self.video_format).is_none() {
            return Err(OptionsError::UnsupportedFormat(self.video_format));
        }
        if !format_permits_codec(&self.video_format, &self.video_codec) {
            return Err(OptionsError::UnsupportedCodec {
                codec: self.video_codec,
                format: self.video_format,
            });
        }

        match self.quality_mode {
            QualityMode::Crf => {
                if self.two_pass {
                    return Err(OptionsError::TwoPassRequiresBitrate);
                }
                if let Some(defaults) = codec_defaults(&self.video_codec) {
                    if self.quality_value == 0 {
                        self.quality_value = defaults.default_value;
                    }
                    if !defaults.contains(self.quality_value) {
                        return Err(OptionsError::QualityOutOfRange {
                            codec: self.video_codec,
                            value: self.quality_value,
                            min: defaults.min,
                            max: defaults.max,
                        });
                    }
                }
            }
            QualityMode::Bitrate => {
                if self.quality_value == 0 {
                    return Err(OptionsError::ZeroBitrate);
                }
            }
        }

        Ok(self)
    }

    /// Whether the encode needs two ffmpeg passes.
    pub fn is_two_pass(&self) -> bool {
        self.two_pass && self.quality_mode == QualityMode::Bitrate
    }

    /// Scale target when resizing with positive dimensions.
    pub fn scale(&self) -> Option<(u32, u32)> {
        (self.resize && self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }

    /// Where the encoded copy of `input` is written.
    ///
    /// `<output_dir or input dir>/<prefix><stem><postfix>.<format>`
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let dir = match &self.output_dir {
            Some(dir) => dir.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        dir.join(format!(
            "{}{}{}.{}",
            self.prefix, stem, self.postfix, self.video_format
        ))
    }

    /// Arguments for a single-pass encode of `input` into `output`.
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.video_codec.clone(),
        ];
        match self.quality_mode {
            QualityMode::Crf => {
                args.push("-crf".to_string());
                args.push(self.quality_value.to_string());
            }
            QualityMode::Bitrate => {
                args.push("-b:v".to_string());
                args.push(format!("{}k", self.quality_value));
            }
        }
        self.push_scale(&mut args);
        self.push_audio(&mut args);
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Arguments for both passes of a bitrate encode.
    ///
    /// The first pass analyses video only and discards its output; both
    /// passes share the `passlog` prefix.
    pub fn two_pass_args(
        &self,
        input: &Path,
        output: &Path,
        passlog: &Path,
    ) -> (Vec<String>, Vec<String>) {
        let pass = |n: &str| {
            vec![
                "-i".to_string(),
                input.to_string_lossy().to_string(),
                "-c:v".to_string(),
                self.video_codec.clone(),
                "-b:v".to_string(),
                format!("{}k", self.quality_value),
                "-pass".to_string(),
                n.to_string(),
                "-passlogfile".to_string(),
                passlog.to_string_lossy().to_string(),
            ]
        };

        let mut first = pass("1");
        first.extend(["-an", "-f", "null", "-y"].map(String::from));
        self.push_scale(&mut first);
        first.push(null_sink().to_string());

        let mut second = pass("2");
        self.push_scale(&mut second);
        self.push_audio(&mut second);
        second.push(output.to_string_lossy().to_string());

        (first, second)
    }

    fn push_scale(&self, args: &mut Vec<String>) {
        if let Some((width, height)) = self.scale() {
            args.push("-vf".to_string());
            args.push(format!("scale={}:{}", width, height));
        }
    }

    fn push_audio(&self, args: &mut Vec<String>) {
        args.push("-c:a".to_string());
        if self.audio_codec.is_empty() {
            args.push("copy".to_string());
        } else {
            args.push(self.audio_codec.clone());
        }
        if self.audio_bitrate_kbps > 0 {
            args.push("-b:a".to_string());
            args.push(format!("{}k", self.audio_bitrate_kbps));
        }
        if self.audio_sample_rate > 0 {
            args.push("-ar".to_string());
            args.push(self.audio_sample_rate.to_string());
        }
    }
}

fn null_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

/// Editable state behind the options editor.
///
/// CRF and bitrate values are kept separately so switching modes does not
/// lose either one.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsDraft {
    pub video_format: String,
    pub video_codec: String,
    pub quality_mode: QualityMode,
    pub crf_value: u32,
    pub bitrate_kbps: u32,
    pub two_pass: bool,
    pub resize: bool,
    pub width: u32,
    pub height: u32,
    pub output_dir: Option<PathBuf>,
    pub prefix: String,
    pub postfix: String,
}

impl OptionsDraft {
    pub fn from_defaults(defaults: &EncodingDefaults) -> Self {
        let mut draft = Self {
            video_format: defaults.video_format.clone(),
            video_codec: String::new(),
            quality_mode: QualityMode::Crf,
            crf_value: 23,
            bitrate_kbps: defaults.bitrate_kbps,
            two_pass: false,
            resize: false,
            width: 0,
            height: 0,
            output_dir: defaults.output_dir.clone(),
            prefix: defaults.prefix.clone(),
            postfix: defaults.postfix.clone(),
        };
        draft.set_codec(&defaults.video_codec);
        draft
    }

    /// Select a codec and load its quality defaults.
    pub fn set_codec(&mut self, codec: &str) {
        self.video_codec = codec.to_string();
        if let Some(defaults) = codec_defaults(codec) {
            self.quality_mode = defaults.mode;
            self.crf_value = defaults.default_value;
        }
    }

    /// Select an output format and reconcile the codec with the engine's list.
    ///
    /// Returns the codec selected afterwards, `None` when the engine offers
    /// nothing for the format (the previous codec is left in place).
    pub fn set_format(&mut self, format: &str, available: &[CodecInfo]) -> Option<String> {
        self.video_format = format.to_string();
        let codec = reconcile_codec(available, format, &self.video_codec)?;
        if codec != self.video_codec {
            log::debug!(
                "codec {} not offered for {}, switching to {}",
                self.video_codec,
                format,
                codec
            );
            self.set_codec(&codec);
        }
        Some(codec)
    }

    /// Snapshot the draft into the payload for one batch.
    pub fn build(&self) -> EncodingOptions {
        let quality_value = match self.quality_mode {
            QualityMode::Crf => self.crf_value,
            QualityMode::Bitrate => self.bitrate_kbps,
        };
        EncodingOptions {
            video_format: self.video_format.clone(),
            video_codec: self.video_codec.clone(),
            quality_mode: self.quality_mode,
            quality_value,
            two_pass: self.quality_mode == QualityMode::Bitrate && self.two_pass,
            resize: self.resize,
            width: self.width,
            height: self.height,
            output_dir: self.output_dir.clone(),
            prefix: self.prefix.clone(),
            postfix: self.postfix.clone(),
            audio_codec: String::new(),
            audio_bitrate_kbps: 0,
            audio_sample_rate: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::HardwareClass;
    use proptest::prelude::*;

    fn draft() -> OptionsDraft {
        OptionsDraft::from_defaults(&EncodingDefaults::default())
    }

    fn engine_codecs() -> Vec<CodecInfo> {
        vec![
            CodecInfo::new("h264", "H.264 (CPU)", HardwareClass::Cpu, &["mp4"]),
            CodecInfo::new("hevc", "HEVC (CPU)", HardwareClass::Cpu, &["mp4"]),
            CodecInfo::new("vp8", "VP8", HardwareClass::Cpu, &["webm"]),
            CodecInfo::new("vp9", "VP9", HardwareClass::Cpu, &["webm"]),
        ]
    }

    #[test]
    fn test_draft_defaults() {
        let d = draft();
        assert_eq!(d.video_format, "mp4");
        assert_eq!(d.video_codec, "h264");
        assert_eq!(d.quality_mode, QualityMode::Crf);
        assert_eq!(d.crf_value, 23);
        assert_eq!(d.bitrate_kbps, 5000);
        assert_eq!(d.prefix, "encoded_");
    }

    #[test]
    fn test_set_codec_loads_defaults() {
        let mut d = draft();
        d.quality_mode = QualityMode::Bitrate;
        d.crf_value = 40;
        d.set_codec("hevc");
        assert_eq!(d.quality_mode, QualityMode::Crf);
        assert_eq!(d.crf_value, 28);

        // No defaults for vp8: previous quality settings stay.
        d.crf_value = 12;
        d.set_codec("vp8");
        assert_eq!(d.video_codec, "vp8");
        assert_eq!(d.crf_value, 12);
    }

    #[test]
    fn test_set_format_switches_incompatible_codec() {
        let mut d = draft();
        let codec = d.set_format("webm", &engine_codecs());
        assert_eq!(codec.as_deref(), Some("vp8"));
        assert_eq!(d.video_format, "webm");
        assert_eq!(d.video_codec, "vp8");
    }

    #[test]
    fn test_set_format_keeps_compatible_codec() {
        let mut d = draft();
        d.set_codec("hevc");
        d.crf_value = 20;
        assert_eq!(d.set_format("mp4", &engine_codecs()).as_deref(), Some("hevc"));
        assert_eq!(d.crf_value, 20);
    }

    #[test]
    fn test_set_format_without_offers_keeps_codec() {
        let mut d = draft();
        assert_eq!(d.set_format("webm", &[]), None);
        assert_eq!(d.video_format, "webm");
        assert_eq!(d.video_codec, "h264");
    }

    #[test]
    fn test_build_takes_value_for_mode() {
        let mut d = draft();
        d.two_pass = true;
        let crf = d.build();
        assert_eq!(crf.quality_mode, QualityMode::Crf);
        assert_eq!(crf.quality_value, 23);
        assert!(!crf.two_pass, "two-pass is only honored in bitrate mode");

        d.quality_mode = QualityMode::Bitrate;
        let br = d.build();
        assert_eq!(br.quality_value, 5000);
        assert!(br.two_pass);
        assert!(br.is_two_pass());
        assert!(br.audio_codec.is_empty());
        assert_eq!(br.audio_bitrate_kbps, 0);
        assert_eq!(br.audio_sample_rate, 0);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let opts = draft().build().validate().unwrap();
        assert_eq!(opts.quality_value, 23);
    }

    #[test]
    fn test_validate_fills_zero_crf() {
        let mut opts = draft().build();
        opts.video_codec = "hevc_nvenc".to_string();
        opts.quality_value = 0;
        assert_eq!(opts.validate().unwrap().quality_value, 28);
    }

    #[test]
    fn test_validate_rejects_unknown_format_and_codec() {
        let mut opts = draft().build();
        opts.video_format = "avi".to_string();
        assert_eq!(
            opts.clone().validate().unwrap_err(),
            OptionsError::UnsupportedFormat("avi".to_string())
        );

        opts.video_format = "webm".to_string();
        assert!(matches!(
            opts.validate().unwrap_err(),
            OptionsError::UnsupportedCodec { .. }
        ));
    }

    #[test]
    fn test_validate_crf_range() {
        let mut opts = draft().build();
        opts.quality_value = 52;
        assert_eq!(
            opts.validate().unwrap_err(),
            OptionsError::QualityOutOfRange {
                codec: "h264".to_string(),
                value: 52,
                min: 0,
                max: 51
            }
        );
    }

    #[test]
    fn test_validate_bitrate_skips_crf_range() {
        let mut d = draft();
        d.quality_mode = QualityMode::Bitrate;
        d.bitrate_kbps = 8000;
        d.two_pass = true;
        assert!(d.build().validate().is_ok());

        d.bitrate_kbps = 0;
        assert_eq!(d.build().validate().unwrap_err(), OptionsError::ZeroBitrate);
    }

    #[test]
    fn test_validate_two_pass_requires_bitrate() {
        let mut opts = draft().build();
        opts.two_pass = true;
        assert_eq!(opts.validate().unwrap_err(), OptionsError::TwoPassRequiresBitrate);
    }

    #[test]
    fn test_output_path_next_to_input() {
        let opts = draft().build();
        assert_eq!(
            opts.output_path(Path::new("/media/in/holiday.mov")),
            PathBuf::from("/media/in/encoded_holiday.mp4")
        );
    }

    #[test]
    fn test_output_path_with_dir_and_postfix() {
        let mut d = draft();
        d.output_dir = Some(PathBuf::from("/exports"));
        d.prefix = String::new();
        d.postfix = "_small".to_string();
        d.set_format("webm", &engine_codecs());
        assert_eq!(
            d.build().output_path(Path::new("/media/in/holiday.mov")),
            PathBuf::from("/exports/holiday_small.webm")
        );
    }

    #[test]
    fn test_scale_requires_positive_dimensions() {
        let mut opts = draft().build();
        opts.resize = true;
        opts.width = 1280;
        assert_eq!(opts.scale(), None);
        opts.height = 720;
        assert_eq!(opts.scale(), Some((1280, 720)));
        opts.resize = false;
        assert_eq!(opts.scale(), None);
    }

    #[test]
    fn test_ffmpeg_args_crf() {
        let opts = draft().build();
        let args = opts.ffmpeg_args(Path::new("/in/a.mov"), Path::new("/out/a.mp4"));
        assert_eq!(
            args,
            vec!["-i", "/in/a.mov", "-c:v", "h264", "-crf", "23", "-c:a", "copy", "/out/a.mp4"]
        );
    }

    #[test]
    fn test_ffmpeg_args_bitrate_resize_audio() {
        let mut opts = draft().build();
        opts.quality_mode = QualityMode::Bitrate;
        opts.quality_value = 2500;
        opts.resize = true;
        opts.width = 1280;
        opts.height = 720;
        opts.audio_codec = "aac".to_string();
        opts.audio_bitrate_kbps = 128;
        opts.audio_sample_rate = 48000;

        let args = opts.ffmpeg_args(Path::new("a.mov"), Path::new("b.mp4"));
        assert_eq!(
            args,
            vec![
                "-i", "a.mov", "-c:v", "h264", "-b:v", "2500k", "-vf", "scale=1280:720", "-c:a",
                "aac", "-b:a", "128k", "-ar", "48000", "b.mp4"
            ]
        );
    }

    #[test]
    fn test_two_pass_args() {
        let mut d = draft();
        d.quality_mode = QualityMode::Bitrate;
        d.bitrate_kbps = 4000;
        d.two_pass = true;
        let opts = d.build();

        let (first, second) = opts.two_pass_args(
            Path::new("a.mov"),
            Path::new("b.mp4"),
            Path::new("/tmp/passlog"),
        );
        assert_eq!(&first[..10], &["-i", "a.mov", "-c:v", "h264", "-b:v", "4000k", "-pass", "1", "-passlogfile", "/tmp/passlog"]);
        assert!(first.contains(&"-an".to_string()));
        assert_eq!(first.last().map(String::as_str), Some(null_sink()));
        assert!(!first.contains(&"-c:a".to_string()));

        assert_eq!(second[7], "2");
        assert!(second.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert_eq!(second.last().map(String::as_str), Some("b.mp4"));
    }

    // **Feature: batch-encoder, Property 6: Two-Pass Only in Bitrate Mode**
    //
    // *For any* draft, the built options SHALL request two passes only when the
    // draft is in bitrate mode, and SHALL carry the value of the active mode.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_build_respects_mode(
            mode in prop_oneof![Just(QualityMode::Crf), Just(QualityMode::Bitrate)],
            two_pass in proptest::bool::ANY,
            crf in 0u32..64,
            kbps in 1u32..100_000,
        ) {
            let mut d = draft();
            d.quality_mode = mode;
            d.two_pass = two_pass;
            d.crf_value = crf;
            d.bitrate_kbps = kbps;

            let opts = d.build();
            prop_assert_eq!(opts.two_pass, two_pass && mode == QualityMode::Bitrate);
            let expected = if mode == QualityMode::Crf { crf } else { kbps };
            prop_assert_eq!(opts.quality_value, expected);
        }
    }
}
