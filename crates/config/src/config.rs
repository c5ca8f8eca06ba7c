//! Configuration for the batch encoder: engine binaries, encoding defaults and the status server.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Failure to read or parse a configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// External tool locations and timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// ffmpeg executable (looked up in PATH when not absolute)
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: PathBuf,
    /// ffprobe executable
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: PathBuf,
    /// Upper bound for a single ffprobe call
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Upper bound for `ffmpeg -encoders` and GPU detection
    #[serde(default = "default_codec_probe_timeout_secs")]
    pub codec_probe_timeout_secs: u64,
}

fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_bin() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_codec_probe_timeout_secs() -> u64 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
            probe_timeout_secs: default_probe_timeout_secs(),
            codec_probe_timeout_secs: default_codec_probe_timeout_secs(),
        }
    }
}

/// Initial values for the encoding options editor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingDefaults {
    /// Output container format (default "mp4")
    #[serde(default = "default_video_format")]
    pub video_format: String,
    /// Output video codec (default "h264")
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Target bitrate used when switching to bitrate mode (default 5000)
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    /// Prefix prepended to output file names (default "encoded_")
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Postfix appended to output file stems
    #[serde(default)]
    pub postfix: String,
    /// Output directory; next to the source file when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_video_format() -> String {
    "mp4".to_string()
}

fn default_video_codec() -> String {
    "h264".to_string()
}

fn default_bitrate_kbps() -> u32 {
    5000
}

fn default_prefix() -> String {
    "encoded_".to_string()
}

impl Default for EncodingDefaults {
    fn default() -> Self {
        Self {
            video_format: default_video_format(),
            video_codec: default_video_codec(),
            bitrate_kbps: default_bitrate_kbps(),
            prefix: default_prefix(),
            postfix: String::new(),
            output_dir: None,
        }
    }
}

/// Read-only HTTP endpoint exposing the job registry snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_bind")]
    pub bind: String,
}

fn default_status_bind() -> String {
    "127.0.0.1:7879".to_string()
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_status_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub encoding: EncodingDefaults,
    #[serde(default)]
    pub status_server: StatusServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - ENCODER_FFMPEG_BIN -> engine.ffmpeg_bin
    /// - ENCODER_FFPROBE_BIN -> engine.ffprobe_bin
    /// - ENCODER_OUTPUT_DIR -> encoding.output_dir
    /// - ENCODER_VIDEO_FORMAT -> encoding.video_format
    /// - ENCODER_VIDEO_CODEC -> encoding.video_codec
    /// - ENCODER_STATUS_SERVER -> status_server.enabled
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = non_empty_var("ENCODER_FFMPEG_BIN") {
            self.engine.ffmpeg_bin = PathBuf::from(val);
        }

        if let Some(val) = non_empty_var("ENCODER_FFPROBE_BIN") {
            self.engine.ffprobe_bin = PathBuf::from(val);
        }

        if let Some(val) = non_empty_var("ENCODER_OUTPUT_DIR") {
            self.encoding.output_dir = Some(PathBuf::from(val));
        }

        if let Some(val) = non_empty_var("ENCODER_VIDEO_FORMAT") {
            self.encoding.video_format = val.to_lowercase();
        }

        if let Some(val) = non_empty_var("ENCODER_VIDEO_CODEC") {
            self.encoding.video_codec = val.to_lowercase();
        }

        if let Ok(val) = env::var("ENCODER_STATUS_SERVER") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.status_server.enabled = true,
                "false" | "0" | "no" => self.status_server.enabled = false,
                _ => {} // Invalid value, keep existing
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides, for runs without a config file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("ENCODER_FFMPEG_BIN");
        env::remove_var("ENCODER_FFPROBE_BIN");
        env::remove_var("ENCODER_OUTPUT_DIR");
        env::remove_var("ENCODER_VIDEO_FORMAT");
        env::remove_var("ENCODER_VIDEO_CODEC");
        env::remove_var("ENCODER_STATUS_SERVER");
    }

    // **Feature: batch-encoder, Property 1: Configuration Parsing**
    //
    // *For any* valid TOML configuration string, every section (engine, encoding,
    // status_server) SHALL be parsed with the values it contains.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            ffmpeg in "/[a-z]{1,10}/ffmpeg",
            probe_timeout in 1u64..600,
            format in prop_oneof![Just("mp4"), Just("webm")],
            codec in "[a-z0-9_]{2,12}",
            bitrate in 100u32..100_000,
            prefix in "[a-z_]{0,10}",
            enabled in proptest::bool::ANY,
        ) {
            let toml_str = format!(
                r#"
[engine]
ffmpeg_bin = "{}"
probe_timeout_secs = {}

[encoding]
video_format = "{}"
video_codec = "{}"
bitrate_kbps = {}
prefix = "{}"

[status_server]
enabled = {}
"#,
                ffmpeg, probe_timeout, format, codec, bitrate, prefix, enabled
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.engine.ffmpeg_bin, PathBuf::from(&ffmpeg));
            prop_assert_eq!(config.engine.ffprobe_bin, PathBuf::from("ffprobe"));
            prop_assert_eq!(config.engine.probe_timeout_secs, probe_timeout);
            prop_assert_eq!(config.encoding.video_format, format);
            prop_assert_eq!(config.encoding.video_codec, codec);
            prop_assert_eq!(config.encoding.bitrate_kbps, bitrate);
            prop_assert_eq!(config.encoding.prefix, prefix);
            prop_assert_eq!(config.status_server.enabled, enabled);
        }

        #[test]
        fn prop_env_overrides_output_dir(
            initial in proptest::option::of("/[a-z]{1,10}"),
            override_dir in "/[a-z]{1,10}/[a-z]{1,10}",
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[encoding]
{}
"#,
                initial.map(|d| format!("output_dir = \"{}\"", d)).unwrap_or_default()
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("ENCODER_OUTPUT_DIR", &override_dir);
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.encoding.output_dir, Some(PathBuf::from(override_dir)));
        }

        #[test]
        fn prop_env_overrides_status_server(
            initial in proptest::bool::ANY,
            override_enabled in proptest::bool::ANY,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[status_server]
enabled = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("ENCODER_STATUS_SERVER", override_enabled.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.status_server.enabled, override_enabled);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.engine.ffmpeg_bin, PathBuf::from("ffmpeg"));
        assert_eq!(config.engine.ffprobe_bin, PathBuf::from("ffprobe"));
        assert_eq!(config.engine.probe_timeout_secs, 30);
        assert_eq!(config.engine.codec_probe_timeout_secs, 5);
        assert_eq!(config.encoding.video_format, "mp4");
        assert_eq!(config.encoding.video_codec, "h264");
        assert_eq!(config.encoding.bitrate_kbps, 5000);
        assert_eq!(config.encoding.prefix, "encoded_");
        assert_eq!(config.encoding.postfix, "");
        assert!(config.encoding.output_dir.is_none());
        assert!(!config.status_server.enabled);
        assert_eq!(config.status_server.bind, "127.0.0.1:7879");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[encoding]
video_codec = "hevc"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.encoding.video_codec, "hevc");
        assert_eq!(config.encoding.video_format, "mp4"); // default
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.status_server, StatusServerConfig::default());
    }

    #[test]
    fn test_env_override_lowercases_codec_and_ignores_blank() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("ENCODER_VIDEO_CODEC", "HEVC_NVENC");
        env::set_var("ENCODER_FFMPEG_BIN", "   ");
        env::set_var("ENCODER_STATUS_SERVER", "maybe");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.encoding.video_codec, "hevc_nvenc");
        assert_eq!(config.engine.ffmpeg_bin, PathBuf::from("ffmpeg"));
        assert!(!config.status_server.enabled);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::parse_toml("[engine\nffmpeg_bin = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load_from_file("/nonexistent/batch-encoder/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
