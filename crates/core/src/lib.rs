//! Batch Encoder
//!
//! Job registry and progress aggregation for batch media encoding. Engine
//! events (discovery, discovery failures, progress) are routed into a single
//! registry that keeps per-job state, the selection and the overall percentage.

pub mod capability;
pub mod controller;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod jobs;
pub mod options;
pub mod progress;
pub mod registry;
pub mod selection;
pub mod snapshot;
pub mod status_server;
pub mod timefmt;

#[cfg(test)]
pub(crate) mod testing;

pub use batch_encoder_config as config;
pub use batch_encoder_config::Config;
pub use capability::{
    codec_defaults, codecs_for_format, compatible_codecs, format_permits_codec, reconcile_codec,
    CodecDefaults, CodecInfo, HardwareClass, SUPPORTED_FORMATS,
};
pub use controller::{ActivityFlags, BatchReport, ControllerError, EncodingController};
pub use dispatcher::{EventDispatcher, RoutingWatch};
pub use engine::{EncodingEngine, EngineError, FfmpegEngine};
pub use events::{
    EncodingProgress, EngineEvent, EventChannel, EventHub, FileDiscovered, FileDiscoveryFailed,
    HubError, ProgressStatus, Subscriptions,
};
pub use jobs::{Job, JobStatus, LiveStats};
pub use options::{EncodingOptions, OptionsDraft, OptionsError, QualityMode};
pub use progress::{job_percent, overall_percent};
pub use registry::{JobRegistry, SharedRegistry};
pub use selection::SelectionSet;
pub use snapshot::{JobRow, RegistrySnapshot};
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use timefmt::{format_duration, format_size, parse_clock, TimeParseError};
