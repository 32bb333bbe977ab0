//! wf-engine: Frame-driven audio playback engine for WaveFrame
//!
//! Sits between the dataflow graph runtime and the audio backend. Graph
//! operators are evaluated once per display frame; this crate turns those
//! per-frame parameter snapshots into continuous playback:
//!
//! - edge-triggered play/stop from level-style operator inputs
//! - a three-tier mixer topology (device output, operator bus, soundtrack bus)
//! - stale-muting of operators that drop out of the evaluated graph
//! - 2D and 3D stream variants with live parameter updates
//! - timeline soundtrack clips with drift-corrected seeking
//! - offline export mixdown with per-operator metering overrides
//!
//! Construct an [`AudioEngine`] from an [`EngineContext`]; one logical thread
//! drives all engine calls.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod export;
pub mod metering;
pub mod resolve;
pub mod soundtrack;
pub mod stream;
pub mod topology;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use engine::{AudioEngine, SpatialUpdate, StereoUpdate};
pub use error::{EngineError, EngineResult};
pub use export::ExportSpec;
pub use metering::{MeterOverride, MeterSnapshot};
pub use resolve::{FsResolver, PathResolver};
pub use soundtrack::SoundtrackUpdate;
pub use stream::{
    MAX_SPEED, MAX_STREAM_DURATION_SECS, MIN_SPEED, SEEK_EPSILON_SECS, SpatialParams,
    StereoParams, StreamKind,
};
pub use topology::MixerSet;

// The id, math, and metering-size types appear throughout the public API.
pub use wf_backend::{AudioBackend, BackendConfig, DeviceEvent, DeviceInitMode, Spatial3dMode};
pub use wf_core::{ClipId, ListenerPose, OperatorId, SPECTRUM_LEN, Vec3, WAVEFORM_LEN};
