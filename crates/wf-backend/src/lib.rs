//! wf-backend: audio backend interface and software implementation
//!
//! Provides:
//! - [`AudioBackend`]: the capability trait the engine drives (device
//!   lifecycle, mixers, decode channels, metering readback, 3D attributes)
//! - [`SoftwareBackend`]: in-process implementation built on symphonia
//!   decoding, a recursive software mixer graph, and cpal output
//! - [`decode_file`] / [`DecodedAudio`]: standalone file decoding
//! - the 3D gain model shared by live playback

mod api;
mod decode;
mod device;
mod error;
mod software;
mod spatial;

pub use api::{
    AudioBackend, BackendConfig, ChannelHandle, ChannelInfo, DeviceEvent, DeviceInitMode,
    MixerHandle, MixerKind, Spatial3dMode,
};
pub use decode::{DecodedAudio, decode_file};
pub use error::{BackendError, BackendResult};
pub use software::SoftwareBackend;
pub use spatial::{Spatial3d, spatial_gain};
