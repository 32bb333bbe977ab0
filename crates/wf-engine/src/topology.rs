//! Mixer topology manager
//!
//! Owns the three-tier mixer graph and the device lifecycle. Only the global
//! mixer ever touches the physical device; the operator and soundtrack mixers
//! are decode-only aggregators that feed it through buffered attachments, so
//! export can read them directly without disturbing device output.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use wf_backend::{AudioBackend, DeviceInitMode, MixerHandle, MixerKind};

/// Handles for the three mixer tiers, valid while initialized.
#[derive(Debug, Clone, Copy)]
pub struct MixerSet {
    /// Device-facing float mixer; paused only during export.
    pub global: MixerHandle,
    /// Decode-only aggregation of operator streams.
    pub operator: MixerHandle,
    /// Decode-only aggregation of timeline clips.
    pub soundtrack: MixerHandle,
}

/// Volume plus an independent mute. Muting pushes zero to the backend while
/// the stored volume survives for unmute.
struct BusGain {
    volume: f32,
    muted: bool,
}

impl BusGain {
    fn new() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }

    fn effective(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }
}

pub struct MixerTopology {
    mixers: Option<MixerSet>,
    global_gain: BusGain,
    operator_gain: BusGain,
    soundtrack_gain: BusGain,
}

impl MixerTopology {
    pub fn new() -> Self {
        Self {
            mixers: None,
            global_gain: BusGain::new(),
            operator_gain: BusGain::new(),
            soundtrack_gain: BusGain::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.mixers.is_some()
    }

    pub fn mixers(&self) -> Option<&MixerSet> {
        self.mixers.as_ref()
    }

    /// Bring the device and the mixer graph up. Idempotent.
    ///
    /// Latency configuration is pushed before device init. Device init walks
    /// the fallback chain low-latency, stereo, default, logging one warning
    /// per step that fails; only when all three fail does this return
    /// `DeviceInitFailure` (logged once as an error).
    pub fn initialize(&mut self, backend: &dyn AudioBackend, config: &EngineConfig) -> EngineResult<()> {
        if self.mixers.is_some() {
            return Ok(());
        }

        backend
            .configure(&config.backend_config())
            .map_err(|e| EngineError::DeviceInitFailure(e.to_string()))?;

        let chain = [
            DeviceInitMode::LowLatency,
            DeviceInitMode::Stereo,
            DeviceInitMode::Default,
        ];
        let mut device_up = false;
        for mode in chain {
            match backend.init_device(mode) {
                Ok(()) => {
                    device_up = true;
                    break;
                }
                Err(e) => {
                    log::warn!("[MixerTopology] device init ({mode:?}) failed: {e}");
                }
            }
        }
        if !device_up {
            log::error!("[MixerTopology] all device init modes failed; engine stays silent");
            return Err(EngineError::DeviceInitFailure(
                "all device init modes failed".into(),
            ));
        }

        // Mixers in dependency order: global first, then the aggregators.
        let global = match backend.create_mixer(config.sample_rate, config.channels, MixerKind::DeviceOutput)
        {
            Ok(handle) => handle,
            Err(e) => {
                backend.close_device();
                return Err(EngineError::DeviceInitFailure(format!("global mixer: {e}")));
            }
        };
        let operator = match backend.create_mixer(config.sample_rate, config.channels, MixerKind::DecodeOnly)
        {
            Ok(handle) => handle,
            Err(e) => {
                backend.free_mixer(global);
                backend.close_device();
                return Err(EngineError::DeviceInitFailure(format!("operator mixer: {e}")));
            }
        };
        let soundtrack = match backend.create_mixer(config.sample_rate, config.channels, MixerKind::DecodeOnly)
        {
            Ok(handle) => handle,
            Err(e) => {
                backend.free_mixer(operator);
                backend.free_mixer(global);
                backend.close_device();
                return Err(EngineError::DeviceInitFailure(format!("soundtrack mixer: {e}")));
            }
        };

        // Buffered attachments smooth scheduling jitter between the decode
        // aggregators and the device-facing mixer.
        for child in [operator, soundtrack] {
            if let Err(e) = backend.attach_mixer(global, child, true) {
                backend.free_mixer(soundtrack);
                backend.free_mixer(operator);
                backend.free_mixer(global);
                backend.close_device();
                return Err(EngineError::MixerAttachFailure(e.to_string()));
            }
        }

        // Gains survive a teardown/reinit cycle; push the stored values.
        backend.set_mixer_volume(global, self.global_gain.effective());
        backend.set_mixer_volume(operator, self.operator_gain.effective());
        backend.set_mixer_volume(soundtrack, self.soundtrack_gain.effective());

        self.mixers = Some(MixerSet {
            global,
            operator,
            soundtrack,
        });
        log::info!(
            "[MixerTopology] initialized ({} Hz, {} ch)",
            config.sample_rate,
            config.channels
        );
        Ok(())
    }

    /// Free the mixers, close the device, reset to uninitialized.
    pub fn shutdown(&mut self, backend: &dyn AudioBackend) {
        if let Some(set) = self.mixers.take() {
            backend.free_mixer(set.soundtrack);
            backend.free_mixer(set.operator);
            backend.free_mixer(set.global);
            log::debug!("[MixerTopology] mixers freed");
        }
        backend.close_device();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BUS GAINS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_global_volume(&mut self, backend: &dyn AudioBackend, volume: f32) {
        self.global_gain.volume = volume.max(0.0);
        self.push_global(backend);
    }

    pub fn set_global_mute(&mut self, backend: &dyn AudioBackend, muted: bool) {
        self.global_gain.muted = muted;
        self.push_global(backend);
    }

    pub fn set_operator_volume(&mut self, backend: &dyn AudioBackend, volume: f32) {
        self.operator_gain.volume = volume.max(0.0);
        self.push_operator(backend);
    }

    pub fn set_operator_mute(&mut self, backend: &dyn AudioBackend, muted: bool) {
        self.operator_gain.muted = muted;
        self.push_operator(backend);
    }

    pub fn set_soundtrack_volume(&mut self, backend: &dyn AudioBackend, volume: f32) {
        self.soundtrack_gain.volume = volume.max(0.0);
        self.push_soundtrack(backend);
    }

    pub fn set_soundtrack_mute(&mut self, backend: &dyn AudioBackend, muted: bool) {
        self.soundtrack_gain.muted = muted;
        self.push_soundtrack(backend);
    }

    fn push_global(&self, backend: &dyn AudioBackend) {
        if let Some(set) = &self.mixers {
            backend.set_mixer_volume(set.global, self.global_gain.effective());
        }
    }

    fn push_operator(&self, backend: &dyn AudioBackend) {
        if let Some(set) = &self.mixers {
            backend.set_mixer_volume(set.operator, self.operator_gain.effective());
        }
    }

    fn push_soundtrack(&self, backend: &dyn AudioBackend) {
        if let Some(set) = &self.mixers {
            backend.set_mixer_volume(set.soundtrack, self.soundtrack_gain.effective());
        }
    }
}

impl Default for MixerTopology {
    fn default() -> Self {
        Self::new()
    }
}
