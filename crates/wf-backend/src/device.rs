//! Output device handling
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! that parks until the backend asks it to stop. Open results are reported
//! back over a bounded channel so the caller sees device failures
//! synchronously and can fall through its init mode chain.

use crate::api::{BackendConfig, DeviceEvent, DeviceInitMode};
use crate::error::{BackendError, BackendResult};
use crate::software::Inner;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub(crate) struct DeviceStream {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl DeviceStream {
    pub(crate) fn open(
        mode: DeviceInitMode,
        config: &BackendConfig,
        inner: Arc<Inner>,
    ) -> BackendResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let (ready_tx, ready_rx) = bounded::<BackendResult<(u32, u16)>>(1);
        let config = *config;

        let handle = thread::Builder::new()
            .name("wf-audio-output".into())
            .spawn(move || run_output_stream(mode, config, inner, stop_flag, ready_tx))
            .map_err(|e| BackendError::DeviceInit(format!("spawn output thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok((sample_rate, channels))) => Ok(Self {
                stop,
                thread: Some(handle),
                sample_rate,
                channels,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(BackendError::DeviceInit(
                    "output thread exited before reporting".into(),
                ))
            }
        }
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_output_stream(
    mode: DeviceInitMode,
    config: BackendConfig,
    inner: Arc<Inner>,
    stop: Arc<AtomicBool>,
    ready: Sender<BackendResult<(u32, u16)>>,
) {
    match open_stream(mode, &config, &inner) {
        Ok((stream, sample_rate, channels)) => {
            let _ = ready.send(Ok((sample_rate, channels)));
            while !stop.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

fn open_stream(
    mode: DeviceInitMode,
    config: &BackendConfig,
    inner: &Arc<Inner>,
) -> BackendResult<(cpal::Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(BackendError::NoDevice)?;

    let stream_config = match mode {
        DeviceInitMode::LowLatency => {
            // Buffer sized to the update period so attribute changes land
            // within one UI frame.
            let frames = (config.sample_rate * config.update_period_ms / 1000).max(64);
            cpal::StreamConfig {
                channels: config.channels,
                sample_rate: config.sample_rate,
                buffer_size: cpal::BufferSize::Fixed(frames),
            }
        }
        DeviceInitMode::Stereo => {
            let default = device
                .default_output_config()
                .map_err(|e| BackendError::DeviceInit(format!("default config: {e}")))?;
            cpal::StreamConfig {
                channels: 2,
                sample_rate: default.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            }
        }
        DeviceInitMode::Default => device
            .default_output_config()
            .map_err(|e| BackendError::DeviceInit(format!("default config: {e}")))?
            .config(),
    };

    let sample_rate = stream_config.sample_rate;
    let channels = stream_config.channels;
    let render = Arc::clone(inner);
    let events = inner.event_sender();

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render.render_device_block(data, sample_rate, channels);
            },
            move |err| {
                log::warn!("[SoftwareBackend] output stream error: {err}");
                let _ = events.send(DeviceEvent::Invalidated);
            },
            None,
        )
        .map_err(|e| BackendError::DeviceInit(format!("build stream ({mode:?}): {e}")))?;

    stream
        .play()
        .map_err(|e| BackendError::DeviceInit(format!("start stream: {e}")))?;

    Ok((stream, sample_rate, channels))
}
