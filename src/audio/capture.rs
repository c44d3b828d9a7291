//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin streaming [`AudioChunk`]s over an mpsc
//! channel.  The returned [`StreamHandle`] is a RAII guard; dropping it
//! stops the underlying cpal stream.
//!
//! The stream runs for the lifetime of the daemon.  Whether samples are
//! retained is decided downstream by the [`crate::audio::Recorder`] flag, so
//! recording start/stop never touches the device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` normalized to `[-1.0, 1.0]` at the device's
/// native rate; the accumulator downmixes and resamples before retention.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, ...).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// AudioDevice
// ---------------------------------------------------------------------------

/// Description of an input device, as listed by
/// [`AudioCapture::list_devices`].
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Index usable as `AudioConfig::device_index`.
    pub index: usize,
    /// Device name as reported by the platform.
    pub name: String,
    /// Default sample rate in Hz.
    pub sample_rate: u32,
    /// Input channel count.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value stops the underlying hardware stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
///
/// Microphone permission problems surface through the platform error inside
/// [`CaptureError::BuildStream`] / [`CaptureError::PlayStream`]; all
/// variants are fatal at startup.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("no input device at index {0}")]
    DeviceIndex(usize),

    #[error("device '{name}' has no usable input channels")]
    DeviceUnsupported { name: String },

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::mpsc;
/// use push_to_talk::audio::{AudioCapture, AudioChunk};
///
/// let (tx, rx) = mpsc::channel::<AudioChunk>();
/// let capture = AudioCapture::new(None).unwrap();
/// let _handle = capture.start(tx).unwrap();
/// // `_handle` keeps the stream alive; drop it to stop capturing.
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Open the default input device, or the device at `device_index` as
    /// enumerated by [`AudioCapture::list_devices`].
    ///
    /// An explicitly selected device is verified to expose at least one
    /// input channel before any stream is acquired, so misconfiguration
    /// fails here rather than mid-session.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] / [`CaptureError::DeviceIndex`] when the
    /// requested device does not exist, [`CaptureError::DeviceUnsupported`]
    /// when it cannot capture, [`CaptureError::DefaultConfig`] when it
    /// reports no stream configuration (the usual shape of a permission
    /// denial).
    pub fn new(device_index: Option<usize>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = match device_index {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(index) => host
                .input_devices()?
                .nth(index)
                .ok_or(CaptureError::DeviceIndex(index))?,
        };

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        if channels == 0 {
            return Err(CaptureError::DeviceUnsupported {
                name: device.name().unwrap_or_else(|_| "<unknown>".into()),
            });
        }

        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start the stream and send [`AudioChunk`]s to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; each time the
    /// hardware delivers a buffer the raw `f32` samples are wrapped in an
    /// [`AudioChunk`] and forwarded over the channel.  Send errors (receiver
    /// dropped) are silently ignored so the audio thread never panics.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                };
                let _ = tx.send(chunk);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None, // no timeout
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels in each [`AudioChunk`].
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Enumerate input devices on the default host.
    pub fn list_devices() -> Result<Vec<AudioDevice>, CaptureError> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        for (index, device) in host.input_devices()?.enumerate() {
            let name = device.name().unwrap_or_else(|_| "<unknown>".into());
            // A device that cannot report an input config is not usable for
            // capture; skip it rather than failing the whole listing.
            let Ok(config) = device.default_input_config() else {
                continue;
            };
            devices.push(AudioDevice {
                index,
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            });
        }

        Ok(devices)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `AudioChunk` must be `Send` so it can cross thread boundaries.
    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn audio_chunk_fields() {
        let chunk = AudioChunk {
            samples: vec![0.0_f32; 512],
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(chunk.samples.len(), 512);
        assert_eq!(chunk.sample_rate, 48_000);
        assert_eq!(chunk.channels, 2);
    }

    #[test]
    fn capture_error_display_mentions_index() {
        let e = CaptureError::DeviceIndex(7);
        assert!(e.to_string().contains('7'));
    }
}
