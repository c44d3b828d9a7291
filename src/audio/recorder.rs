//! Recording buffer with push-to-talk start/stop semantics.
//!
//! [`Recorder`] is the audio surface the session orchestrator sees.  The
//! cpal stream runs continuously; the recorder decides whether incoming
//! frames are retained.  The accumulator thread spawned by
//! [`Recorder::spawn_accumulator`] is the only writer, and both the
//! recording flag and the sample buffer live behind one mutex, so
//! `stop_recording` can never race an in-flight append.
//!
//! The buffer always holds 16 kHz mono f32 samples; downmixing and rate
//! conversion happen on the accumulator thread before the lock is taken.

use std::sync::{mpsc, Arc, Mutex};

use super::capture::AudioChunk;
use super::resample::{to_mono, RateConverter};
use super::TARGET_SAMPLE_RATE;

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

struct RecorderShared {
    samples: Vec<f32>,
    recording: bool,
}

/// Clonable handle to the shared recording buffer.
///
/// # Example
///
/// ```rust
/// use push_to_talk::audio::Recorder;
///
/// let recorder = Recorder::new();
/// recorder.start_recording();
/// recorder.append(&[0.1, 0.2, 0.3]);
/// assert!(recorder.is_recording());
///
/// let audio = recorder.stop_recording();
/// assert_eq!(audio.len(), 3);
/// assert!(!recorder.is_recording());
/// ```
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Mutex<RecorderShared>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(RecorderShared {
                samples: Vec::new(),
                recording: false,
            })),
        }
    }

    /// Begin retaining frames.  Idempotent: calling while already recording
    /// keeps the samples captured so far.
    pub fn start_recording(&self) {
        let mut shared = self.shared.lock().unwrap();
        if shared.recording {
            return;
        }
        shared.samples.clear();
        shared.recording = true;
    }

    /// Stop retaining frames and return the complete 16 kHz mono buffer.
    ///
    /// Returns an empty vector when not recording.  The internal buffer is
    /// cleared either way, transferring ownership of the audio to the
    /// caller.
    pub fn stop_recording(&self) -> Vec<f32> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.recording {
            return Vec::new();
        }
        shared.recording = false;
        std::mem::take(&mut shared.samples)
    }

    /// Stop retaining frames and discard everything captured.
    pub fn cancel_recording(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.recording = false;
        shared.samples.clear();
    }

    /// Whether frames are currently being retained.
    pub fn is_recording(&self) -> bool {
        self.shared.lock().unwrap().recording
    }

    /// Duration of the audio captured so far, in seconds.
    pub fn duration_seconds(&self) -> f32 {
        let shared = self.shared.lock().unwrap();
        shared.samples.len() as f32 / TARGET_SAMPLE_RATE as f32
    }

    /// Append already-converted 16 kHz mono samples.
    ///
    /// Silently dropped while not recording; this is the gate that lets the
    /// capture stream run continuously.
    pub fn append(&self, samples: &[f32]) {
        let mut shared = self.shared.lock().unwrap();
        if !shared.recording {
            return;
        }
        shared.samples.extend_from_slice(samples);
    }

    /// Spawn the accumulator thread that drains `rx`, downmixes, resamples
    /// to 16 kHz and appends to this recorder.
    ///
    /// The thread exits when the sending side of `rx` is dropped (i.e. when
    /// the cpal stream stops).
    pub fn spawn_accumulator(&self, rx: mpsc::Receiver<AudioChunk>) -> std::thread::JoinHandle<()> {
        let recorder = self.clone();

        std::thread::Builder::new()
            .name("audio-accumulator".into())
            .spawn(move || {
                // Converter is created lazily from the first chunk's rate and
                // rebuilt if the device rate ever changes.
                let mut converter: Option<(u32, RateConverter)> = None;
                let mut was_recording = false;

                while let Ok(chunk) = rx.recv() {
                    let recording = recorder.is_recording();
                    if !recording {
                        if was_recording {
                            // Falling edge: drop any partial resampler chunk
                            // so it cannot leak into the next session.
                            if let Some((_, ref mut rc)) = converter {
                                rc.reset();
                            }
                        }
                        was_recording = false;
                        continue;
                    }
                    was_recording = true;

                    let mono = to_mono(&chunk.samples, chunk.channels);

                    let rebuild = match converter {
                        Some((rate, _)) => rate != chunk.sample_rate,
                        None => true,
                    };
                    if rebuild {
                        match RateConverter::new(chunk.sample_rate, TARGET_SAMPLE_RATE) {
                            Ok(rc) => converter = Some((chunk.sample_rate, rc)),
                            Err(e) => {
                                log::error!("audio-accumulator: {e}");
                                continue;
                            }
                        }
                    }

                    let Some((_, rc)) = converter.as_mut() else {
                        continue;
                    };
                    let converted = rc.process(&mono);
                    if !converted.is_empty() {
                        recorder.append(&converted);
                    }
                }

                log::debug!("audio-accumulator: channel closed, exiting");
            })
            .expect("failed to spawn audio-accumulator thread")
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_empty() {
        let recorder = Recorder::new();
        assert!(!recorder.is_recording());
        assert_eq!(recorder.duration_seconds(), 0.0);
        assert!(recorder.stop_recording().is_empty());
    }

    #[test]
    fn append_is_dropped_while_idle() {
        let recorder = Recorder::new();
        recorder.append(&[0.5; 100]);
        recorder.start_recording();
        assert_eq!(recorder.stop_recording().len(), 0);
    }

    #[test]
    fn start_append_stop_returns_samples() {
        let recorder = Recorder::new();
        recorder.start_recording();
        recorder.append(&[0.1; 1_600]);
        recorder.append(&[0.2; 1_600]);

        let audio = recorder.stop_recording();
        assert_eq!(audio.len(), 3_200);
        assert!(!recorder.is_recording());
        // Buffer ownership transferred; a second stop yields nothing.
        assert!(recorder.stop_recording().is_empty());
    }

    #[test]
    fn start_is_idempotent() {
        let recorder = Recorder::new();
        recorder.start_recording();
        recorder.append(&[0.1; 800]);
        recorder.start_recording(); // must not clear captured audio
        assert_eq!(recorder.stop_recording().len(), 800);
    }

    #[test]
    fn restart_clears_previous_audio() {
        let recorder = Recorder::new();
        recorder.start_recording();
        recorder.append(&[0.1; 800]);
        recorder.cancel_recording();

        recorder.start_recording();
        recorder.append(&[0.2; 160]);
        assert_eq!(recorder.stop_recording().len(), 160);
    }

    #[test]
    fn cancel_discards_audio() {
        let recorder = Recorder::new();
        recorder.start_recording();
        recorder.append(&[0.1; 1_600]);
        recorder.cancel_recording();

        assert!(!recorder.is_recording());
        assert_eq!(recorder.duration_seconds(), 0.0);
    }

    #[test]
    fn duration_tracks_sample_count() {
        let recorder = Recorder::new();
        recorder.start_recording();
        recorder.append(&[0.0; 8_000]); // 0.5 s at 16 kHz
        assert!((recorder.duration_seconds() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn accumulator_retains_only_while_recording() {
        let recorder = Recorder::new();
        let (tx, rx) = mpsc::channel();
        let handle = recorder.spawn_accumulator(rx);

        // Chunk arriving while idle is dropped.
        tx.send(AudioChunk {
            samples: vec![0.5; 160],
            sample_rate: 16_000,
            channels: 1,
        })
        .unwrap();

        // Wait for the idle chunk to drain before starting.
        std::thread::sleep(std::time::Duration::from_millis(50));
        recorder.start_recording();

        tx.send(AudioChunk {
            samples: vec![0.25; 320],
            sample_rate: 16_000,
            channels: 1,
        })
        .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        let audio = recorder.stop_recording();
        drop(tx);
        handle.join().unwrap();

        assert_eq!(audio.len(), 320);
        assert!(audio.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn accumulator_downmixes_stereo() {
        let recorder = Recorder::new();
        let (tx, rx) = mpsc::channel();
        let handle = recorder.spawn_accumulator(rx);

        recorder.start_recording();
        tx.send(AudioChunk {
            samples: vec![0.5; 640], // 320 stereo frames
            sample_rate: 16_000,
            channels: 2,
        })
        .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        let audio = recorder.stop_recording();
        drop(tx);
        handle.join().unwrap();

        assert_eq!(audio.len(), 320);
    }
}
