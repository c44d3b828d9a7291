//! Parent-side transcription driver.
//!
//! [`Transcriber`] owns the worker lifecycle for one call: scratch files in
//! a private temp directory, a freshly spawned child, a bounded wait, and
//! result parsing.  The child is killed on timeout and on drop
//! (`kill_on_drop`), so no transcription can outlive the session that
//! requested it.
//!
//! [`SpeechToText`] is the object-safe seam the orchestrator holds, with a
//! scriptable mock under `#[cfg(test)]`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use super::wire::{self, WorkerResult};
use super::{ComputeDevice, ModelSize, SttError, TranscriptionResult, SHORT_AUDIO_SAMPLES};

/// Subcommand the daemon binary dispatches to the worker entry point.
pub const WORKER_SUBCOMMAND: &str = "stt-worker";

// ---------------------------------------------------------------------------
// SpeechToText trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface to the transcription subsystem.
///
/// # Contract
///
/// - `audio` is 16 kHz mono f32 PCM, ownership transferred to the callee.
/// - Returns within `timeout` plus a small scheduling margin.
/// - `Err(SttError::Timeout)` and other failures are distinct so the
///   session can end in `timeout` vs `error` accordingly.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: Vec<f32>,
        timeout: Duration,
    ) -> Result<TranscriptionResult, SttError>;
}

// ---------------------------------------------------------------------------
// Transcriber
// ---------------------------------------------------------------------------

/// Production [`SpeechToText`] backed by the `stt-worker` child process.
pub struct Transcriber {
    model: ModelSize,
    device: ComputeDevice,
    language: Option<String>,
}

impl Transcriber {
    pub fn new(model: ModelSize, device: ComputeDevice, language: Option<String>) -> Self {
        Self {
            model,
            device,
            language,
        }
    }

    fn language_hint(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }

    /// Run the worker once with no audio to force the first-time model
    /// download and load, so the first real transcription is not slow.
    ///
    /// `timeout` should be generous; a cold start may include a multi-GB
    /// download for the larger models.
    pub async fn preload(&self, timeout: Duration) -> Result<(), SttError> {
        log::info!("stt: preloading {} model", self.model);
        self.run_worker(&[], timeout).await.map(|_| ())
    }

    /// Spawn the worker over `samples` and wait for its result.
    async fn run_worker(
        &self,
        samples: &[f32],
        timeout: Duration,
    ) -> Result<WorkerResult, SttError> {
        // The temp dir is owned here and removed on every exit path,
        // including timeout and parse failure.
        let scratch = tempfile::tempdir()?;
        let audio_path = scratch.path().join("audio.f32le");
        let result_path = scratch.path().join("result.json");

        wire::write_samples(&audio_path, samples)?;

        let exe = std::env::current_exe()?;
        let device = self.device.resolve();

        let mut child = Command::new(exe)
            .arg(WORKER_SUBCOMMAND)
            .arg(&audio_path)
            .arg(self.model.as_str())
            .arg(device.as_str())
            .arg(self.language.as_deref().unwrap_or("-"))
            .arg(&result_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(SttError::Io(e)),
            Err(_elapsed) => {
                log::warn!("stt: worker exceeded {timeout:?}, killing");
                let _ = child.kill().await;
                return Err(SttError::Timeout);
            }
        };

        if !status.success() {
            // The worker writes an error record when it can; prefer that
            // message over the bare exit code.
            if let Ok(result) = wire::read_result(&result_path) {
                if let Some(message) = result.error {
                    return Err(SttError::WorkerFailed(message));
                }
            }
            return Err(SttError::WorkerFailed(format!(
                "worker exited with {status}"
            )));
        }

        let result = wire::read_result(&result_path)
            .map_err(|e| SttError::WorkerFailed(format!("result file: {e}")))?;

        if let Some(message) = result.error {
            return Err(SttError::WorkerFailed(message));
        }

        Ok(result)
    }
}

#[async_trait]
impl SpeechToText for Transcriber {
    async fn transcribe(
        &self,
        audio: Vec<f32>,
        timeout: Duration,
    ) -> Result<TranscriptionResult, SttError> {
        // Short-audio shortcut: not worth a process spawn.
        if audio.len() < SHORT_AUDIO_SAMPLES {
            return Ok(TranscriptionResult::empty(self.language_hint()));
        }

        let started = Instant::now();
        let result = self.run_worker(&audio, timeout).await?;

        Ok(TranscriptionResult {
            text: result.text,
            language: result.language,
            confidence: result.confidence.clamp(0.0, 1.0),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// MockSpeechToText  (test-only)
// ---------------------------------------------------------------------------

/// A scriptable test double for the orchestrator tests.
///
/// Counts calls so tests can assert that gated audio never reaches the
/// transcription subsystem at all.
#[cfg(test)]
pub struct MockSpeechToText {
    respond: Box<dyn Fn() -> Result<TranscriptionResult, SttError> + Send + Sync>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSpeechToText {
    /// Always succeed with `text` at the given confidence.
    pub fn ok(text: &str, confidence: f32) -> Self {
        let text = text.to_string();
        Self {
            respond: Box::new(move || {
                Ok(TranscriptionResult {
                    text: text.clone(),
                    language: "en".into(),
                    confidence,
                    duration_ms: 5,
                })
            }),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Always report a timeout.
    pub fn timeout() -> Self {
        Self {
            respond: Box::new(|| Err(SttError::Timeout)),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Always report a worker failure.
    pub fn failed(message: &str) -> Self {
        let message = message.to_string();
        Self {
            respond: Box::new(move || Err(SttError::WorkerFailed(message.clone()))),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of `transcribe` calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(
        &self,
        _audio: Vec<f32>,
        _timeout: Duration,
    ) -> Result<TranscriptionResult, SttError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        (self.respond)()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
