//! Speech-to-text via an isolated Whisper worker process.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────── daemon process ──────────────────────┐
//! │  Transcriber::transcribe(audio, timeout)                    │
//! │    1. write samples to scratch file (length-prefixed f32)   │
//! │    2. spawn `push-to-talk stt-worker ...`  (kill_on_drop)   │
//! │    3. await child exit with timeout; kill on expiry         │
//! │    4. parse JSON result file                                │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ scratch file + argv
//! ┌─────────────────────────────▼──────────────── child ────────┐
//! │  worker::run: ensure model (download once) → whisper-rs     │
//! │  inference → write result JSON → exit 0                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The model runs in a child process spawned fresh per call because the
//! GGML runtime's thread pools and file descriptors must not share a
//! process with the keyboard listener and the terminal.  The parent treats
//! the worker as a black box whose only outputs are its exit code and the
//! result file.

pub mod model;
pub mod transcriber;
pub mod wire;
pub mod worker;

pub use model::{ensure_model, ModelPaths};
pub use transcriber::{SpeechToText, Transcriber, WORKER_SUBCOMMAND};
pub use wire::WorkerResult;

#[cfg(test)]
pub use transcriber::MockSpeechToText;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Buffers shorter than this (0.1 s at 16 kHz) bypass the worker entirely
/// and produce an empty result with confidence 0.
pub const SHORT_AUDIO_SAMPLES: usize = 1_600;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the transcription subsystem.
///
/// `Timeout` is deliberately distinct from `WorkerFailed`: a timed-out
/// session ends in the `timeout` status while every other failure ends in
/// `error`.
#[derive(Debug, Error)]
pub enum SttError {
    /// The worker did not finish within the allotted time and was killed.
    #[error("Transcription timeout")]
    Timeout,

    /// The worker exited non-zero, produced no result file, produced a
    /// malformed one, or reported an explicit error.
    #[error("transcription worker failed: {0}")]
    WorkerFailed(String),

    /// Scratch file or result file I/O failed in the parent.
    #[error("transcription scratch I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The configured model name is not in the supported set.
    #[error("invalid whisper model '{0}'; supported: tiny, base, small, medium, large")]
    InvalidModel(String),

    /// The configured compute device is not in the supported set.
    #[error("invalid compute device '{0}'; supported: auto, cpu, cuda")]
    InvalidDevice(String),

    /// The GGML model file could not be downloaded.
    #[error("model download failed: {0}")]
    Download(String),

    /// whisper-rs failed to load the model or run inference (worker side).
    #[error("whisper inference failed: {0}")]
    Inference(String),
}

// ---------------------------------------------------------------------------
// TranscriptionResult
// ---------------------------------------------------------------------------

/// The outcome of one transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Transcript text, trimmed of leading/trailing whitespace.  Empty when
    /// the recogniser heard nothing.
    pub text: String,
    /// Language the text is in: the configured hint, or whatever the
    /// recogniser reported.
    pub language: String,
    /// Rough speech-presence confidence in `[0, 1]`, derived as
    /// `1 - p_no_speech`.  Not a calibrated probability.
    pub confidence: f32,
    /// Wall-clock transcription time in milliseconds.
    pub duration_ms: u64,
}

impl TranscriptionResult {
    /// The empty result returned for sub-0.1 s buffers.
    pub fn empty(language: &str) -> Self {
        Self {
            text: String::new(),
            language: language.to_string(),
            confidence: 0.0,
            duration_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelSize
// ---------------------------------------------------------------------------

/// Whisper model capacity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// All supported sizes, smallest first.
    pub const ALL: &'static [ModelSize] = &[
        ModelSize::Tiny,
        ModelSize::Base,
        ModelSize::Small,
        ModelSize::Medium,
        ModelSize::Large,
    ];

    pub fn parse(name: &str) -> Result<Self, SttError> {
        match name {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            other => Err(SttError::InvalidModel(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// GGML file name under the models directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "ggml-tiny.bin",
            ModelSize::Base => "ggml-base.bin",
            ModelSize::Small => "ggml-small.bin",
            ModelSize::Medium => "ggml-medium.bin",
            ModelSize::Large => "ggml-large-v3.bin",
        }
    }

    /// Approximate download size, for the progress log line.
    pub fn approx_download_mb(&self) -> u64 {
        match self {
            ModelSize::Tiny => 78,
            ModelSize::Base => 148,
            ModelSize::Small => 488,
            ModelSize::Medium => 1_530,
            ModelSize::Large => 3_100,
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ComputeDevice
// ---------------------------------------------------------------------------

/// Compute device hint for the worker.
///
/// `Auto` never reaches the child: the parent resolves it before spawn.
/// CPU is the resolution because GPU contexts acquired in one process do
/// not survive into another, and the child is always a fresh process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Auto,
    Cpu,
    Cuda,
}

impl ComputeDevice {
    pub fn parse(name: &str) -> Result<Self, SttError> {
        match name {
            "auto" => Ok(ComputeDevice::Auto),
            "cpu" => Ok(ComputeDevice::Cpu),
            "cuda" => Ok(ComputeDevice::Cuda),
            other => Err(SttError::InvalidDevice(other.to_string())),
        }
    }

    /// Resolve `Auto` to the process-safe choice.
    pub fn resolve(self) -> ComputeDevice {
        match self {
            ComputeDevice::Auto => ComputeDevice::Cpu,
            explicit => explicit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Auto => "auto",
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Cuda => "cuda",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
