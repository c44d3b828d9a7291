//! The `stt-worker` child process entry point.
//!
//! Runs in a process of its own so the GGML runtime's thread pools and file
//! descriptors cannot touch the daemon's keyboard listener or terminal.
//! Protocol (argv): `<audio-file> <model> <device> <language|-> <result-file>`.
//!
//! The worker always tries to leave a result record behind, even on
//! failure, so the parent sees a message rather than a bare exit code.
//! An empty input buffer is the preload path: the model is downloaded and
//! loaded, an empty result is written, and nothing is transcribed.

use std::path::{Path, PathBuf};

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::model::{ensure_model, ModelPaths};
use super::wire::{self, WorkerResult};
use super::{ComputeDevice, ModelSize, SttError};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the worker.  Returns the process exit code.
pub fn run(args: &[String]) -> i32 {
    if args.len() != 5 {
        eprintln!(
            "usage: push-to-talk stt-worker <audio-file> <model> <device> <language|-> <result-file>"
        );
        return 2;
    }

    let audio_path = PathBuf::from(&args[0]);
    let result_path = PathBuf::from(&args[4]);
    let language = match args[3].as_str() {
        "-" => None,
        other => Some(other.to_string()),
    };
    let report_language = language.clone().unwrap_or_else(|| "en".into());

    match run_inner(&audio_path, &args[1], &args[2], language.as_deref()) {
        Ok(result) => {
            if let Err(e) = wire::write_result(&result_path, &result) {
                eprintln!("stt-worker: cannot write result: {e}");
                return 1;
            }
            0
        }
        Err(e) => {
            let record = WorkerResult::err(report_language, e.to_string());
            if let Err(write_err) = wire::write_result(&result_path, &record) {
                eprintln!("stt-worker: cannot write error result: {write_err}");
            }
            eprintln!("stt-worker: {e}");
            1
        }
    }
}

fn run_inner(
    audio_path: &Path,
    model_name: &str,
    device_name: &str,
    language: Option<&str>,
) -> Result<WorkerResult, SttError> {
    let samples = wire::read_samples(audio_path)?;
    let model = ModelSize::parse(model_name)?;
    let device = ComputeDevice::parse(device_name)?.resolve();

    // The hint is advisory: whisper-rs uses whatever backend it was built
    // with, and the parent already demoted `auto` to CPU.
    log::debug!("stt-worker: model={model} device={}", device.as_str());

    let model_file = ensure_model(model, &ModelPaths::default())?;

    let report_language = language.unwrap_or("en").to_string();

    // Preload path: model is on disk and loadable; nothing to transcribe.
    if samples.is_empty() {
        // Load once so the first real call skips the mmap/validation cost.
        load_context(&model_file)?;
        return Ok(WorkerResult::ok(String::new(), report_language, 0.0));
    }

    let ctx = load_context(&model_file)?;
    let text = transcribe(&ctx, &samples, language)?;
    let confidence = speech_confidence(&samples);

    Ok(WorkerResult::ok(text, report_language, confidence))
}

// ---------------------------------------------------------------------------
// Whisper inference
// ---------------------------------------------------------------------------

fn load_context(model_file: &Path) -> Result<WhisperContext, SttError> {
    let path_str = model_file
        .to_str()
        .ok_or_else(|| SttError::Inference("model path is not valid UTF-8".into()))?;

    WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
        .map_err(|e| SttError::Inference(format!("context init: {e}")))
}

fn transcribe(
    ctx: &WhisperContext,
    samples: &[f32],
    language: Option<&str>,
) -> Result<String, SttError> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

    // The language borrow stays alive until state.full() returns.
    params.set_language(language);
    params.set_n_threads(inference_threads());
    params.set_print_progress(false);
    params.set_print_realtime(false);

    let mut state = ctx
        .create_state()
        .map_err(|e| SttError::Inference(format!("state init: {e}")))?;

    state
        .full(params, samples)
        .map_err(|e| SttError::Inference(e.to_string()))?;

    let n_segments = state
        .full_n_segments()
        .map_err(|e| SttError::Inference(e.to_string()))?;

    let mut text = String::new();
    for i in 0..n_segments {
        let segment = state
            .full_get_segment_text(i)
            .map_err(|e| SttError::Inference(format!("segment {i}: {e}")))?;
        text.push_str(&segment);
    }

    Ok(text.trim().to_string())
}

/// Thread count handed to whisper, capped at 8.  The worker is the only
/// place the inference pool is configured; the daemon never hosts it.
fn inference_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Confidence estimate
// ---------------------------------------------------------------------------

/// Frame length for the voiced-ratio estimate: 30 ms at 16 kHz.
const CONFIDENCE_FRAME: usize = 480;

/// Amplitude below which a frame counts as silent.
const CONFIDENCE_RMS_FLOOR: f32 = 0.01;

/// Estimate `1 - p_no_speech` as the fraction of 30 ms frames carrying
/// energy above the silence floor.
///
/// whisper-rs 0.12 does not export the decoder's no-speech probability, so
/// the worker derives the speech-presence proxy from the signal itself.
/// Downstream consumers already treat confidence as uncalibrated.
fn speech_confidence(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut voiced = 0usize;
    let mut total = 0usize;

    for frame in samples.chunks(CONFIDENCE_FRAME) {
        let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        if mean_sq.sqrt() > CONFIDENCE_RMS_FLOOR {
            voiced += 1;
        }
        total += 1;
    }

    (voiced as f32 / total as f32).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ---- speech_confidence -------------------------------------------------

    #[test]
    fn silence_scores_zero() {
        assert_eq!(speech_confidence(&vec![0.0; 16_000]), 0.0);
    }

    #[test]
    fn loud_signal_scores_one() {
        assert_eq!(speech_confidence(&vec![0.5; 16_000]), 1.0);
    }

    #[test]
    fn half_voiced_scores_half() {
        let mut samples = vec![0.5_f32; CONFIDENCE_FRAME * 10];
        samples.extend(vec![0.0_f32; CONFIDENCE_FRAME * 10]);
        let c = speech_confidence(&samples);
        assert!((c - 0.5).abs() < 1e-6, "got {c}");
    }

    #[test]
    fn empty_buffer_scores_zero() {
        assert_eq!(speech_confidence(&[]), 0.0);
    }

    #[test]
    fn confidence_is_bounded() {
        let samples = vec![1.5_f32; 4_800]; // out-of-range amplitude
        let c = speech_confidence(&samples);
        assert!((0.0..=1.0).contains(&c));
    }

    // ---- argv handling -----------------------------------------------------

    #[test]
    fn wrong_arg_count_exits_2() {
        assert_eq!(run(&["only-one".into()]), 2);
        assert_eq!(run(&[]), 2);
    }

    /// A missing audio file must produce exit code 1 and an error record,
    /// never a panic.
    #[test]
    fn missing_audio_file_writes_error_record() {
        let dir = tempdir().unwrap();
        let result_path = dir.path().join("result.json");

        let args = vec![
            dir.path().join("nope.f32le").display().to_string(),
            "tiny".into(),
            "cpu".into(),
            "en".into(),
            result_path.display().to_string(),
        ];

        assert_eq!(run(&args), 1);

        let record = wire::read_result(&result_path).expect("error record written");
        assert!(record.error.is_some());
        assert_eq!(record.language, "en");
    }

    /// An unknown model name fails before any network or model access.
    #[test]
    fn invalid_model_name_writes_error_record() {
        let dir = tempdir().unwrap();
        let audio_path = dir.path().join("audio.f32le");
        let result_path = dir.path().join("result.json");
        wire::write_samples(&audio_path, &[0.0; 16]).unwrap();

        let args = vec![
            audio_path.display().to_string(),
            "enormous".into(),
            "cpu".into(),
            "-".into(),
            result_path.display().to_string(),
        ];

        assert_eq!(run(&args), 1);

        let record = wire::read_result(&result_path).unwrap();
        assert!(record.error.as_deref().unwrap_or("").contains("enormous"));
    }
}
