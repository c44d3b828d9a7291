//! On-disk formats shared between the daemon and the worker child.
//!
//! Audio scratch file: a `u64` little-endian sample count followed by that
//! many `f32` little-endian samples (16 kHz mono).  Result file: a small
//! JSON record.  Both are written atomically enough for a
//! parent-waits-for-child handoff; the parent owns the containing temp
//! directory and removes it on every path.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Upper bound on the sample count the reader will accept.
///
/// 10 minutes at 16 kHz, an order of magnitude above the longest possible
/// recording; anything larger is a corrupt or hostile file.
const MAX_SAMPLES: u64 = 16_000 * 600;

// ---------------------------------------------------------------------------
// Audio samples
// ---------------------------------------------------------------------------

/// Write `samples` to `path` in the length-prefixed f32-LE layout.
pub fn write_samples(path: &Path, samples: &[f32]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&(samples.len() as u64).to_le_bytes())?;
    for sample in samples {
        writer.write_all(&sample.to_le_bytes())?;
    }
    writer.flush()
}

/// Read a sample buffer previously written by [`write_samples`].
///
/// Fails on a short file, trailing garbage, or an implausible length
/// prefix, so a truncated handoff is detected rather than transcribed.
pub fn read_samples(path: &Path) -> io::Result<Vec<f32>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut len_bytes = [0u8; 8];
    reader.read_exact(&mut len_bytes)?;
    let count = u64::from_le_bytes(len_bytes);

    if count > MAX_SAMPLES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("sample count {count} exceeds limit {MAX_SAMPLES}"),
        ));
    }

    let mut samples = Vec::with_capacity(count as usize);
    let mut buf = [0u8; 4];
    for _ in 0..count {
        reader.read_exact(&mut buf)?;
        samples.push(f32::from_le_bytes(buf));
    }

    // The prefix must account for the whole file.
    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailing bytes after sample data",
        ));
    }

    Ok(samples)
}

// ---------------------------------------------------------------------------
// WorkerResult
// ---------------------------------------------------------------------------

/// The structured record the worker writes on exit.
///
/// A present `error` field means the worker ran but could not transcribe;
/// the parent maps it to a worker failure regardless of exit code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResult {
    pub text: String,
    pub language: String,
    pub confidence: f32,
    pub error: Option<String>,
}

impl WorkerResult {
    pub fn ok(text: String, language: String, confidence: f32) -> Self {
        Self {
            text,
            language,
            confidence,
            error: None,
        }
    }

    pub fn err(language: String, message: String) -> Self {
        Self {
            text: String::new(),
            language,
            confidence: 0.0,
            error: Some(message),
        }
    }
}

/// Serialise `result` to `path` as JSON.
pub fn write_result(path: &Path, result: &WorkerResult) -> io::Result<()> {
    let json = serde_json::to_string(result)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)
}

/// Parse the worker's result file.
pub fn read_result(path: &Path) -> io::Result<WorkerResult> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn samples_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audio.f32le");

        let samples: Vec<f32> = (0..4_000).map(|i| (i as f32 * 0.01).sin()).collect();
        write_samples(&path, &samples).unwrap();

        assert_eq!(read_samples(&path).unwrap(), samples);
    }

    #[test]
    fn empty_buffer_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.f32le");

        write_samples(&path, &[]).unwrap();
        assert!(read_samples(&path).unwrap().is_empty());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.f32le");

        write_samples(&path, &[0.1, 0.2, 0.3]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(read_samples(&path).is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.f32le");

        write_samples(&path, &[0.1]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.push(0xAB);
        std::fs::write(&path, bytes).unwrap();

        assert!(read_samples(&path).is_err());
    }

    #[test]
    fn implausible_length_prefix_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.f32le");

        std::fs::write(&path, u64::MAX.to_le_bytes()).unwrap();
        let err = read_samples(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn result_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");

        let result = WorkerResult::ok("hello world".into(), "en".into(), 0.9);
        write_result(&path, &result).unwrap();

        assert_eq!(read_result(&path).unwrap(), result);
    }

    #[test]
    fn error_result_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");

        let result = WorkerResult::err("en".into(), "model load failed".into());
        write_result(&path, &result).unwrap();

        let loaded = read_result(&path).unwrap();
        assert_eq!(loaded.error.as_deref(), Some("model load failed"));
        assert!(loaded.text.is_empty());
    }

    #[test]
    fn malformed_result_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");

        std::fs::write(&path, "{not json").unwrap();
        assert!(read_result(&path).is_err());
    }
}
