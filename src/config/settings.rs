//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! `AppConfig::validate` reports every problem at once so a bad config file
//! produces one readable startup failure instead of a cascade.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::hotkey::Hotkey;
use crate::stt::{ComputeDevice, ModelSize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// InjectionMode
// ---------------------------------------------------------------------------

/// Where transcribed text is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    /// Type into whatever window currently has keyboard focus.
    Focused,
    /// Send to a tmux pane via `send-keys`.
    Tmux,
}

impl Default for InjectionMode {
    fn default() -> Self {
        Self::Focused
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Push-to-talk hotkey binding and release-detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    /// Key name from the supported vocabulary (e.g. `"ctrl_r"`, `"f13"`).
    pub key: String,
    /// Seconds after which a press with no observed release is force-released.
    pub stuck_key_timeout_secs: f32,
    /// Milliseconds between key-state polls while the hotkey is held.
    pub poll_interval_ms: u64,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: "ctrl_r".into(),
            stuck_key_timeout_secs: 30.0,
            poll_interval_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Audio capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Input device index as reported by `AudioCapture::list_devices`, or
    /// `None` for the system default.
    pub device_index: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { device_index: None }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Gating thresholds and timeouts applied by the session orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recordings shorter than this are skipped (accidental press).
    pub min_recording_secs: f32,
    /// Recordings whose RMS falls below this are skipped (no speech).
    pub min_audio_rms: f32,
    /// Recording stops automatically after this many seconds.
    pub max_recording_secs: f32,
    /// Maximum seconds to wait for the transcription worker.
    pub transcription_timeout_secs: f32,
    /// Submit an Enter keystroke after each injected payload (tmux mode only).
    pub auto_return: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_recording_secs: 0.3,
            min_audio_rms: 0.01,
            max_recording_secs: 60.0,
            transcription_timeout_secs: 30.0,
            auto_return: false,
        }
    }
}

// ---------------------------------------------------------------------------
// WhisperConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper transcription worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    /// Model size: `tiny`, `base`, `small`, `medium` or `large`.
    pub model: String,
    /// Compute device hint: `auto`, `cpu` or `cuda`.  `auto` resolves to CPU
    /// before the worker is spawned.
    pub device: String,
    /// ISO-639-1 language hint, or `None` for Whisper auto-detection.
    pub language: Option<String>,
    /// Run the worker once at startup so the first real transcription does
    /// not pay the model download / warm-up cost.
    pub preload: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "tiny".into(),
            device: "auto".into(),
            language: Some("en".into()),
            preload: true,
        }
    }
}

// ---------------------------------------------------------------------------
// InjectionConfig
// ---------------------------------------------------------------------------

/// Text injection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    /// Delivery mode.
    pub mode: InjectionMode,
    /// Milliseconds slept between characters in focused mode.  Zero types
    /// the whole payload in a single call.
    pub typing_delay_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            mode: InjectionMode::default(),
            typing_delay_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// TmuxConfig
// ---------------------------------------------------------------------------

/// Tmux pane targeting for `InjectionMode::Tmux`.
///
/// When `session_name`, `window_index` and `pane_index` are all set, that
/// exact pane is used.  With only `session_name`, the first pane of the
/// session is used.  Otherwise all sessions are scanned for an active pane
/// whose current command matches one of `command_names`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxConfig {
    /// Explicit session, or `None` for auto-detection.
    pub session_name: Option<String>,
    /// Explicit window index within `session_name`.
    pub window_index: Option<u32>,
    /// Explicit pane index within the window.
    pub pane_index: Option<u32>,
    /// Substrings matched (case-insensitively) against each pane's current
    /// command during auto-detection.
    pub command_names: Vec<String>,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            session_name: None,
            window_index: None,
            pane_index: None,
            command_names: vec!["claude".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// SanitizerConfig
// ---------------------------------------------------------------------------

/// Input sanitizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Maximum payload length in bytes (validated to 100..=5000).
    pub max_length: usize,
    /// Escape shell metacharacters.  Forced off in focused mode where the
    /// payload is a keystroke sequence rather than a shell word.
    pub escape_shell: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_length: 500,
            escape_shell: true,
        }
    }
}

// ---------------------------------------------------------------------------
// FeedbackConfig
// ---------------------------------------------------------------------------

/// Audible feedback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Play short cues on record start/stop, completion and error.
    pub audio_cues: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { audio_cues: true }
    }
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

/// Logging and transcript persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append each successful transcription to a file under
    /// `transcripts_dir`.
    pub save_transcripts: bool,
    /// Transcript directory, relative to the working directory or absolute.
    pub transcripts_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            save_transcripts: false,
            transcripts_dir: ".ptt-transcripts".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `config.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use push_to_talk::config::AppConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = AppConfig::load().unwrap();
/// assert!(config.validate().is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hotkey binding and release detection.
    pub hotkey: HotkeyConfig,
    /// Audio capture device selection.
    pub audio: AudioConfig,
    /// Orchestrator gates and timeouts.
    pub session: SessionConfig,
    /// Transcription worker settings.
    pub whisper: WhisperConfig,
    /// Injection mode and typing behaviour.
    pub injection: InjectionConfig,
    /// Tmux pane targeting (tmux mode only).
    pub tmux: TmuxConfig,
    /// Payload sanitization.
    pub sanitizer: SanitizerConfig,
    /// Audio cue playback.
    pub feedback: FeedbackConfig,
    /// Logging and transcript persistence.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `config.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `config.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().config_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate config values.  Returns a list of human-readable error
    /// messages, empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = Hotkey::parse(&self.hotkey.key) {
            errors.push(e.to_string());
        }
        if self.hotkey.poll_interval_ms == 0 {
            errors.push("hotkey.poll_interval_ms must be greater than 0".into());
        }
        if self.hotkey.stuck_key_timeout_secs <= 0.0 {
            errors.push("hotkey.stuck_key_timeout_secs must be greater than 0".into());
        }

        if let Err(e) = ModelSize::parse(&self.whisper.model) {
            errors.push(e.to_string());
        }
        if let Err(e) = ComputeDevice::parse(&self.whisper.device) {
            errors.push(e.to_string());
        }

        if !(100..=5000).contains(&self.sanitizer.max_length) {
            errors.push(format!(
                "sanitizer.max_length {} out of range (must be 100..=5000)",
                self.sanitizer.max_length
            ));
        }

        if self.session.min_recording_secs < 0.0 {
            errors.push("session.min_recording_secs must not be negative".into());
        }
        if self.session.max_recording_secs <= self.session.min_recording_secs {
            errors.push(format!(
                "session.max_recording_secs {} must exceed min_recording_secs {}",
                self.session.max_recording_secs, self.session.min_recording_secs
            ));
        }
        if self.session.transcription_timeout_secs <= 0.0 {
            errors.push("session.transcription_timeout_secs must be greater than 0".into());
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A default `AppConfig` must serialise to TOML and deserialise back
    /// without any data loss.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.hotkey.key, loaded.hotkey.key);
        assert_eq!(
            original.hotkey.poll_interval_ms,
            loaded.hotkey.poll_interval_ms
        );
        assert_eq!(original.audio.device_index, loaded.audio.device_index);
        assert_eq!(
            original.session.min_recording_secs,
            loaded.session.min_recording_secs
        );
        assert_eq!(original.session.auto_return, loaded.session.auto_return);
        assert_eq!(original.whisper.model, loaded.whisper.model);
        assert_eq!(original.whisper.language, loaded.whisper.language);
        assert_eq!(original.injection.mode, loaded.injection.mode);
        assert_eq!(original.tmux.command_names, loaded.tmux.command_names);
        assert_eq!(original.sanitizer.max_length, loaded.sanitizer.max_length);
        assert_eq!(original.feedback.audio_cues, loaded.feedback.audio_cues);
        assert_eq!(
            original.logging.save_transcripts,
            loaded.logging.save_transcripts
        );
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        let default = AppConfig::default();

        assert_eq!(config.hotkey.key, default.hotkey.key);
        assert_eq!(config.whisper.model, default.whisper.model);
        assert_eq!(config.injection.mode, default.injection.mode);
    }

    /// Verify the design defaults.
    #[test]
    fn default_values_match_design() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.hotkey.key, "ctrl_r");
        assert_eq!(cfg.hotkey.stuck_key_timeout_secs, 30.0);
        assert_eq!(cfg.hotkey.poll_interval_ms, 100);
        assert_eq!(cfg.session.min_recording_secs, 0.3);
        assert_eq!(cfg.session.min_audio_rms, 0.01);
        assert_eq!(cfg.session.max_recording_secs, 60.0);
        assert_eq!(cfg.session.transcription_timeout_secs, 30.0);
        assert!(!cfg.session.auto_return);
        assert_eq!(cfg.whisper.model, "tiny");
        assert_eq!(cfg.whisper.device, "auto");
        assert_eq!(cfg.whisper.language.as_deref(), Some("en"));
        assert_eq!(cfg.injection.mode, InjectionMode::Focused);
        assert_eq!(cfg.sanitizer.max_length, 500);
        assert!(cfg.sanitizer.escape_shell);
        assert_eq!(cfg.tmux.command_names, vec!["claude".to_string()]);
        assert!(!cfg.logging.save_transcripts);
    }

    /// A default config passes validation.
    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_empty());
    }

    /// Each invalid field contributes one message.
    #[test]
    fn validate_reports_all_problems() {
        let mut cfg = AppConfig::default();
        cfg.hotkey.key = "super_mega_key".into();
        cfg.whisper.model = "gigantic".into();
        cfg.whisper.device = "tpu".into();
        cfg.sanitizer.max_length = 50;
        cfg.session.max_recording_secs = 0.1; // below min_recording_secs

        let errors = cfg.validate();
        assert_eq!(errors.len(), 5, "got: {errors:?}");
    }

    /// Modified values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.hotkey.key = "f13".into();
        cfg.injection.mode = InjectionMode::Tmux;
        cfg.tmux.session_name = Some("work".into());
        cfg.tmux.window_index = Some(0);
        cfg.tmux.pane_index = Some(1);
        cfg.session.auto_return = true;
        cfg.whisper.model = "small".into();
        cfg.whisper.language = None;
        cfg.logging.save_transcripts = true;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.hotkey.key, "f13");
        assert_eq!(loaded.injection.mode, InjectionMode::Tmux);
        assert_eq!(loaded.tmux.session_name.as_deref(), Some("work"));
        assert_eq!(loaded.tmux.window_index, Some(0));
        assert_eq!(loaded.tmux.pane_index, Some(1));
        assert!(loaded.session.auto_return);
        assert_eq!(loaded.whisper.model, "small");
        assert_eq!(loaded.whisper.language, None);
        assert!(loaded.logging.save_transcripts);
    }
}
