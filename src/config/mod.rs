//! Configuration module for the push-to-talk daemon.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, FeedbackConfig, HotkeyConfig, InjectionConfig, InjectionMode,
    LoggingConfig, SanitizerConfig, SessionConfig, TmuxConfig, WhisperConfig,
};
