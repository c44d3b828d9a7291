//! Text injection: sanitization plus delivery to the configured target.
//!
//! # Overview
//!
//! Two delivery backends implement [`TextInjector`]:
//!
//! * [`FocusedInjector`] types the payload into whatever window currently
//!   has keyboard focus, via synthesized keystrokes (`enigo`).
//! * [`TmuxInjector`] sends the payload to a specific tmux pane with
//!   `send-keys`, validating the pane still exists first.
//!
//! Payloads are sanitized exactly once, by the session orchestrator,
//! immediately before injection; the injectors themselves only enforce the
//! non-empty contract.  Injection is never retried automatically.

pub mod focused;
pub mod sanitizer;
pub mod tmux;

pub use focused::FocusedInjector;
pub use sanitizer::Sanitizer;
pub use tmux::{PaneTarget, TmuxInjector};

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// InjectError
// ---------------------------------------------------------------------------

/// All errors that can surface during text injection.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Injecting an empty payload is always a caller bug.
    #[error("cannot inject empty text")]
    EmptyText,

    /// No pane matched the discovery criteria.
    #[error("no injection target: {0}")]
    NoTarget(String),

    /// The configured pane no longer exists or is unreachable.
    #[error("injection target invalid: {0}")]
    TargetInvalid(String),

    /// The injection subprocess exited non-zero or could not be launched.
    #[error("injection command failed: {0}")]
    CommandFailed(String),

    /// The injection subprocess exceeded its wall-clock budget.
    #[error("injection command timed out")]
    Timeout,

    /// The OS input API rejected a synthesized keystroke.
    #[error("cannot simulate keystrokes: {0}")]
    Keystroke(String),
}

// ---------------------------------------------------------------------------
// InjectionTarget
// ---------------------------------------------------------------------------

/// Where transcribed text is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionTarget {
    /// Whatever window has keyboard focus when injection runs.
    FocusedWindow,
    /// A specific tmux pane.
    MultiplexerPane(PaneTarget),
}

impl std::fmt::Display for InjectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectionTarget::FocusedWindow => f.write_str("focused window"),
            InjectionTarget::MultiplexerPane(target) => write!(f, "tmux pane {target}"),
        }
    }
}

// ---------------------------------------------------------------------------
// TextInjector
// ---------------------------------------------------------------------------

/// Object-safe delivery backend held by the session orchestrator.
///
/// Implementations must be `Send + Sync`; blocking OS work happens behind
/// `spawn_blocking`, subprocess work under a 5 s timeout.
#[async_trait]
pub trait TextInjector: Send + Sync {
    /// Deliver `text` to the target.
    ///
    /// # Errors
    ///
    /// [`InjectError::EmptyText`] for an empty payload; backend-specific
    /// kinds otherwise.  Callers must not retry automatically.
    async fn inject(&self, text: &str) -> Result<(), InjectError>;

    /// Submit an Enter keystroke to the target (auto-return support).
    async fn press_enter(&self) -> Result<(), InjectError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_display_forms() {
        assert_eq!(InjectionTarget::FocusedWindow.to_string(), "focused window");

        let pane = InjectionTarget::MultiplexerPane(PaneTarget {
            session: "work".into(),
            window_index: 0,
            pane_index: 1,
        });
        assert_eq!(pane.to_string(), "tmux pane work:0.1");
    }

    #[test]
    fn error_kinds_are_distinguishable() {
        // The orchestrator surfaces the kind through the Display text.
        assert!(InjectError::TargetInvalid("work:0.1".into())
            .to_string()
            .contains("target invalid"));
        assert!(InjectError::EmptyText.to_string().contains("empty"));
        assert!(InjectError::Timeout.to_string().contains("timed out"));
    }
}
