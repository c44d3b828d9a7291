//! Push-to-talk session model.
//!
//! A [`Session`] is one press-release cycle and its downstream processing.
//! Its [`SessionStatus`] walks a DAG:
//!
//! ```text
//!              (press)                (release / max-duration watchdog)
//!  idle ───────────────▶ recording ─────────────────────────▶ gate
//!                            │
//!                            └── (cancel) ──▶ cancelled
//!
//!  gate: no audio / too short / quiet ──▶ skipped        else ──▶ transcribing
//!
//!  transcribing ── timeout ──▶ timeout      transcribing ── error ──▶ error
//!  transcribing ── empty text ──▶ complete  transcribing ── text ──▶ injecting
//!  injecting ── ok ──▶ complete             injecting ── error ──▶ error
//! ```
//!
//! Sessions are created on press, mutated only by the
//! [`SessionOrchestrator`](orchestrator::SessionOrchestrator), and become
//! immutable once a terminal status is reached.

pub mod orchestrator;

pub use orchestrator::{OrchestratorOptions, SessionHandle, SessionOrchestrator};

use std::time::{Instant, SystemTime};

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Lifecycle states of a push-to-talk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session in flight.
    Idle,
    /// Microphone audio is being retained.
    Recording,
    /// The worker child is transcribing the captured audio.
    Transcribing,
    /// Transcribed text is being delivered to the target.
    Injecting,
    /// Terminal: the session finished, with or without injected text.
    Complete,
    /// Terminal: the transcription worker was killed after its deadline.
    Timeout,
    /// Terminal: the session was cancelled before completion.
    Cancelled,
    /// Terminal: transcription or injection failed.
    Error,
    /// Terminal: the gate rejected the recording (no audio / too short /
    /// no speech).  Not an error; no error cue is played.
    Skipped,
}

impl SessionStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Complete
                | SessionStatus::Timeout
                | SessionStatus::Cancelled
                | SessionStatus::Error
                | SessionStatus::Skipped
        )
    }

    /// Whether `self -> next` is an edge of the session DAG.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Recording)
                | (Recording, Transcribing)
                | (Recording, Skipped)
                | (Recording, Cancelled)
                | (Transcribing, Injecting)
                | (Transcribing, Complete)
                | (Transcribing, Timeout)
                | (Transcribing, Error)
                | (Transcribing, Cancelled)
                | (Injecting, Complete)
                | (Injecting, Error)
        )
    }

    /// Short human-readable label for logs and the status line.
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Transcribing => "transcribing",
            SessionStatus::Injecting => "injecting",
            SessionStatus::Complete => "complete",
            SessionStatus::Timeout => "timeout",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
            SessionStatus::Skipped => "skipped",
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single push-to-talk interaction.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque unique identifier.
    pub id: String,
    /// Monotonic start, for duration arithmetic.
    pub started_at: Instant,
    /// Wall-clock start, for display and transcript naming.
    pub started_wall: SystemTime,
    /// Monotonic end, set when recording stops or the session is cancelled.
    pub ended_at: Option<Instant>,
    /// Recording duration derived from the monotonic timestamps.
    pub duration_ms: u64,
    /// Transcribed text; present only once transcription succeeded.
    pub transcription: Option<String>,
    pub status: SessionStatus,
    /// Human-readable failure message for `timeout` / `error` sessions.
    pub error: Option<String>,
}

impl Session {
    /// Create a session entering `recording`; called on hotkey press.
    pub fn new(id: String) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            started_wall: SystemTime::now(),
            ended_at: None,
            duration_ms: 0,
            transcription: None,
            status: SessionStatus::Recording,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// The status stream published to subscribers (the UI surface).
///
/// Events for one session are totally ordered; events for session N+1 never
/// interleave with session N because the orchestrator is a single
/// sequential task.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionStatus),
    /// Transcription finished; delivered before `injecting`.
    Transcription(String),
    /// Terminal failure with a one-line message.
    Error(String),
    /// The gate rejected the recording; carries the reason.  Distinct from
    /// `Error` so subscribers can stay quiet about it.
    Skipped(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use super::SessionStatus::*;

    const ALL: &[SessionStatus] = &[
        Idle,
        Recording,
        Transcribing,
        Injecting,
        Complete,
        Timeout,
        Cancelled,
        Error,
        Skipped,
    ];

    #[test]
    fn terminal_states() {
        for status in [Complete, Timeout, Cancelled, Error, Skipped] {
            assert!(status.is_terminal(), "{status:?}");
        }
        for status in [Idle, Recording, Transcribing, Injecting] {
            assert!(!status.is_terminal(), "{status:?}");
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for &from in ALL {
            if !from.is_terminal() {
                continue;
            }
            for &to in ALL {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn happy_path_is_a_valid_walk() {
        let path = [Idle, Recording, Transcribing, Injecting, Complete];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn gate_and_failure_edges_exist() {
        assert!(Recording.can_transition_to(Skipped));
        assert!(Recording.can_transition_to(Cancelled));
        assert!(Transcribing.can_transition_to(Timeout));
        assert!(Transcribing.can_transition_to(Error));
        assert!(Transcribing.can_transition_to(Complete)); // empty text
        assert!(Injecting.can_transition_to(Error));
    }

    #[test]
    fn backwards_edges_do_not_exist() {
        assert!(!Transcribing.can_transition_to(Recording));
        assert!(!Injecting.can_transition_to(Transcribing));
        assert!(!Recording.can_transition_to(Idle));
        assert!(!Recording.can_transition_to(Injecting));
    }

    #[test]
    fn new_session_starts_recording() {
        let session = Session::new("s-1".into());
        assert_eq!(session.status, Recording);
        assert!(session.transcription.is_none());
        assert!(session.error.is_none());
        assert!(session.ended_at.is_none());
        assert_eq!(session.duration_ms, 0);
    }
}
