//! The session orchestrator: the state machine tying hotkey, recorder,
//! transcriber and injector together.
//!
//! # Flow
//!
//! ```text
//! HotkeyEvent::Pressed
//!   └─▶ new Session, recorder on, max-duration watchdog armed  [recording]
//!
//! HotkeyEvent::Released (or watchdog fires, identically)
//!   └─▶ recorder off, gates: empty / too-short / quiet ──▶ skipped
//!         └─▶ transcribe with timeout                     [transcribing]
//!               ├─ timeout    ──▶ timeout (terminal)
//!               ├─ error      ──▶ error   (terminal)
//!               ├─ empty text ──▶ complete (no injection)
//!               └─ text ──▶ sanitize once ──▶ inject      [injecting]
//!                     ├─ ok (+ optional auto-return Enter) ──▶ complete
//!                     └─ error ──▶ error
//! ```
//!
//! The orchestrator is one sequential task: a press arriving while a
//! session is still processing is admitted only after that session reaches
//! a terminal state, so status events for different sessions never
//! interleave.  Subscribers receive [`SessionEvent`]s over a channel and
//! must not block the worker.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};

use crate::audio::{rms, Recorder, TARGET_SAMPLE_RATE};
use crate::hotkey::HotkeyEvent;
use crate::inject::{Sanitizer, TextInjector};
use crate::stt::{SpeechToText, SttError};

use super::{Session, SessionEvent, SessionStatus};

/// Settling delay between a successful injection and the auto-return Enter.
const AUTO_RETURN_DELAY: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// OrchestratorOptions
// ---------------------------------------------------------------------------

/// Gating thresholds and behaviour flags, usually built from
/// [`SessionConfig`](crate::config::SessionConfig).
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Recordings shorter than this are skipped.
    pub min_recording: Duration,
    /// Recordings quieter than this RMS are skipped.
    pub min_audio_rms: f32,
    /// The max-duration watchdog fires after this long in `recording`.
    pub max_recording: Duration,
    /// Budget handed to the transcriber per session.
    pub transcription_timeout: Duration,
    /// Submit Enter after each successful injection.
    pub auto_return: bool,
    /// When set, successful transcriptions are appended here.
    pub transcripts_dir: Option<PathBuf>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            min_recording: Duration::from_millis(300),
            min_audio_rms: 0.01,
            max_recording: Duration::from_secs(60),
            transcription_timeout: Duration::from_secs(30),
            auto_return: false,
            transcripts_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Read-only view of the current session for observers.
///
/// The underlying mutex is held only during state mutation, never across
/// I/O, so observers cannot stall the orchestrator.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Option<Session>>>,
}

impl SessionHandle {
    /// Snapshot of the current (or most recent) session.
    pub fn current(&self) -> Option<Session> {
        self.inner.lock().unwrap().clone()
    }

    /// Status of the current session, `Idle` when none exists yet.
    pub fn status(&self) -> SessionStatus {
        self.inner
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle)
    }
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

enum StopCause {
    Released,
    Watchdog,
    Shutdown,
}

enum Outcome {
    Continue,
    Shutdown,
}

/// Drives the complete push-to-talk pipeline.
///
/// Create with [`SessionOrchestrator::new`], then call
/// [`run`](Self::run) inside a tokio task.
pub struct SessionOrchestrator {
    recorder: Recorder,
    stt: Arc<dyn SpeechToText>,
    injector: Arc<dyn TextInjector>,
    sanitizer: Sanitizer,
    events: mpsc::Sender<SessionEvent>,
    options: OrchestratorOptions,
    session: Arc<Mutex<Option<Session>>>,
    counter: u64,
}

impl SessionOrchestrator {
    pub fn new(
        recorder: Recorder,
        stt: Arc<dyn SpeechToText>,
        injector: Arc<dyn TextInjector>,
        sanitizer: Sanitizer,
        events: mpsc::Sender<SessionEvent>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            recorder,
            stt,
            injector,
            sanitizer,
            events,
            options,
            session: Arc::new(Mutex::new(None)),
            counter: 0,
        }
    }

    /// Observer handle to the current session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            inner: Arc::clone(&self.session),
        }
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run until the hotkey channel closes or shutdown is signalled.
    ///
    /// Spawn as a tokio task from `main()`.
    pub async fn run(
        mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                maybe = hotkey_rx.recv() => match maybe {
                    Some(HotkeyEvent::Pressed) => {
                        if let Outcome::Shutdown =
                            self.run_session(&mut hotkey_rx, &mut shutdown_rx).await
                        {
                            break;
                        }
                    }
                    // A release with no session in flight: either a stray
                    // event or the tail of a watchdog-stopped session.
                    Some(HotkeyEvent::Released) => {
                        log::debug!("session: release with no active session, ignoring");
                    }
                    None => break,
                },
                _ = shutdown_rx.changed() => break,
            }
        }

        log::info!("session: orchestrator shutting down");
    }

    // -----------------------------------------------------------------------
    // One session, press to terminal state
    // -----------------------------------------------------------------------

    async fn run_session(
        &mut self,
        hotkey_rx: &mut mpsc::Receiver<HotkeyEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Outcome {
        // ── Recording ───────────────────────────────────────────────────
        self.counter += 1;
        let id = format!("{}-{}", epoch_ms(), self.counter);
        log::debug!("session {id}: recording");

        *self.session.lock().unwrap() = Some(Session::new(id));
        self.recorder.start_recording();
        self.emit(SessionEvent::StateChanged(SessionStatus::Recording))
            .await;

        let watchdog = tokio::time::sleep(self.options.max_recording);
        tokio::pin!(watchdog);

        let cause = loop {
            tokio::select! {
                maybe = hotkey_rx.recv() => match maybe {
                    Some(HotkeyEvent::Released) => break StopCause::Released,
                    // The monitor suppresses re-entrant presses; one can
                    // still arrive if it restarted mid-hold.
                    Some(HotkeyEvent::Pressed) => {
                        log::debug!("session: press while recording, ignoring");
                    }
                    None => break StopCause::Released,
                },
                _ = &mut watchdog => break StopCause::Watchdog,
                _ = shutdown_rx.changed() => break StopCause::Shutdown,
            }
        };

        if let StopCause::Shutdown = cause {
            self.cancel().await;
            return Outcome::Shutdown;
        }
        if let StopCause::Watchdog = cause {
            log::warn!(
                "session: max recording duration {:?} reached, stopping",
                self.options.max_recording
            );
            // The eventual hotkey release will find no session in flight
            // and is ignored by the main loop.
        }

        // ── Stop + gate ─────────────────────────────────────────────────
        let audio = self.recorder.stop_recording();
        self.finish_recording_clock();

        if audio.is_empty() {
            self.skip("no audio").await;
            return Outcome::Continue;
        }

        let duration_secs = audio.len() as f32 / TARGET_SAMPLE_RATE as f32;
        if duration_secs < self.options.min_recording.as_secs_f32() {
            self.skip("too short").await;
            return Outcome::Continue;
        }

        // Silence is cheaper to reject here than to feed to a subprocess
        // that will time out on it.
        let level = rms(&audio);
        if level < self.options.min_audio_rms {
            self.skip("no speech").await;
            return Outcome::Continue;
        }

        // ── Transcribe ──────────────────────────────────────────────────
        self.set_status(SessionStatus::Transcribing);
        self.emit(SessionEvent::StateChanged(SessionStatus::Transcribing))
            .await;
        log::debug!(
            "session: transcribing {:.2}s of audio (rms {:.3})",
            duration_secs,
            level
        );

        let result = tokio::select! {
            result = self.stt.transcribe(audio, self.options.transcription_timeout) => result,
            _ = shutdown_rx.changed() => {
                // Dropping the transcribe future kills the worker child.
                self.cancel().await;
                return Outcome::Shutdown;
            }
        };

        let transcription = match result {
            Ok(result) => result,
            Err(SttError::Timeout) => {
                self.fail(SessionStatus::Timeout, SttError::Timeout.to_string())
                    .await;
                return Outcome::Continue;
            }
            Err(e) => {
                self.fail(SessionStatus::Error, e.to_string()).await;
                return Outcome::Continue;
            }
        };

        self.emit(SessionEvent::Transcription(transcription.text.clone()))
            .await;

        if transcription.text.trim().is_empty() {
            log::debug!("session: empty transcription, nothing to inject");
            self.with_session(|s| {
                s.transcription = Some(transcription.text.clone());
                s.status = SessionStatus::Complete;
            });
            self.emit(SessionEvent::StateChanged(SessionStatus::Complete))
                .await;
            return Outcome::Continue;
        }

        if let Some(dir) = self.options.transcripts_dir.clone() {
            save_transcript(&dir, &transcription.text);
        }

        // ── Inject ──────────────────────────────────────────────────────
        // Sanitization happens exactly once, here, for either backend.
        let payload = self.sanitizer.sanitize(&transcription.text);

        self.with_session(|s| {
            s.transcription = Some(transcription.text.clone());
            s.status = SessionStatus::Injecting;
        });
        self.emit(SessionEvent::StateChanged(SessionStatus::Injecting))
            .await;

        let injected = self.injector.inject(&payload).await;

        let injected = match injected {
            Ok(()) if self.options.auto_return => {
                tokio::time::sleep(AUTO_RETURN_DELAY).await;
                self.injector.press_enter().await
            }
            other => other,
        };

        match injected {
            Ok(()) => {
                log::info!("session: injected {} bytes via {}", payload.len(), self.injector.name());
                self.set_status(SessionStatus::Complete);
                self.emit(SessionEvent::StateChanged(SessionStatus::Complete))
                    .await;
            }
            Err(e) => {
                self.fail(SessionStatus::Error, e.to_string()).await;
            }
        }

        Outcome::Continue
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Move the current session to `cancelled` and discard captured audio.
    async fn cancel(&self) {
        self.recorder.cancel_recording();
        self.with_session(|s| {
            if !s.status.is_terminal() {
                s.status = SessionStatus::Cancelled;
                s.ended_at.get_or_insert_with(std::time::Instant::now);
            }
        });
        self.emit(SessionEvent::StateChanged(SessionStatus::Cancelled))
            .await;
        log::info!("session: cancelled");
    }

    async fn skip(&self, reason: &str) {
        log::info!("session: skipped ({reason})");
        self.set_status(SessionStatus::Skipped);
        self.emit(SessionEvent::Skipped(reason.to_string())).await;
        self.emit(SessionEvent::StateChanged(SessionStatus::Idle))
            .await;
    }

    async fn fail(&self, status: SessionStatus, message: String) {
        log::error!("session: {message}");
        self.with_session(|s| {
            s.status = status;
            s.error = Some(message.clone());
        });
        self.emit(SessionEvent::StateChanged(status)).await;
        self.emit(SessionEvent::Error(message)).await;
    }

    fn finish_recording_clock(&self) {
        self.with_session(|s| {
            let ended = std::time::Instant::now();
            s.ended_at = Some(ended);
            s.duration_ms = ended.duration_since(s.started_at).as_millis() as u64;
        });
    }

    fn set_status(&self, status: SessionStatus) {
        self.with_session(|s| s.status = status);
    }

    /// Mutate the current session under the lock.  The lock is held only
    /// for the closure, never across an await point.
    fn with_session(&self, f: impl FnOnce(&mut Session)) {
        let mut guard = self.session.lock().unwrap();
        if let Some(session) = guard.as_mut() {
            f(session);
        }
    }

    async fn emit(&self, event: SessionEvent) {
        if let SessionEvent::StateChanged(next) = event {
            debug_assert!(
                next == SessionStatus::Idle
                    || next == SessionStatus::Recording
                    || self
                        .session
                        .lock()
                        .unwrap()
                        .as_ref()
                        .is_some_and(|s| s.status == next),
                "status event does not match session state"
            );
        }
        let _ = self.events.send(event).await;
    }
}

// ---------------------------------------------------------------------------
// Transcript persistence
// ---------------------------------------------------------------------------

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Append one transcription as `transcript_<epoch_ms>.txt`.  Observational
/// only; failures are logged and ignored.
fn save_transcript(dir: &std::path::Path, text: &str) {
    let stamp = epoch_ms();
    let write = || -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("transcript_{stamp}.txt"));
        std::fs::write(path, format!("Timestamp: {stamp}\nText: {text}\n"))
    };
    if let Err(e) = write() {
        log::warn!("session: cannot save transcript: {e}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
