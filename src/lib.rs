//! Push-to-talk voice input daemon.
//!
//! Hold a configured hotkey to record from the microphone; on release the
//! recording is transcribed with a local Whisper model and the resulting text
//! is injected into a downstream consumer, either the focused window or a
//! tmux pane running an interactive assistant session.
//!
//! # Architecture
//!
//! ```text
//! rdev listener thread          cpal callback thread
//!   HotkeyMonitor                  AudioCapture
//!        │ HotkeyEvent (mpsc)           │ AudioChunk (mpsc)
//!        ▼                              ▼
//!  SessionOrchestrator  ◀───────── Recorder (16 kHz mono buffer)
//!        │
//!        ├─▶ Transcriber ──▶ `push-to-talk stt-worker` child process
//!        ├─▶ Sanitizer
//!        └─▶ TextInjector (FocusedInjector | TmuxInjector)
//!        │
//!        ▼ SessionEvent (mpsc) ──▶ daemon event loop (log + audio cues)
//! ```
//!
//! The Whisper model runs in a child process spawned per transcription so
//! that its native thread pools and file descriptors never interfere with
//! the host's keyboard listener or terminal.

pub mod audio;
pub mod config;
pub mod feedback;
pub mod hotkey;
pub mod inject;
pub mod session;
pub mod stt;
