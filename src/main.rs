//! Daemon entry point.
//!
//! # Startup sequence
//!
//! 1. Dispatch to the `stt-worker` child entry point when invoked as one.
//! 2. Initialise logging.
//! 3. Load and validate [`AppConfig`] (defaults on first run).
//! 4. Create the tokio runtime.
//! 5. Open the microphone and spawn the accumulator thread.
//! 6. Resolve the injection target (tmux discovery happens here, so a
//!    missing assistant pane fails at startup rather than mid-session).
//! 7. Optionally preload the Whisper model.
//! 8. Spawn the session orchestrator and start the hotkey monitor.
//! 9. Consume session events (logging + audio cues) until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};

use push_to_talk::audio::{AudioCapture, Recorder};
use push_to_talk::config::{AppConfig, InjectionMode};
use push_to_talk::feedback::AudioFeedback;
use push_to_talk::hotkey::{DeviceStateProbe, Hotkey, HotkeyMonitor};
use push_to_talk::inject::{
    tmux::is_tmux_available, FocusedInjector, Sanitizer, TextInjector, TmuxInjector,
};
use push_to_talk::session::{
    OrchestratorOptions, SessionEvent, SessionOrchestrator, SessionStatus,
};
use push_to_talk::stt::{
    worker, ComputeDevice, ModelSize, SpeechToText, Transcriber, WORKER_SUBCOMMAND,
};

/// Budget for the optional model preload: a cold start may include the
/// model download itself.
const PRELOAD_TIMEOUT: Duration = Duration::from_secs(900);

/// How long shutdown waits for the orchestrator to reach a terminal state.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Worker dispatch first: the child must never touch the daemon's
    // devices or listeners.
    if args.get(1).map(String::as_str) == Some(WORKER_SUBCOMMAND) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
        std::process::exit(worker::run(&args[2..]));
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("push-to-talk starting up");

    // Configuration
    let config = AppConfig::load().context("cannot load config.toml")?;
    let problems = config.validate();
    if !problems.is_empty() {
        bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
    }

    let hotkey = Hotkey::parse(&config.hotkey.key)?;
    let model = ModelSize::parse(&config.whisper.model)?;
    let device = ComputeDevice::parse(&config.whisper.device)?;

    // Runtime: one worker for the orchestrator, one for blocking offload.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // Audio capture: the stream runs for the daemon's lifetime, the
    // recorder flag decides what is retained.
    let recorder = Recorder::new();
    let capture =
        AudioCapture::new(config.audio.device_index).context("audio capture unavailable")?;
    let (chunk_tx, chunk_rx) = std::sync::mpsc::channel();
    let _accumulator = recorder.spawn_accumulator(chunk_rx);
    let _stream = capture
        .start(chunk_tx)
        .context("cannot start audio stream")?;
    log::info!(
        "audio: capturing at {} Hz, {} channel(s)",
        capture.sample_rate(),
        capture.channels()
    );

    // Injection target. Shell escaping only ever applies to the tmux
    // backend; focused mode types keystrokes, not shell words.
    let escape_shell = config.injection.mode == InjectionMode::Tmux && config.sanitizer.escape_shell;
    let sanitizer = Sanitizer::new(config.sanitizer.max_length, escape_shell);

    let (injector, target_desc): (Arc<dyn TextInjector>, String) = match config.injection.mode {
        InjectionMode::Focused => {
            let delay = Duration::from_millis(config.injection.typing_delay_ms);
            (
                Arc::new(FocusedInjector::new(delay)),
                "focused window".into(),
            )
        }
        InjectionMode::Tmux => rt.block_on(async {
            if !is_tmux_available().await {
                bail!("injection mode is 'tmux' but tmux is not available");
            }
            let injector = TmuxInjector::resolve(&config.tmux)
                .await
                .context("cannot resolve a tmux injection target")?;
            injector
                .validate_target()
                .await
                .context("resolved tmux target is not reachable")?;
            let desc = format!("tmux pane {}", injector.target());
            Ok((Arc::new(injector) as Arc<dyn TextInjector>, desc))
        })?,
    };
    log::info!("inject: target is {target_desc}");

    // Transcriber (+ optional warm-up so the first session is not slow).
    let transcriber = Transcriber::new(model, device, config.whisper.language.clone());
    if config.whisper.preload {
        if let Err(e) = rt.block_on(transcriber.preload(PRELOAD_TIMEOUT)) {
            log::warn!("stt: preload failed ({e}); will retry on first session");
        }
    }
    let stt: Arc<dyn SpeechToText> = Arc::new(transcriber);

    // Channels
    let (hotkey_tx, hotkey_rx) = mpsc::channel(16);
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Orchestrator
    let options = OrchestratorOptions {
        min_recording: Duration::from_secs_f32(config.session.min_recording_secs),
        min_audio_rms: config.session.min_audio_rms,
        max_recording: Duration::from_secs_f32(config.session.max_recording_secs),
        transcription_timeout: Duration::from_secs_f32(config.session.transcription_timeout_secs),
        // Auto-return is confined to the tmux backend.
        auto_return: config.session.auto_return && config.injection.mode == InjectionMode::Tmux,
        transcripts_dir: config
            .logging
            .save_transcripts
            .then(|| config.logging.transcripts_dir.clone().into()),
    };
    let orchestrator = SessionOrchestrator::new(
        recorder,
        stt,
        injector,
        sanitizer,
        events_tx,
        options,
    );
    let orchestrator_task = rt.spawn(orchestrator.run(hotkey_rx, shutdown_rx));

    // Hotkey monitor
    let mut monitor = HotkeyMonitor::with_options(
        hotkey,
        hotkey_tx,
        Duration::from_secs_f32(config.hotkey.stuck_key_timeout_secs),
        Duration::from_millis(config.hotkey.poll_interval_ms),
        Box::new(DeviceStateProbe::new()),
    )?;
    monitor.start();

    print_banner(&config, &target_desc);

    // Event loop until SIGINT/SIGTERM.
    let feedback = AudioFeedback::new(config.feedback.audio_cues);
    rt.block_on(async {
        let shutdown_signal = wait_for_signal();
        tokio::pin!(shutdown_signal);

        loop {
            tokio::select! {
                maybe = events_rx.recv() => match maybe {
                    Some(event) => handle_event(event, &feedback),
                    None => break,
                },
                _ = &mut shutdown_signal => {
                    log::info!("shutdown requested");
                    break;
                }
            }
        }
    });

    // Graceful shutdown: cancel the session, stop the monitor, give the
    // orchestrator a bounded grace period.
    let _ = shutdown_tx.send(true);
    monitor.stop();
    let _ = rt.block_on(async {
        tokio::time::timeout(SHUTDOWN_GRACE, orchestrator_task).await
    });

    println!("\npush-to-talk stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Event handling
// ---------------------------------------------------------------------------

fn handle_event(event: SessionEvent, feedback: &AudioFeedback) {
    match event {
        SessionEvent::StateChanged(status) => match status {
            SessionStatus::Recording => {
                feedback.play_start();
                log::info!("recording...");
            }
            SessionStatus::Transcribing => {
                feedback.play_stop();
                log::info!("transcribing...");
            }
            SessionStatus::Complete => {
                feedback.play_success();
            }
            other => {
                log::debug!("session state: {}", other.label());
            }
        },
        SessionEvent::Transcription(text) => {
            if text.is_empty() {
                log::info!("transcribed: (nothing)");
            } else {
                log::info!("transcribed: {text}");
            }
        }
        // Terminal errors get the error cue; skips stay silent so an
        // accidental tap does not beep at the user.
        SessionEvent::Error(message) => {
            feedback.play_error();
            log::error!("{message}");
        }
        SessionEvent::Skipped(reason) => {
            log::info!("skipped: {reason}");
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// ---------------------------------------------------------------------------
// Banner
// ---------------------------------------------------------------------------

fn print_banner(config: &AppConfig, target_desc: &str) {
    let line = "=".repeat(60);
    println!("\n{line}");
    println!("Push-to-Talk Voice Input");
    println!("{line}");
    println!("Hotkey:     {}", config.hotkey.key);
    println!("Target:     {target_desc}");
    println!(
        "Model:      whisper {} ({})",
        config.whisper.model, config.whisper.device
    );
    println!("\nHold the hotkey to speak; release to transcribe and inject.");
    println!("Press Ctrl+C to exit.");
    println!("{line}\n");
}
