//! Tmux pane injection via `send-keys`.
//!
//! Every tmux invocation runs under a strict 5 s wall-clock budget with
//! `kill_on_drop`, so a wedged tmux server can never hang the session
//! worker.  Before each injection the pane is re-validated with
//! `list-panes`; a vanished pane reports [`InjectError::TargetInvalid`] and
//! no `send-keys` is issued.
//!
//! The payload is passed after a `--` terminator so text beginning with a
//! dash is never interpreted as a flag.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::TmuxConfig;

use super::{InjectError, TextInjector};

/// Wall-clock cap for a single tmux invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const PANE_FORMAT: &str = "#{window_index}:#{pane_index}:#{pane_active}:#{pane_current_command}";

// ---------------------------------------------------------------------------
// PaneTarget
// ---------------------------------------------------------------------------

/// A fully qualified tmux pane: `session:window.pane`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneTarget {
    pub session: String,
    pub window_index: u32,
    pub pane_index: u32,
}

impl std::fmt::Display for PaneTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window_index, self.pane_index)
    }
}

// ---------------------------------------------------------------------------
// Subprocess plumbing
// ---------------------------------------------------------------------------

/// Run `tmux <args>` and capture stdout, killing the process if it exceeds
/// [`COMMAND_TIMEOUT`].
async fn run_tmux(args: &[&str]) -> Result<String, InjectError> {
    let child = Command::new("tmux")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| InjectError::CommandFailed(format!("tmux spawn: {e}")))?;

    match tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                Err(InjectError::CommandFailed(format!(
                    "tmux {} exited with {}",
                    args.first().unwrap_or(&""),
                    output.status
                )))
            }
        }
        Ok(Err(e)) => Err(InjectError::CommandFailed(e.to_string())),
        Err(_elapsed) => Err(InjectError::Timeout),
    }
}

/// Whether a tmux binary is on PATH and answering.
pub async fn is_tmux_available() -> bool {
    run_tmux(&["-V"]).await.is_ok()
}

// ---------------------------------------------------------------------------
// Pane discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct PaneInfo {
    window_index: u32,
    pane_index: u32,
    active: bool,
    command: String,
}

/// Parse one `list-panes` line in [`PANE_FORMAT`].  The command field may
/// itself contain colons, so only the first three separators split.
fn parse_pane_line(line: &str) -> Option<PaneInfo> {
    let mut parts = line.splitn(4, ':');
    let window_index = parts.next()?.trim().parse().ok()?;
    let pane_index = parts.next()?.trim().parse().ok()?;
    let active = parts.next()? == "1";
    let command = parts.next().unwrap_or("").to_string();
    Some(PaneInfo {
        window_index,
        pane_index,
        active,
        command,
    })
}

fn matches_command(pane_command: &str, wanted: &[String]) -> bool {
    let lower = pane_command.to_lowercase();
    wanted.iter().any(|w| lower.contains(&w.to_lowercase()))
}

// ---------------------------------------------------------------------------
// TmuxInjector
// ---------------------------------------------------------------------------

/// Injects text into one tmux pane.
pub struct TmuxInjector {
    target: PaneTarget,
}

impl TmuxInjector {
    pub fn new(target: PaneTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &PaneTarget {
        &self.target
    }

    /// Resolve a pane from the configuration: the explicit triple when
    /// given, the first pane of an explicit session, or a scan of every
    /// session for a pane running one of the configured commands.
    pub async fn resolve(config: &TmuxConfig) -> Result<Self, InjectError> {
        if let (Some(session), Some(window), Some(pane)) = (
            config.session_name.as_ref(),
            config.window_index,
            config.pane_index,
        ) {
            return Ok(Self::new(PaneTarget {
                session: session.clone(),
                window_index: window,
                pane_index: pane,
            }));
        }

        if let Some(session) = config.session_name.as_ref() {
            return Ok(Self::new(first_pane(session).await?));
        }

        Ok(Self::new(discover(&config.command_names).await?))
    }

    /// Confirm the pane still exists.  Runs before every injection so a
    /// closed pane surfaces as [`InjectError::TargetInvalid`] rather than a
    /// stray `send-keys` against whatever tmux resolves the stale name to.
    pub async fn validate_target(&self) -> Result<(), InjectError> {
        let target = self.target.to_string();
        run_tmux(&["list-panes", "-t", &target, "-F", "#{pane_id}"])
            .await
            .map(|_| ())
            .map_err(|e| InjectError::TargetInvalid(format!("{target}: {e}")))
    }
}

/// First pane of `session`, in window order.
async fn first_pane(session: &str) -> Result<PaneTarget, InjectError> {
    let out = run_tmux(&["list-panes", "-s", "-t", session, "-F", PANE_FORMAT])
        .await
        .map_err(|e| InjectError::NoTarget(format!("session '{session}': {e}")))?;

    let info = out
        .lines()
        .find_map(parse_pane_line)
        .ok_or_else(|| InjectError::NoTarget(format!("session '{session}' has no panes")))?;

    Ok(PaneTarget {
        session: session.to_string(),
        window_index: info.window_index,
        pane_index: info.pane_index,
    })
}

/// Scan every session for a pane running one of `commands`.  An active
/// matching pane wins; otherwise the first matching pane anywhere.
async fn discover(commands: &[String]) -> Result<PaneTarget, InjectError> {
    let sessions = run_tmux(&["list-sessions", "-F", "#{session_name}"])
        .await
        .map_err(|e| InjectError::NoTarget(format!("cannot list tmux sessions: {e}")))?;

    let mut first_match: Option<PaneTarget> = None;

    for session in sessions.lines().map(str::trim).filter(|s| !s.is_empty()) {
        let Ok(out) = run_tmux(&["list-panes", "-s", "-t", session, "-F", PANE_FORMAT]).await
        else {
            continue;
        };

        for line in out.lines() {
            let Some(info) = parse_pane_line(line) else {
                continue;
            };
            if !matches_command(&info.command, commands) {
                continue;
            }

            let target = PaneTarget {
                session: session.to_string(),
                window_index: info.window_index,
                pane_index: info.pane_index,
            };

            if info.active {
                return Ok(target);
            }
            if first_match.is_none() {
                first_match = Some(target);
            }
        }
    }

    first_match
        .ok_or_else(|| InjectError::NoTarget(format!("no pane running any of {commands:?}")))
}

#[async_trait]
impl TextInjector for TmuxInjector {
    async fn inject(&self, text: &str) -> Result<(), InjectError> {
        if text.is_empty() {
            return Err(InjectError::EmptyText);
        }

        self.validate_target().await?;

        let target = self.target.to_string();
        run_tmux(&["send-keys", "-t", &target, "--", text])
            .await
            .map(|_| ())
    }

    async fn press_enter(&self) -> Result<(), InjectError> {
        let target = self.target.to_string();
        run_tmux(&["send-keys", "-t", &target, "Enter"])
            .await
            .map(|_| ())
    }

    fn name(&self) -> &'static str {
        "tmux"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
