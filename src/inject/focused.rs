//! Focused-window injection via synthesized keystrokes.
//!
//! Types the payload into whatever window has keyboard focus using `enigo`.
//! With a zero typing delay the whole string goes out in one call; a
//! non-zero delay types character by character with a sleep in between, for
//! targets that drop input when it arrives too fast.
//!
//! `Enigo` is not `Send`, so a fresh handle is created per call inside
//! `spawn_blocking`; the handle is cheap to construct.

use std::time::Duration;

use async_trait::async_trait;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use super::{InjectError, TextInjector};

// ---------------------------------------------------------------------------
// FocusedInjector
// ---------------------------------------------------------------------------

/// Injects text by typing into the currently focused window.
pub struct FocusedInjector {
    typing_delay: Duration,
}

impl FocusedInjector {
    /// `typing_delay` of zero types the whole payload in a single call.
    pub fn new(typing_delay: Duration) -> Self {
        Self { typing_delay }
    }
}

fn new_enigo() -> Result<Enigo, InjectError> {
    Enigo::new(&Settings::default()).map_err(|e| InjectError::Keystroke(e.to_string()))
}

fn type_text(text: &str, delay: Duration) -> Result<(), InjectError> {
    let mut enigo = new_enigo()?;

    if delay.is_zero() {
        enigo
            .text(text)
            .map_err(|e| InjectError::Keystroke(e.to_string()))?;
        return Ok(());
    }

    for c in text.chars() {
        enigo
            .text(&c.to_string())
            .map_err(|e| InjectError::Keystroke(e.to_string()))?;
        std::thread::sleep(delay);
    }
    Ok(())
}

fn tap_return() -> Result<(), InjectError> {
    let mut enigo = new_enigo()?;
    enigo
        .key(Key::Return, Direction::Click)
        .map_err(|e| InjectError::Keystroke(e.to_string()))
}

#[async_trait]
impl TextInjector for FocusedInjector {
    async fn inject(&self, text: &str) -> Result<(), InjectError> {
        if text.is_empty() {
            return Err(InjectError::EmptyText);
        }

        let text = text.to_string();
        let delay = self.typing_delay;

        tokio::task::spawn_blocking(move || type_text(&text, delay))
            .await
            .map_err(|e| InjectError::Keystroke(format!("typing task failed: {e}")))?
    }

    async fn press_enter(&self) -> Result<(), InjectError> {
        tokio::task::spawn_blocking(tap_return)
            .await
            .map_err(|e| InjectError::Keystroke(format!("typing task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "focused"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Empty payloads are rejected before any OS input API is touched.
    #[tokio::test]
    async fn empty_text_is_rejected() {
        let injector = FocusedInjector::new(Duration::ZERO);
        let err = injector.inject("").await.unwrap_err();
        assert!(matches!(err, InjectError::EmptyText));
    }

    #[test]
    fn backend_name() {
        assert_eq!(FocusedInjector::new(Duration::ZERO).name(), "focused");
    }
}
