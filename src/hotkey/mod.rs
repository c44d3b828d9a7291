//! Push-to-talk hotkey vocabulary and global monitor, backed by `rdev`.
//!
//! # Design
//!
//! One key from a fixed vocabulary (modifier keys and F1-F20) acts as the
//! push-to-talk trigger.  [`HotkeyMonitor`] owns the rdev listener thread and
//! guarantees that every delivered press is eventually followed by exactly
//! one release, even when the raw release event is swallowed by whatever
//! else is consuming terminal key input.  See [`monitor`] for the
//! watchdog / polling fallback machinery.
//!
//! # Usage
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use push_to_talk::hotkey::{Hotkey, HotkeyEvent, HotkeyMonitor};
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let key = Hotkey::parse("ctrl_r").expect("unknown key");
//! let mut monitor = HotkeyMonitor::new(key, tx).expect("unsupported key");
//! monitor.start();
//!
//! // In your async loop:
//! // while let Some(ev) = rx.recv().await { ... }
//! ```

pub mod keystate;
pub mod monitor;

pub use keystate::{DeviceStateProbe, KeyStateProbe};
pub use monitor::HotkeyMonitor;

use thiserror::Error;

// ---------------------------------------------------------------------------
// HotkeyEvent / HotkeyState
// ---------------------------------------------------------------------------

/// Events emitted by the hotkey monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The push-to-talk key went down.
    Pressed,
    /// The push-to-talk key came up, either observed natively or synthesized
    /// by the poller / watchdog.
    Released,
}

/// State of the monitored hotkey, guarded by a mutex inside the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyState {
    Idle,
    Pressed,
}

// ---------------------------------------------------------------------------
// HotkeyError
// ---------------------------------------------------------------------------

/// Errors raised while resolving or starting a hotkey binding.
#[derive(Debug, Clone, Error)]
pub enum HotkeyError {
    /// The configured key name is not in the supported vocabulary.
    #[error("unsupported hotkey '{0}'; supported: {}", supported_names())]
    Unknown(String),

    /// The key exists in the vocabulary but cannot be observed by the
    /// listener on this platform (F13-F20 outside macOS).
    #[error("hotkey '{0}' is not observable on this platform; use f1-f12 or a modifier key")]
    UnsupportedOnPlatform(Hotkey),
}

// ---------------------------------------------------------------------------
// Hotkey
// ---------------------------------------------------------------------------

/// The fixed vocabulary of push-to-talk keys.
///
/// Modifier keys make good hold-to-talk triggers because they never produce
/// text on their own; F13-F20 are ideal on keyboards that have them since
/// nothing else binds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hotkey {
    CtrlLeft,
    CtrlRight,
    AltLeft,
    AltRight,
    CmdLeft,
    CmdRight,
    ShiftLeft,
    ShiftRight,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
}

/// All supported hotkeys, in vocabulary order.
pub const ALL_HOTKEYS: &[Hotkey] = &[
    Hotkey::CtrlLeft,
    Hotkey::CtrlRight,
    Hotkey::AltLeft,
    Hotkey::AltRight,
    Hotkey::CmdLeft,
    Hotkey::CmdRight,
    Hotkey::ShiftLeft,
    Hotkey::ShiftRight,
    Hotkey::F1,
    Hotkey::F2,
    Hotkey::F3,
    Hotkey::F4,
    Hotkey::F5,
    Hotkey::F6,
    Hotkey::F7,
    Hotkey::F8,
    Hotkey::F9,
    Hotkey::F10,
    Hotkey::F11,
    Hotkey::F12,
    Hotkey::F13,
    Hotkey::F14,
    Hotkey::F15,
    Hotkey::F16,
    Hotkey::F17,
    Hotkey::F18,
    Hotkey::F19,
    Hotkey::F20,
];

fn supported_names() -> String {
    ALL_HOTKEYS
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Hotkey {
    /// Parse a hotkey name from a config string.
    ///
    /// # Examples
    ///
    /// ```
    /// use push_to_talk::hotkey::Hotkey;
    ///
    /// assert_eq!(Hotkey::parse("ctrl_r").unwrap(), Hotkey::CtrlRight);
    /// assert_eq!(Hotkey::parse("f13").unwrap(), Hotkey::F13);
    /// assert!(Hotkey::parse("space").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, HotkeyError> {
        let key = match name {
            "ctrl_l" => Hotkey::CtrlLeft,
            "ctrl_r" => Hotkey::CtrlRight,
            "alt_l" => Hotkey::AltLeft,
            "alt_r" => Hotkey::AltRight,
            "cmd_l" => Hotkey::CmdLeft,
            "cmd_r" => Hotkey::CmdRight,
            "shift_l" => Hotkey::ShiftLeft,
            "shift_r" => Hotkey::ShiftRight,
            "f1" => Hotkey::F1,
            "f2" => Hotkey::F2,
            "f3" => Hotkey::F3,
            "f4" => Hotkey::F4,
            "f5" => Hotkey::F5,
            "f6" => Hotkey::F6,
            "f7" => Hotkey::F7,
            "f8" => Hotkey::F8,
            "f9" => Hotkey::F9,
            "f10" => Hotkey::F10,
            "f11" => Hotkey::F11,
            "f12" => Hotkey::F12,
            "f13" => Hotkey::F13,
            "f14" => Hotkey::F14,
            "f15" => Hotkey::F15,
            "f16" => Hotkey::F16,
            "f17" => Hotkey::F17,
            "f18" => Hotkey::F18,
            "f19" => Hotkey::F19,
            "f20" => Hotkey::F20,
            other => return Err(HotkeyError::Unknown(other.to_string())),
        };
        Ok(key)
    }

    /// The canonical config-file name of this key.  Round-trips through
    /// [`Hotkey::parse`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Hotkey::CtrlLeft => "ctrl_l",
            Hotkey::CtrlRight => "ctrl_r",
            Hotkey::AltLeft => "alt_l",
            Hotkey::AltRight => "alt_r",
            Hotkey::CmdLeft => "cmd_l",
            Hotkey::CmdRight => "cmd_r",
            Hotkey::ShiftLeft => "shift_l",
            Hotkey::ShiftRight => "shift_r",
            Hotkey::F1 => "f1",
            Hotkey::F2 => "f2",
            Hotkey::F3 => "f3",
            Hotkey::F4 => "f4",
            Hotkey::F5 => "f5",
            Hotkey::F6 => "f6",
            Hotkey::F7 => "f7",
            Hotkey::F8 => "f8",
            Hotkey::F9 => "f9",
            Hotkey::F10 => "f10",
            Hotkey::F11 => "f11",
            Hotkey::F12 => "f12",
            Hotkey::F13 => "f13",
            Hotkey::F14 => "f14",
            Hotkey::F15 => "f15",
            Hotkey::F16 => "f16",
            Hotkey::F17 => "f17",
            Hotkey::F18 => "f18",
            Hotkey::F19 => "f19",
            Hotkey::F20 => "f20",
        }
    }
}

impl std::fmt::Display for Hotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Listener matching
// ---------------------------------------------------------------------------

/// How the rdev listener recognises the configured key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyMatch {
    /// Matched against a named `rdev::Key` variant.
    Key(rdev::Key),
    /// Matched against `rdev::Key::Unknown(code)` (macOS F13-F20, which rdev
    /// reports by raw virtual keycode).
    Raw(u32),
}

impl KeyMatch {
    pub(crate) fn matches(&self, key: rdev::Key) -> bool {
        match *self {
            KeyMatch::Key(want) => key == want,
            KeyMatch::Raw(code) => key == rdev::Key::Unknown(code),
        }
    }
}

/// macOS virtual keycodes for the extended function keys.
#[cfg(target_os = "macos")]
fn macos_fkey_code(key: Hotkey) -> Option<u32> {
    let code = match key {
        Hotkey::F13 => 105,
        Hotkey::F14 => 107,
        Hotkey::F15 => 113,
        Hotkey::F16 => 106,
        Hotkey::F17 => 64,
        Hotkey::F18 => 79,
        Hotkey::F19 => 80,
        Hotkey::F20 => 90,
        _ => return None,
    };
    Some(code)
}

pub(crate) fn listener_match(key: Hotkey) -> Result<KeyMatch, HotkeyError> {
    use rdev::Key as K;

    let matched = match key {
        Hotkey::CtrlLeft => KeyMatch::Key(K::ControlLeft),
        Hotkey::CtrlRight => KeyMatch::Key(K::ControlRight),
        Hotkey::AltLeft => KeyMatch::Key(K::Alt),
        Hotkey::AltRight => KeyMatch::Key(K::AltGr),
        Hotkey::CmdLeft => KeyMatch::Key(K::MetaLeft),
        Hotkey::CmdRight => KeyMatch::Key(K::MetaRight),
        Hotkey::ShiftLeft => KeyMatch::Key(K::ShiftLeft),
        Hotkey::ShiftRight => KeyMatch::Key(K::ShiftRight),
        Hotkey::F1 => KeyMatch::Key(K::F1),
        Hotkey::F2 => KeyMatch::Key(K::F2),
        Hotkey::F3 => KeyMatch::Key(K::F3),
        Hotkey::F4 => KeyMatch::Key(K::F4),
        Hotkey::F5 => KeyMatch::Key(K::F5),
        Hotkey::F6 => KeyMatch::Key(K::F6),
        Hotkey::F7 => KeyMatch::Key(K::F7),
        Hotkey::F8 => KeyMatch::Key(K::F8),
        Hotkey::F9 => KeyMatch::Key(K::F9),
        Hotkey::F10 => KeyMatch::Key(K::F10),
        Hotkey::F11 => KeyMatch::Key(K::F11),
        Hotkey::F12 => KeyMatch::Key(K::F12),
        extended => {
            #[cfg(target_os = "macos")]
            {
                match macos_fkey_code(extended) {
                    Some(code) => KeyMatch::Raw(code),
                    None => return Err(HotkeyError::UnsupportedOnPlatform(extended)),
                }
            }
            #[cfg(not(target_os = "macos"))]
            {
                return Err(HotkeyError::UnsupportedOnPlatform(extended));
            }
        }
    };
    Ok(matched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modifier_keys() {
        assert_eq!(Hotkey::parse("ctrl_r").unwrap(), Hotkey::CtrlRight);
        assert_eq!(Hotkey::parse("ctrl_l").unwrap(), Hotkey::CtrlLeft);
        assert_eq!(Hotkey::parse("cmd_l").unwrap(), Hotkey::CmdLeft);
        assert_eq!(Hotkey::parse("shift_r").unwrap(), Hotkey::ShiftRight);
    }

    #[test]
    fn parse_function_keys() {
        assert_eq!(Hotkey::parse("f1").unwrap(), Hotkey::F1);
        assert_eq!(Hotkey::parse("f12").unwrap(), Hotkey::F12);
        assert_eq!(Hotkey::parse("f20").unwrap(), Hotkey::F20);
    }

    #[test]
    fn parse_unknown_key_errors() {
        assert!(Hotkey::parse("space").is_err());
        assert!(Hotkey::parse("").is_err());
        assert!(Hotkey::parse("F13").is_err()); // names are lowercase
    }

    #[test]
    fn unknown_key_error_lists_vocabulary() {
        let err = Hotkey::parse("banana").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("banana"));
        assert!(msg.contains("ctrl_r"));
        assert!(msg.contains("f20"));
    }

    #[test]
    fn every_hotkey_round_trips_through_parse() {
        for &key in ALL_HOTKEYS {
            assert_eq!(Hotkey::parse(key.as_str()).unwrap(), key);
        }
    }

    #[test]
    fn standard_keys_resolve_to_rdev_variants() {
        assert_eq!(
            listener_match(Hotkey::CtrlRight).unwrap(),
            KeyMatch::Key(rdev::Key::ControlRight)
        );
        assert_eq!(
            listener_match(Hotkey::F9).unwrap(),
            KeyMatch::Key(rdev::Key::F9)
        );
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn extended_fkeys_unsupported_off_macos() {
        assert!(matches!(
            listener_match(Hotkey::F13),
            Err(HotkeyError::UnsupportedOnPlatform(Hotkey::F13))
        ));
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn extended_fkeys_resolve_to_raw_codes_on_macos() {
        assert_eq!(listener_match(Hotkey::F13).unwrap(), KeyMatch::Raw(105));
        assert_eq!(listener_match(Hotkey::F20).unwrap(), KeyMatch::Raw(90));
    }

    #[test]
    fn key_match_compares_unknown_codes() {
        let m = KeyMatch::Raw(105);
        assert!(m.matches(rdev::Key::Unknown(105)));
        assert!(!m.matches(rdev::Key::Unknown(106)));
        assert!(!m.matches(rdev::Key::F1));
    }
}
