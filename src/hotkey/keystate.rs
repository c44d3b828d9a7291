//! Live keyboard-state probing for the release poller.
//!
//! Release *events* can be swallowed when another consumer (a terminal UI,
//! a global shortcut daemon) sits on the same event stream.  Polling the
//! OS keyboard state answers "is the key physically down right now?" without
//! depending on event delivery at all.
//!
//! [`KeyStateProbe::is_pressed`] returns `Option<bool>`: `None` means the
//! probe cannot answer for this key on this platform, in which case the
//! poller conservatively assumes the key is still held and the stuck-key
//! watchdog remains the sole fallback.

use device_query::{DeviceQuery, DeviceState, Keycode};

use super::Hotkey;

// ---------------------------------------------------------------------------
// KeyStateProbe
// ---------------------------------------------------------------------------

/// Answers whether a hotkey is currently depressed.
///
/// Implementations must be cheap enough to call every poll interval
/// (100 ms by default) and must never block.
pub trait KeyStateProbe: Send + Sync {
    /// `Some(true)` while the key is held, `Some(false)` once it is up, and
    /// `None` when the state cannot be determined.
    fn is_pressed(&self, key: Hotkey) -> Option<bool>;
}

// ---------------------------------------------------------------------------
// DeviceStateProbe
// ---------------------------------------------------------------------------

/// Production probe backed by the `device_query` crate.
///
/// A fresh `DeviceState` is acquired per call; the handle is not `Send` on
/// every platform and acquisition is cheap relative to the poll interval.
/// Keys `device_query` has no keycode for (the command keys, F13-F20)
/// report `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceStateProbe;

impl DeviceStateProbe {
    pub fn new() -> Self {
        Self
    }
}

fn device_keycode(key: Hotkey) -> Option<Keycode> {
    let code = match key {
        Hotkey::CtrlLeft => Keycode::LControl,
        Hotkey::CtrlRight => Keycode::RControl,
        Hotkey::AltLeft => Keycode::LAlt,
        Hotkey::AltRight => Keycode::RAlt,
        Hotkey::ShiftLeft => Keycode::LShift,
        Hotkey::ShiftRight => Keycode::RShift,
        Hotkey::F1 => Keycode::F1,
        Hotkey::F2 => Keycode::F2,
        Hotkey::F3 => Keycode::F3,
        Hotkey::F4 => Keycode::F4,
        Hotkey::F5 => Keycode::F5,
        Hotkey::F6 => Keycode::F6,
        Hotkey::F7 => Keycode::F7,
        Hotkey::F8 => Keycode::F8,
        Hotkey::F9 => Keycode::F9,
        Hotkey::F10 => Keycode::F10,
        Hotkey::F11 => Keycode::F11,
        Hotkey::F12 => Keycode::F12,
        _ => return None,
    };
    Some(code)
}

impl KeyStateProbe for DeviceStateProbe {
    fn is_pressed(&self, key: Hotkey) -> Option<bool> {
        let keycode = device_keycode(key)?;
        // checked_new returns None when the platform backend is unavailable
        // (e.g. headless Linux without an X11 display).
        let state = DeviceState::checked_new()?;
        Some(state.get_keys().contains(&keycode))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_keys_report_unknown() {
        // F13+ and the command keys have no device_query keycode; the probe
        // must decline rather than guess.
        let probe = DeviceStateProbe::new();
        assert_eq!(probe.is_pressed(Hotkey::F13), None);
        assert_eq!(probe.is_pressed(Hotkey::CmdLeft), None);
        assert_eq!(probe.is_pressed(Hotkey::CmdRight), None);
    }

    #[test]
    fn modifier_and_fkey_mappings_exist() {
        assert!(device_keycode(Hotkey::CtrlRight).is_some());
        assert!(device_keycode(Hotkey::ShiftLeft).is_some());
        assert!(device_keycode(Hotkey::F1).is_some());
        assert!(device_keycode(Hotkey::F12).is_some());
    }
}
