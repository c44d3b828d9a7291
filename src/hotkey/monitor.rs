//! Global hotkey monitor with watchdog and polling fallback.
//!
//! `rdev::listen` is a blocking call that must live on its own OS thread.
//! [`HotkeyMonitor`] owns that thread plus, while the key is held, one
//! short-lived *release guard* thread that closes the gap when the native
//! release event never arrives:
//!
//! 1. every poll interval it asks the [`KeyStateProbe`] whether the key is
//!    still physically down, and synthesizes a release when it is not;
//! 2. after the stuck-key timeout it synthesizes a release unconditionally.
//!
//! A natural release event from the listener wins when it arrives first.
//! All three paths funnel through the same state transition under one mutex,
//! so for every `Pressed` event exactly one `Released` event is delivered.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has no graceful shutdown API.  [`HotkeyMonitor::stop`]
//! sets a stop flag so the callback discards further events, but the
//! listener OS thread remains blocked in the rdev event loop until the
//! process exits.  This is safe and expected; rdev holds no resources that
//! need explicit cleanup.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::keystate::{DeviceStateProbe, KeyStateProbe};
use super::{listener_match, Hotkey, HotkeyError, HotkeyEvent, HotkeyState, KeyMatch};

/// Default time after which a press with no observed release is forced.
pub const STUCK_KEY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between key-state polls while the key is held.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// MonitorShared
// ---------------------------------------------------------------------------

/// State shared between the listener thread, the release guard thread and
/// the owning [`HotkeyMonitor`].
struct MonitorShared {
    hotkey: Hotkey,
    key_match: KeyMatch,
    state: Mutex<HotkeyState>,
    events: mpsc::Sender<HotkeyEvent>,
    stop: AtomicBool,
    /// Bumped on every release; a guard thread whose captured value no
    /// longer matches knows its press is over and exits.
    press_seq: AtomicU64,
    stuck_timeout: Duration,
    poll_interval: Duration,
    probe: Box<dyn KeyStateProbe>,
}

impl MonitorShared {
    /// Press edge.  Idle -> Pressed under the lock; re-entrant presses while
    /// already `Pressed` are suppressed.  Spawns the release guard.
    fn handle_press(self: &Arc<Self>) {
        if self.stop.load(Ordering::Relaxed) {
            return;
        }

        let seq;
        {
            let mut state = self.state.lock().unwrap();
            if *state == HotkeyState::Pressed {
                return;
            }
            *state = HotkeyState::Pressed;
            seq = self.press_seq.load(Ordering::Acquire);
        }

        log::debug!("hotkey: {} pressed", self.hotkey);
        // blocking_send is correct here: press handling always runs on a
        // plain OS thread (rdev callback or test), never inside the runtime.
        let _ = self.events.blocking_send(HotkeyEvent::Pressed);

        let shared = Arc::clone(self);
        std::thread::Builder::new()
            .name("hotkey-guard".into())
            .spawn(move || shared.release_guard(seq))
            .expect("failed to spawn hotkey-guard thread");
    }

    /// Release edge.  Pressed -> Idle under the lock; releases while `Idle`
    /// are suppressed, which is what makes the three release paths converge
    /// on at most one event per press.
    fn handle_release(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if *state == HotkeyState::Idle {
                return false;
            }
            *state = HotkeyState::Idle;
            self.press_seq.fetch_add(1, Ordering::AcqRel);
        }

        log::debug!("hotkey: {} released", self.hotkey);
        let _ = self.events.blocking_send(HotkeyEvent::Released);
        true
    }

    /// Poll + watchdog loop for a single press.  Runs until the press ends,
    /// by whichever of the three release paths fires first.
    fn release_guard(&self, seq: u64) {
        let pressed_at = Instant::now();

        loop {
            std::thread::sleep(self.poll_interval);

            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            // A natural release already ended this press.
            if self.press_seq.load(Ordering::Acquire) != seq {
                return;
            }

            // Poll path: the OS says the key is up but the release event
            // never reached us.
            if self.probe.is_pressed(self.hotkey) == Some(false) {
                if self.handle_release() {
                    log::debug!("hotkey: release synthesized by poller");
                }
                return;
            }

            // Watchdog path: probe unavailable or lying; force the release
            // so the session can never record forever.
            if pressed_at.elapsed() >= self.stuck_timeout {
                if self.handle_release() {
                    log::warn!(
                        "hotkey: no release observed within {:?}, forcing release",
                        self.stuck_timeout
                    );
                }
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyMonitor
// ---------------------------------------------------------------------------

/// Monitors one configured key and reports press/release edges.
///
/// Construct with [`HotkeyMonitor::new`], then call [`start`](Self::start).
/// Events arrive on the `tokio::sync::mpsc` channel supplied at
/// construction; the sending side uses `blocking_send` so the listener
/// thread needs no runtime handle.
pub struct HotkeyMonitor {
    shared: Arc<MonitorShared>,
    listener: Option<std::thread::JoinHandle<()>>,
}

impl HotkeyMonitor {
    /// Create a monitor for `hotkey` with default timing and the
    /// `device_query` key-state probe.
    ///
    /// # Errors
    ///
    /// [`HotkeyError::UnsupportedOnPlatform`] when the key cannot be
    /// observed by the listener on this platform.
    pub fn new(hotkey: Hotkey, events: mpsc::Sender<HotkeyEvent>) -> Result<Self, HotkeyError> {
        Self::with_options(
            hotkey,
            events,
            STUCK_KEY_TIMEOUT,
            POLL_INTERVAL,
            Box::new(DeviceStateProbe::new()),
        )
    }

    /// Create a monitor with explicit timing and probe (used by the daemon
    /// to apply config values, and by tests to shorten the timeouts).
    pub fn with_options(
        hotkey: Hotkey,
        events: mpsc::Sender<HotkeyEvent>,
        stuck_timeout: Duration,
        poll_interval: Duration,
        probe: Box<dyn KeyStateProbe>,
    ) -> Result<Self, HotkeyError> {
        let key_match = listener_match(hotkey)?;
        Ok(Self {
            shared: Arc::new(MonitorShared {
                hotkey,
                key_match,
                state: Mutex::new(HotkeyState::Idle),
                events,
                stop: AtomicBool::new(false),
                press_seq: AtomicU64::new(0),
                stuck_timeout,
                poll_interval,
                probe,
            }),
            listener: None,
        })
    }

    /// Spawn the rdev listener thread.  Idempotent; non-blocking.
    pub fn start(&mut self) {
        if self.listener.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let callback_shared = Arc::clone(&shared);
                let result = rdev::listen(move |event| {
                    if callback_shared.stop.load(Ordering::Relaxed) {
                        return;
                    }
                    match event.event_type {
                        rdev::EventType::KeyPress(k) if callback_shared.key_match.matches(k) => {
                            callback_shared.handle_press();
                        }
                        rdev::EventType::KeyRelease(k) if callback_shared.key_match.matches(k) => {
                            callback_shared.handle_release();
                        }
                        _ => {}
                    }
                });

                // Listener failures are logged and swallowed: the watchdog
                // machinery depends on the monitor staying alive, and there
                // is nothing useful to propagate from this thread.
                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {e:?}");
                }
            })
            .expect("failed to spawn hotkey-listener thread");

        self.listener = Some(handle);
        log::info!("hotkey: monitoring '{}'", self.shared.hotkey);
    }

    /// Stop forwarding events and cancel any in-flight release guard.
    ///
    /// The listener OS thread cannot be joined (see module docs); it is left
    /// blocked in rdev with the stop flag set.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        // Ending the press sequence makes any running guard thread exit on
        // its next tick without synthesizing anything.
        self.shared.press_seq.fetch_add(1, Ordering::AcqRel);
        *self.shared.state.lock().unwrap() = HotkeyState::Idle;
    }

    /// Current hotkey state.
    pub fn state(&self) -> HotkeyState {
        *self.shared.state.lock().unwrap()
    }

    /// Whether the listener thread has been started.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some() && !self.shared.stop.load(Ordering::Relaxed)
    }
}

impl Drop for HotkeyMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU8;

    /// Scriptable probe: 0 = unknown, 1 = pressed, 2 = released.
    struct FakeProbe(AtomicU8);

    impl FakeProbe {
        fn pressed() -> Arc<Self> {
            Arc::new(Self(AtomicU8::new(1)))
        }
        fn unknown() -> Arc<Self> {
            Arc::new(Self(AtomicU8::new(0)))
        }
        fn set_released(&self) {
            self.0.store(2, Ordering::SeqCst);
        }
    }

    impl KeyStateProbe for Arc<FakeProbe> {
        fn is_pressed(&self, _key: Hotkey) -> Option<bool> {
            match self.0.load(Ordering::SeqCst) {
                0 => None,
                1 => Some(true),
                _ => Some(false),
            }
        }
    }

    fn make_monitor(
        probe: Arc<FakeProbe>,
        stuck_timeout: Duration,
    ) -> (HotkeyMonitor, mpsc::Receiver<HotkeyEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let monitor = HotkeyMonitor::with_options(
            Hotkey::CtrlRight,
            tx,
            stuck_timeout,
            Duration::from_millis(10),
            Box::new(probe),
        )
        .expect("ctrl_r is supported everywhere");
        (monitor, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<HotkeyEvent>) -> Vec<HotkeyEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[test]
    fn press_then_natural_release_delivers_one_pair() {
        let probe = FakeProbe::pressed();
        let (monitor, mut rx) = make_monitor(Arc::clone(&probe), Duration::from_secs(30));

        monitor.shared.handle_press();
        assert_eq!(monitor.state(), HotkeyState::Pressed);

        monitor.shared.handle_release();
        assert_eq!(monitor.state(), HotkeyState::Idle);

        // Give the guard thread time to notice the bumped sequence.
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(
            drain(&mut rx),
            vec![HotkeyEvent::Pressed, HotkeyEvent::Released]
        );
    }

    #[test]
    fn re_entrant_press_is_suppressed() {
        let probe = FakeProbe::pressed();
        let (monitor, mut rx) = make_monitor(probe, Duration::from_secs(30));

        monitor.shared.handle_press();
        monitor.shared.handle_press();
        monitor.shared.handle_release();

        assert_eq!(
            drain(&mut rx),
            vec![HotkeyEvent::Pressed, HotkeyEvent::Released]
        );
    }

    #[test]
    fn release_while_idle_is_suppressed() {
        let probe = FakeProbe::pressed();
        let (monitor, mut rx) = make_monitor(probe, Duration::from_secs(30));

        assert!(!monitor.shared.handle_release());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn poller_synthesizes_release_when_key_goes_up() {
        let probe = FakeProbe::pressed();
        let (monitor, mut rx) = make_monitor(Arc::clone(&probe), Duration::from_secs(30));

        monitor.shared.handle_press();
        probe.set_released();

        // Poll interval is 10 ms; the guard should fire well within 200 ms.
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(monitor.state(), HotkeyState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![HotkeyEvent::Pressed, HotkeyEvent::Released]
        );
    }

    #[test]
    fn watchdog_fires_when_probe_is_unavailable() {
        // Probe always answers None: the watchdog is the sole fallback.
        let probe = FakeProbe::unknown();
        let (monitor, mut rx) = make_monitor(probe, Duration::from_millis(50));

        monitor.shared.handle_press();
        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(monitor.state(), HotkeyState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![HotkeyEvent::Pressed, HotkeyEvent::Released]
        );
    }

    #[test]
    fn natural_release_cancels_watchdog() {
        let probe = FakeProbe::unknown();
        let (monitor, mut rx) = make_monitor(probe, Duration::from_millis(50));

        monitor.shared.handle_press();
        monitor.shared.handle_release();

        // Sleep past the watchdog deadline; no second release may appear.
        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(
            drain(&mut rx),
            vec![HotkeyEvent::Pressed, HotkeyEvent::Released]
        );
    }

    #[test]
    fn stop_cancels_guard_without_synthesizing() {
        let probe = FakeProbe::unknown();
        let (mut monitor, mut rx) = make_monitor(probe, Duration::from_millis(50));

        monitor.shared.handle_press();
        monitor.stop();

        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(monitor.state(), HotkeyState::Idle);
        // Only the press made it out; stop() suppressed the forced release.
        assert_eq!(drain(&mut rx), vec![HotkeyEvent::Pressed]);
    }

    #[test]
    fn two_full_press_cycles_deliver_two_pairs() {
        let probe = FakeProbe::pressed();
        let (monitor, mut rx) = make_monitor(probe, Duration::from_secs(30));

        monitor.shared.handle_press();
        monitor.shared.handle_release();
        monitor.shared.handle_press();
        monitor.shared.handle_release();

        assert_eq!(
            drain(&mut rx),
            vec![
                HotkeyEvent::Pressed,
                HotkeyEvent::Released,
                HotkeyEvent::Pressed,
                HotkeyEvent::Released,
            ]
        );
    }
}
