//! Audible cues for session transitions, played through `rodio`.
//!
//! Short sine beeps mark record start, record stop, completed injection and
//! terminal errors.  Skipped recordings deliberately play nothing: an
//! accidental tap should be silent.
//!
//! Each cue plays on a throwaway thread so the caller never blocks on audio
//! output; a machine with no output device just logs at debug and moves on.

use std::time::Duration;

use rodio::{source::SineWave, OutputStream, Sink, Source};

/// Cue volume, low enough to sit under speech playback.
const CUE_AMPLITUDE: f32 = 0.20;

// ---------------------------------------------------------------------------
// AudioFeedback
// ---------------------------------------------------------------------------

/// Plays the session cues when enabled.
#[derive(Debug, Clone, Copy)]
pub struct AudioFeedback {
    enabled: bool,
}

impl AudioFeedback {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Recording started: short high beep.
    pub fn play_start(&self) {
        if self.enabled {
            play_tones(&[(880.0, 120)]);
        }
    }

    /// Recording stopped: short mid beep.
    pub fn play_stop(&self) {
        if self.enabled {
            play_tones(&[(440.0, 120)]);
        }
    }

    /// Text delivered: quick rising pair.
    pub fn play_success(&self) {
        if self.enabled {
            play_tones(&[(660.0, 90), (990.0, 120)]);
        }
    }

    /// Terminal error: falling low pair.
    pub fn play_error(&self) {
        if self.enabled {
            play_tones(&[(300.0, 150), (250.0, 200)]);
        }
    }
}

fn play_tones(tones: &[(f32, u64)]) {
    let tones = tones.to_vec();
    std::thread::spawn(move || match OutputStream::try_default() {
        Ok((_stream, handle)) => match Sink::try_new(&handle) {
            Ok(sink) => {
                for (freq, millis) in tones {
                    let source = SineWave::new(freq)
                        .take_duration(Duration::from_millis(millis))
                        .amplify(CUE_AMPLITUDE);
                    sink.append(source);
                }
                sink.sleep_until_end();
            }
            Err(e) => log::debug!("feedback: cannot create audio sink: {e}"),
        },
        Err(e) => log::debug!("feedback: no audio output available: {e}"),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_feedback_is_inert() {
        // Must not panic or spawn anything on machines without audio out.
        let feedback = AudioFeedback::new(false);
        feedback.play_start();
        feedback.play_stop();
        feedback.play_success();
        feedback.play_error();
        assert!(!feedback.is_enabled());
    }

    #[test]
    fn enabled_flag_is_reported() {
        assert!(AudioFeedback::new(true).is_enabled());
    }
}
