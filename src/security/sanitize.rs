//! Input sanitation for freeform text fields.
//!
//! Allow-list based: printable characters plus whitespace survive, other
//! control characters are stripped before text reaches a handler. Oversized
//! inputs are rejected outright.

/// Maximum accepted length for a freeform text field, in bytes.
pub const MAX_TEXT_BYTES: usize = 64 * 1024;

/// Error type for rejected input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    /// Input exceeds MAX_TEXT_BYTES.
    TooLarge { len: usize, max: usize },
}

impl std::fmt::Display for SanitizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanitizeError::TooLarge { len, max } => {
                write!(f, "text field of {} bytes exceeds limit of {}", len, max)
            }
        }
    }
}

impl std::error::Error for SanitizeError {}

fn allowed(c: char) -> bool {
    !c.is_control() || c == '\n' || c == '\t' || c == '\r'
}

/// Clean a freeform text field.
///
/// Rejects oversized input and strips characters outside the allow-list.
pub fn clean_text(input: &str) -> Result<String, SanitizeError> {
    if input.len() > MAX_TEXT_BYTES {
        return Err(SanitizeError::TooLarge {
            len: input.len(),
            max: MAX_TEXT_BYTES,
        });
    }
    Ok(input.chars().filter(|c| allowed(*c)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_ordinary_text() {
        let text = "hello, agent!\nsecond line\ttabbed";
        assert_eq!(clean_text(text).unwrap(), text);
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(clean_text("a\u{0000}b\u{001b}[31mc").unwrap(), "ab[31mc");
    }

    #[test]
    fn test_rejects_oversized_input() {
        let big = "x".repeat(MAX_TEXT_BYTES + 1);
        assert!(matches!(
            clean_text(&big),
            Err(SanitizeError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_keeps_unicode_text() {
        let text = "héllo wörld ありがとう";
        assert_eq!(clean_text(text).unwrap(), text);
    }
}
