//! Output size limiting.

/// Default character budget for command output.
pub const DEFAULT_OUTPUT_LIMIT: usize = 10_000;

/// Truncates text to a fixed number of characters, keeping the prefix.
///
/// Limits count Unicode scalar values, so a cut never splits a character.
/// Applying a limiter twice is the same as applying it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimiter {
    max_chars: usize,
}

impl Default for OutputLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT)
    }
}

impl OutputLimiter {
    /// Create a limiter with the given character budget.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Character budget.
    #[must_use]
    pub const fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Borrow the longest prefix of `text` within budget.
    #[must_use]
    pub fn limit<'a>(&self, text: &'a str) -> &'a str {
        // Byte length bounds char count, so short inputs skip the scan.
        if text.len() <= self.max_chars {
            return text;
        }
        text.char_indices()
            .nth(self.max_chars)
            .map_or(text, |(cut, _)| &text[..cut])
    }

    /// Truncate an owned string in place.
    #[must_use]
    pub fn limit_owned(&self, mut text: String) -> String {
        let keep = self.limit(&text).len();
        text.truncate(keep);
        text
    }
}
