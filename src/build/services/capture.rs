//! Bounded capture of stage output.

const TRUNCATION_MARKER: &str = "[... earlier output truncated ...]\n";

/// Accumulates output lines, keeping at most `limit` bytes of the tail.
#[derive(Debug, Clone)]
pub struct LogCapture {
    limit: usize,
    text: String,
    truncated: bool,
}

impl LogCapture {
    /// Creates an empty capture bounded to `limit` bytes.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            text: String::new(),
            truncated: false,
        }
    }

    /// Appends one line.
    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        if self.text.len() <= self.limit {
            return;
        }

        let excess = self.text.len() - self.limit;
        let cut = (excess..=self.text.len())
            .find(|&index| self.text.is_char_boundary(index))
            .unwrap_or(self.text.len());
        self.text.drain(..cut);
        self.truncated = true;
    }

    /// Returns whether earlier output was dropped.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Consumes the capture and returns the stored text.
    #[must_use]
    pub fn into_text(self) -> String {
        if self.truncated {
            format!("{TRUNCATION_MARKER}{}", self.text)
        } else {
            self.text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LogCapture;

    #[test]
    fn keeps_everything_under_the_limit() {
        let mut capture = LogCapture::new(64);
        capture.push_line("Resolving dependencies");
        capture.push_line("Done");

        assert!(!capture.is_truncated());
        assert_eq!(capture.into_text(), "Resolving dependencies\nDone\n");
    }

    #[test]
    fn keeps_the_tail_when_over_the_limit() {
        let mut capture = LogCapture::new(8);
        capture.push_line("first line");
        capture.push_line("tail");

        assert!(capture.is_truncated());
        let text = capture.into_text();
        assert!(text.starts_with("[... earlier output truncated ...]\n"));
        assert!(text.ends_with("tail\n"));
        assert!(!text.contains("first"));
    }

    #[test]
    fn never_splits_a_multibyte_character() {
        let mut capture = LogCapture::new(5);
        capture.push_line("ééé");

        let text = capture.into_text();
        assert!(text.ends_with("é\n"));
    }
}
