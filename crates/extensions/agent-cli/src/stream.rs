//! Output shaping for streamed CLI output.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Remove ANSI colour and cursor escape sequences.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("static pattern")
    });
    re.replace_all(text, "")
}

/// Collects lines until at least `limit` characters are buffered.
#[derive(Debug)]
pub struct ChunkBuffer {
    limit: usize,
    buffer: String,
}

impl ChunkBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            buffer: String::new(),
        }
    }

    /// Add one line. Returns a chunk once the buffer is full.
    pub fn push(&mut self, line: &str) -> Option<String> {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if self.buffer.chars().count() >= self.limit {
            self.flush()
        } else {
            None
        }
    }

    /// Take whatever is buffered.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("\x1b[2Kprogress"), "progress");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_chunks_are_emitted_at_limit() {
        let mut buffer = ChunkBuffer::new(10);
        assert_eq!(buffer.push("abc"), None);
        assert_eq!(buffer.push("defgh"), Some("abc\ndefgh\n".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_flush_returns_remainder() {
        let mut buffer = ChunkBuffer::new(800);
        buffer.push("tail");
        assert_eq!(buffer.flush(), Some("tail\n".to_string()));
        assert_eq!(buffer.flush(), None);
    }
}
