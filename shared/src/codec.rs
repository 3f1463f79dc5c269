//! Newline codec for device text streams
//!
//! Devices talk in lines of text:
//! ```text
//! [ N bytes: text ][ optional '\r' ][ '\n' ]
//! ```
//!
//! The framer keeps any partial line between reads so that chunk
//! boundaries never split or lose a message.

use bytes::{Bytes, BytesMut};
use tracing::warn;

/// Line delimiter
pub const DELIMITER: u8 = b'\n';

/// Pending bytes allowed without a delimiter before they are flushed as a line
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Encode a text message as a single newline-terminated line.
///
/// A message that already ends in `\n` is sent unmodified.
pub fn encode_line(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        buf.extend_from_slice(&[DELIMITER]);
    }
    buf.freeze()
}

/// Turns a stream of raw byte chunks into complete text lines.
///
/// One framer belongs to one connection. Lines are decoded lossily, so
/// invalid UTF-8 becomes U+FFFD instead of an error.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_pending: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the default pending limit
    pub fn new() -> Self {
        Self::with_max_pending(MAX_PENDING_BYTES)
    }

    /// Create a framer that flushes after `max_pending` bytes without a delimiter
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            max_pending: max_pending.max(1),
        }
    }

    /// Append a chunk and iterate over the lines it completes.
    ///
    /// The iterator is lazy: lines it does not yield stay buffered and
    /// come out of the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(chunk);
        Lines { framer: self }
    }

    /// Number of bytes waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let line = match self.buffer.iter().position(|&b| b == DELIMITER) {
                Some(pos) => {
                    let mut line = self.buffer.split_to(pos + 1);
                    line.truncate(pos);
                    line
                }
                None if self.buffer.len() > self.max_pending => {
                    warn!(
                        "[Framer] {} bytes without a line break, flushing",
                        self.buffer.len()
                    );
                    self.buffer.split()
                }
                None => return None,
            };

            let text = line.strip_suffix(b"\r").unwrap_or(&line[..]);
            // Blank and whitespace-only lines carry nothing to show
            if text.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(String::from_utf8_lossy(text).into_owned());
        }
    }
}

/// Lines completed by a [`LineFramer::feed`] call
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(framer: &mut LineFramer, chunk: &[u8]) -> Vec<String> {
        framer.feed(chunk).collect()
    }

    #[test]
    fn test_encode_appends_newline() {
        assert_eq!(&encode_line("PING")[..], b"PING\n");
    }

    #[test]
    fn test_encode_keeps_existing_newline() {
        assert_eq!(&encode_line("PING\n")[..], b"PING\n");
    }

    #[test]
    fn test_lines_simple() {
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, b"Hello\nWorld\n"), vec!["Hello", "World"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_lines_split() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"Hel").is_empty());
        assert_eq!(framer.pending(), 3);
        assert_eq!(collect(&mut framer, b"lo\nWor"), vec!["Hello"]);
        assert_eq!(framer.pending(), 3);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(collect(&mut framer, b"A\r").is_empty());
        assert_eq!(collect(&mut framer, b"\nB\n"), vec!["A", "B"]);
    }

    #[test]
    fn test_empty_lines_suppressed() {
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, b"\n\r\nA\n\n"), vec!["A"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_whitespace_only_lines_suppressed() {
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, b"  \r\n\t\nA\n \n"), vec!["A"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_only_trailing_cr_stripped() {
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, b" x\ry \r\n"), vec![" x\ry "]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        let lines = collect(&mut framer, b"ok\xff\xfe\n");
        assert_eq!(lines, vec!["ok\u{fffd}\u{fffd}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut framer = LineFramer::new();
        let bytes = "温度\n".as_bytes();
        assert!(collect(&mut framer, &bytes[..2]).is_empty());
        assert_eq!(collect(&mut framer, &bytes[2..]), vec!["温度"]);
    }

    #[test]
    fn test_unconsumed_lines_stay_buffered() {
        let mut framer = LineFramer::new();
        let first = framer.feed(b"A\nB\n").next();
        assert_eq!(first.as_deref(), Some("A"));
        assert_eq!(framer.pending(), 2);
        assert_eq!(collect(&mut framer, b"C\n"), vec!["B", "C"]);
    }

    #[test]
    fn test_oversized_line_is_flushed() {
        let mut framer = LineFramer::with_max_pending(4);
        assert!(collect(&mut framer, b"abcd").is_empty());
        assert_eq!(collect(&mut framer, b"ef"), vec!["abcdef"]);
        assert_eq!(framer.pending(), 0);
        assert_eq!(collect(&mut framer, b"g\n"), vec!["g"]);
    }

    #[test]
    fn test_reset_drops_partial() {
        let mut framer = LineFramer::new();
        let _ = collect(&mut framer, b"partial");
        framer.reset();
        assert_eq!(collect(&mut framer, b"A\n"), vec!["A"]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const STREAM: &[u8] = b"A\nB\r\nC\n";

    proptest! {
        /// Any chunking of the stream yields exactly A, B, C in order.
        #[test]
        fn chunk_boundaries_never_change_lines(
            mut cuts in proptest::collection::vec(0..=STREAM.len(), 0..8)
        ) {
            cuts.sort_unstable();
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(STREAM.len())) {
                lines.extend(framer.feed(&STREAM[start..cut]));
                start = cut;
            }
            prop_assert_eq!(lines, vec!["A", "B", "C"]);
            prop_assert_eq!(framer.pending(), 0);
        }

        /// Arbitrary bytes never panic and never lose the trailing partial line.
        #[test]
        fn arbitrary_bytes_are_accepted(data: Vec<u8>) {
            let mut framer = LineFramer::new();
            let _ = framer.feed(&data).count();
            let tail = data.iter().rev().take_while(|&&b| b != DELIMITER).count();
            prop_assert_eq!(framer.pending(), tail);
        }
    }
}
