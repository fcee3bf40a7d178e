//! In-memory stack of byte chunks with resumable consumption.
//!
//! The most recently pushed chunk is consumed first. Pushing never discards
//! the unread remainder of the chunk underneath; it is picked up again once
//! everything above it has been drained. This is what lets a reader "put back"
//! bytes it over-read, or interpose freshly arrived data ahead of a partially
//! consumed buffer.
//!
//! ```
//! use formstack::chunk_stack::ChunkedByteStack;
//!
//! let mut stack = ChunkedByteStack::new();
//! stack.push(b"6chars\r\nResume\r\n");
//! assert_eq!(stack.read_line().as_deref(), Some("6chars"));
//! stack.push(b"Interrupt\r\n");
//! assert_eq!(stack.read_line().as_deref(), Some("Interrupt"));
//! assert_eq!(stack.read_line().as_deref(), Some("Resume"));
//! assert_eq!(stack.read_line(), None);
//! ```

use crate::encoding::TextEncoding;
use std::io;

/// One pushed buffer and how far into it we have read
#[derive(Debug)]
struct Chunk {
    data: Box<[u8]>,
    cursor: usize,
}

impl Chunk {
    fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.data.len()
    }
}

#[derive(Debug, Default)]
pub struct ChunkedByteStack {
    chunks: Vec<Chunk>,
    encoding: TextEncoding,
}

impl ChunkedByteStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(encoding: TextEncoding) -> Self {
        Self {
            chunks: Vec::new(),
            encoding,
        }
    }

    pub fn encoding(&self) -> &TextEncoding {
        &self.encoding
    }

    /// Interpose `bytes` ahead of everything currently buffered
    pub fn push(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.push_vec(bytes.to_vec());
        }
    }

    /// Like [`push`](Self::push) but takes ownership of the buffer
    pub fn push_vec(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            data: bytes.into_boxed_slice(),
            cursor: 0,
        });
    }

    /// True when no chunk holds unread bytes
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Chunk::is_exhausted)
    }

    /// Number of unread bytes across all chunks
    pub fn available(&self) -> usize {
        self.chunks.iter().map(|c| c.remaining().len()).sum()
    }

    /// Number of chunks still held, including a drained top chunk that has
    /// not been popped yet
    pub fn depth(&self) -> usize {
        self.chunks.len()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    fn discard_exhausted(&mut self) {
        while self.chunks.last().is_some_and(Chunk::is_exhausted) {
            self.chunks.pop();
        }
    }

    pub(crate) fn peek_raw(&mut self) -> Option<u8> {
        self.discard_exhausted();
        self.chunks.last().map(|c| c.data[c.cursor])
    }

    pub(crate) fn next_raw(&mut self) -> Option<u8> {
        self.discard_exhausted();
        let top = self.chunks.last_mut()?;
        let byte = top.data[top.cursor];
        top.cursor += 1;
        Some(byte)
    }

    /// Decode one character using the configured encoding.
    ///
    /// A drained chunk stays on the stack until the next call needs a byte,
    /// at which point it is popped and the chunk below takes over.
    pub fn read_byte(&mut self) -> Option<char> {
        let lead = self.next_raw()?;
        let width = self.encoding.decoder().char_width(lead);
        if width == 1 {
            return Some(self.encoding.decoder().decode_char(&[lead]));
        }

        let mut scratch = [0u8; 4];
        scratch[0] = lead;
        let mut len = 1;
        while len < width.min(scratch.len()) {
            match self.peek_raw() {
                Some(b) if self.encoding.decoder().is_continuation(b) => {
                    self.next_raw();
                    scratch[len] = b;
                    len += 1;
                }
                _ => break,
            }
        }
        Some(self.encoding.decoder().decode_char(&scratch[..len]))
    }

    /// Fill `buf` from the top of the stack downwards.
    ///
    /// Returns how many bytes were copied; fewer than `buf.len()` (possibly 0)
    /// only when the stack ran dry. Unread bytes of a partially drained chunk
    /// stay buffered.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            self.discard_exhausted();
            let Some(top) = self.chunks.last_mut() else {
                break;
            };
            let remaining = top.remaining();
            let n = remaining.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&remaining[..n]);
            top.cursor += n;
            filled += n;
        }
        filled
    }

    /// Read up to `count` bytes into a fresh vector
    pub fn read_bytes(&mut self, count: usize) -> Vec<u8> {
        let mut buf = vec![0u8; count.min(self.available())];
        let n = self.read(&mut buf);
        buf.truncate(n);
        buf
    }

    /// Append bytes up to the next line terminator to `line`.
    ///
    /// Returns `true` once a `\n` was consumed, with a trailing `\r` removed
    /// from `line`. Returns `false` if the stack ran out first; whatever was
    /// scanned is still appended, so a caller that can refill may call again
    /// with the same accumulator.
    pub fn scan_line(&mut self, line: &mut Vec<u8>) -> bool {
        loop {
            self.discard_exhausted();
            let Some(top) = self.chunks.last_mut() else {
                return false;
            };
            let remaining = top.remaining();
            match remaining.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&remaining[..pos]);
                    top.cursor += pos + 1;
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    return true;
                }
                None => {
                    line.extend_from_slice(remaining);
                    top.cursor = top.data.len();
                }
            }
        }
    }

    /// Read one line as raw bytes, terminator excluded.
    ///
    /// End of data acts as a terminator once at least one byte was read; an
    /// empty stack yields `None`.
    pub fn read_line_bytes(&mut self) -> Option<Vec<u8>> {
        if self.is_empty() {
            return None;
        }
        let mut line = Vec::new();
        self.scan_line(&mut line);
        Some(line)
    }

    /// Read one line of text, terminator excluded
    pub fn read_line(&mut self) -> Option<String> {
        self.read_line_bytes()
            .map(|bytes| self.encoding.decode(&bytes))
    }
}

impl io::Read for ChunkedByteStack {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(ChunkedByteStack::read(self, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_sequence() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"abc");
        assert_eq!(stack.read_byte(), Some('a'));
        assert_eq!(stack.read_byte(), Some('b'));
        assert_eq!(stack.read_byte(), Some('c'));
        assert_eq!(stack.read_byte(), None);
    }

    #[test]
    fn test_exhausted_chunk_popped_lazily() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"z");
        stack.push(b"a");
        assert_eq!(stack.read_byte(), Some('a'));
        // The drained chunk is still on top until the next read needs a byte
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.read_byte(), Some('z'));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_empty_push_is_noop() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"");
        stack.push_vec(Vec::new());
        assert_eq!(stack.depth(), 0);
        assert!(stack.is_empty());
        assert_eq!(stack.read_line(), None);
    }

    #[test]
    fn test_read_byte_multibyte_utf8() {
        let mut stack = ChunkedByteStack::new();
        stack.push("é€".as_bytes());
        assert_eq!(stack.read_byte(), Some('é'));
        assert_eq!(stack.read_byte(), Some('€'));
        assert_eq!(stack.read_byte(), None);
    }

    #[test]
    fn test_read_byte_utf8_split_across_chunks() {
        let euro = "€".as_bytes();
        let mut stack = ChunkedByteStack::new();
        stack.push(&euro[1..]);
        stack.push(&euro[..1]);
        assert_eq!(stack.read_byte(), Some('€'));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_read_byte_invalid_utf8() {
        let mut stack = ChunkedByteStack::new();
        stack.push(&[0xC3, b'a']);
        assert_eq!(stack.read_byte(), Some(char::REPLACEMENT_CHARACTER));
        assert_eq!(stack.read_byte(), Some('a'));
    }

    #[test]
    fn test_read_byte_latin1() {
        let mut stack = ChunkedByteStack::with_encoding(TextEncoding::latin1());
        stack.push(&[0xE9, b'x']);
        assert_eq!(stack.read_byte(), Some('é'));
        assert_eq!(stack.read_byte(), Some('x'));
    }

    #[test]
    fn test_read_crosses_chunks_in_one_call() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"world");
        stack.push(b"hello ");
        let mut buf = [0u8; 11];
        assert_eq!(stack.read(&mut buf), 11);
        assert_eq!(&buf, b"hello world");
        assert!(stack.is_empty());
    }

    #[test]
    fn test_read_bytes_short() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"6chars");
        assert_eq!(stack.read_bytes(10), b"6chars");
        assert!(stack.read_bytes(6).is_empty());
    }

    #[test]
    fn test_scan_line_split_crlf() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"\nrest");
        stack.push(b"line\r");
        assert_eq!(stack.read_line().as_deref(), Some("line"));
        assert_eq!(stack.read_line().as_deref(), Some("rest"));
    }

    #[test]
    fn test_scan_line_accumulates_until_terminator() {
        let mut stack = ChunkedByteStack::new();
        let mut line = Vec::new();
        stack.push(b"par");
        assert!(!stack.scan_line(&mut line));
        stack.push(b"tial\r\nnext");
        assert!(stack.scan_line(&mut line));
        assert_eq!(line, b"partial");
        assert_eq!(stack.available(), 4);
    }

    #[test]
    fn test_empty_lines() {
        let mut stack = ChunkedByteStack::new();
        stack.push(b"\r\n\n");
        assert_eq!(stack.read_line().as_deref(), Some(""));
        assert_eq!(stack.read_line().as_deref(), Some(""));
        assert_eq!(stack.read_line(), None);
    }

    #[test]
    fn test_io_read_impl() {
        use std::io::Read;

        let mut stack = ChunkedByteStack::new();
        stack.push(b"payload");
        let mut out = String::new();
        stack.read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");
    }
}
