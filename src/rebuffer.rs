//! A [`ChunkedByteStack`] front-end over a real byte source.
//!
//! Reads are served from the stack; only when it runs dry is the underlying
//! source asked for one more chunk of at most `chunk_size` bytes. Callers can
//! [`push`](RebufferedSource::push) bytes back, which will be read again before
//! anything else.

use crate::chunk_stack::ChunkedByteStack;
use crate::encoding::TextEncoding;
use log::trace;
use std::io::{self, Read};

/// Refill size used when none is configured
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug)]
pub struct RebufferedSource<R> {
    source: R,
    stack: ChunkedByteStack,
    chunk_size: usize,
    refills: u64,
    bytes_pulled: u64,
}

impl<R: Read> RebufferedSource<R> {
    /// Wrap `source`. A `chunk_size` of 0 is treated as 1.
    pub fn new(source: R, encoding: TextEncoding, chunk_size: usize) -> Self {
        Self {
            source,
            stack: ChunkedByteStack::with_encoding(encoding),
            chunk_size: chunk_size.max(1),
            refills: 0,
            bytes_pulled: 0,
        }
    }

    pub fn with_defaults(source: R) -> Self {
        Self::new(source, TextEncoding::default(), DEFAULT_CHUNK_SIZE)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn encoding(&self) -> &TextEncoding {
        self.stack.encoding()
    }

    /// Number of non-empty reads issued against the source so far
    pub fn refill_count(&self) -> u64 {
        self.refills
    }

    /// Total bytes pulled from the source so far
    pub fn bytes_pulled(&self) -> u64 {
        self.bytes_pulled
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.stack.available()
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Give back the source together with anything still buffered
    pub fn into_inner(self) -> (R, ChunkedByteStack) {
        (self.source, self.stack)
    }

    /// Push bytes back so they are read before anything already buffered
    pub fn push(&mut self, bytes: &[u8]) {
        self.stack.push(bytes);
    }

    pub fn push_vec(&mut self, bytes: Vec<u8>) {
        self.stack.push_vec(bytes);
    }

    /// Issue exactly one read against the source.
    ///
    /// Returns `false` on end of data. `Interrupted` is retried; any other
    /// error is returned with the stack untouched.
    fn refill(&mut self) -> io::Result<bool> {
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match self.source.read(&mut buf) {
                Ok(0) => {
                    trace!("Source exhausted after {} bytes", self.bytes_pulled);
                    return Ok(false);
                }
                Ok(n) => {
                    buf.truncate(n);
                    self.stack.push_vec(buf);
                    self.refills += 1;
                    self.bytes_pulled += n as u64;
                    trace!("Refill #{}: {n} bytes", self.refills);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Make sure at least one unread byte is buffered, refilling once if needed
    fn ensure_data(&mut self) -> io::Result<bool> {
        if !self.stack.is_empty() {
            return Ok(true);
        }
        self.refill()
    }

    /// Decode one character, refilling as needed
    pub fn read_byte(&mut self) -> io::Result<Option<char>> {
        if !self.ensure_data()? {
            return Ok(None);
        }
        let Some(lead) = self.stack.next_raw() else {
            return Ok(None);
        };

        let encoding = self.stack.encoding().clone();
        let decoder = encoding.decoder();
        let width = decoder.char_width(lead);

        let mut scratch = [0u8; 4];
        scratch[0] = lead;
        let mut len = 1;
        while len < width.min(scratch.len()) {
            match self.ensure_data() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.stack.push(&scratch[..len]);
                    return Err(e);
                }
            }
            match self.stack.peek_raw() {
                Some(b) if decoder.is_continuation(b) => {
                    self.stack.next_raw();
                    scratch[len] = b;
                    len += 1;
                }
                _ => break,
            }
        }
        Ok(Some(decoder.decode_char(&scratch[..len])))
    }

    /// Fill `buf`, refilling from the source until it is full or the source
    /// is exhausted. Short counts are not an error.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = self.stack.read(buf);
        while filled < buf.len() {
            match self.refill() {
                Ok(true) => filled += self.stack.read(&mut buf[filled..]),
                Ok(false) => break,
                Err(e) => {
                    self.stack.push(&buf[..filled]);
                    return Err(e);
                }
            }
        }
        Ok(filled)
    }

    /// Read up to `count` bytes into a fresh vector
    pub fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        let n = RebufferedSource::read(self, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read one line as raw bytes; a line may span any number of refills
    pub fn read_line_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.read_line_bytes_limited(usize::MAX)
    }

    /// Read one line, but stop refilling once more than `max` bytes of it
    /// have been taken. A line that comes back longer than `max` is cut off
    /// and the rest of it stays in the source.
    pub fn read_line_bytes_limited(&mut self, max: usize) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut consumed = false;
        loop {
            match self.ensure_data() {
                Ok(true) => {}
                Ok(false) => return Ok(consumed.then_some(line)),
                Err(e) => {
                    // No terminator seen yet, so `line` is exactly what was taken
                    self.stack.push_vec(line);
                    return Err(e);
                }
            }
            consumed = true;
            if self.stack.scan_line(&mut line) || line.len() > max {
                return Ok(Some(line));
            }
        }
    }

    /// `true` once the stack is drained and the source has no more data
    pub fn at_end(&mut self) -> io::Result<bool> {
        Ok(!self.ensure_data()?)
    }

    /// Read one line of text, terminator excluded
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self
            .read_line_bytes()?
            .map(|bytes| self.stack.encoding().decode(&bytes)))
    }
}

impl<R: Read> Read for RebufferedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RebufferedSource::read(self, buf)
    }
}
