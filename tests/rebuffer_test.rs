use formstack::encoding::TextEncoding;
use formstack::error::FormError;
use formstack::multipart::{MultipartConfig, MultipartParser};
use formstack::rebuffer::RebufferedSource;
use std::io::{self, Cursor, Read};

/// Hands out data in fixed slices and fails once after `fail_after` bytes
struct FlakyReader {
    data: Vec<u8>,
    position: usize,
    max_read: usize,
    fail_after: usize,
    failed: bool,
}

impl FlakyReader {
    fn new(data: &[u8], max_read: usize, fail_after: usize) -> Self {
        Self {
            data: data.to_vec(),
            position: 0,
            max_read,
            fail_after,
            failed: false,
        }
    }
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.failed && self.position >= self.fail_after {
            self.failed = true;
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
        }
        let end = self
            .data
            .len()
            .min(self.position + self.max_read.min(buf.len()));
        let n = end - self.position;
        buf[..n].copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(n)
    }
}

/// Returns `Interrupted` before every real read
struct InterruptingReader<R> {
    inner: R,
    interrupt_next: bool,
}

impl<R: Read> Read for InterruptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.interrupt_next = !self.interrupt_next;
        if self.interrupt_next {
            return Err(io::ErrorKind::Interrupted.into());
        }
        self.inner.read(buf)
    }
}

#[test]
fn test_lines_from_small_refills() {
    let mut source = RebufferedSource::new(
        Cursor::new(b"first line\r\nsecond\nthird".to_vec()),
        TextEncoding::utf8(),
        4,
    );
    assert_eq!(source.read_line().unwrap().as_deref(), Some("first line"));
    assert_eq!(source.read_line().unwrap().as_deref(), Some("second"));
    assert_eq!(source.read_line().unwrap().as_deref(), Some("third"));
    assert_eq!(source.read_line().unwrap(), None);
}

#[test]
fn test_short_read_is_not_an_error() {
    let mut source = RebufferedSource::with_defaults(Cursor::new(b"6chars".to_vec()));
    let mut buf = [0u8; 10];
    assert_eq!(source.read(&mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"6chars");
    assert_eq!(source.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_push_back_over_read_bytes() {
    let mut source =
        RebufferedSource::new(Cursor::new(b"--bound--".to_vec()), TextEncoding::utf8(), 3);
    let over_read = source.read_bytes(5).unwrap();
    assert_eq!(over_read, b"--bou");

    source.push(&over_read[2..]);
    assert_eq!(source.read_bytes(100).unwrap(), b"bound--");
}

#[test]
fn test_io_error_leaves_buffer_intact() {
    let mut source = RebufferedSource::new(
        FlakyReader::new(b"hello world\r\nsecond line\r\n", 4, 8),
        TextEncoding::utf8(),
        4,
    );

    // "hell" + "o wo" arrive, then the reader fails mid-line
    let err = source.read_line().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert_eq!(source.buffered(), 8);

    // A retry picks up exactly where the failed call started
    assert_eq!(source.read_line().unwrap().as_deref(), Some("hello world"));
    assert_eq!(source.read_line().unwrap().as_deref(), Some("second line"));
    assert_eq!(source.read_line().unwrap(), None);
}

#[test]
fn test_io_error_during_read_keeps_bytes() {
    let mut source = RebufferedSource::new(
        FlakyReader::new(b"0123456789", 3, 6),
        TextEncoding::utf8(),
        3,
    );

    let mut buf = [0u8; 10];
    assert!(source.read(&mut buf).is_err());
    assert_eq!(source.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf, b"0123456789");
}

#[test]
fn test_interrupted_reads_are_retried() {
    let reader = InterruptingReader {
        inner: Cursor::new(b"a\nb\n".to_vec()),
        interrupt_next: false,
    };
    let mut source = RebufferedSource::new(reader, TextEncoding::utf8(), 2);
    assert_eq!(source.read_line().unwrap().as_deref(), Some("a"));
    assert_eq!(source.read_line().unwrap().as_deref(), Some("b"));
    assert_eq!(source.read_line().unwrap(), None);
}

#[test]
fn test_parser_surfaces_source_error() {
    let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\n\r\n0123456789abcdef\r\n--b--\r\n";
    let config = MultipartConfig {
        boundary: Some("b".to_string()),
        chunk_size: 8,
        ..Default::default()
    };
    let parser = MultipartParser::new(FlakyReader::new(body, 8, 72), config).unwrap();

    match parser.parse() {
        Err(FormError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn test_into_inner_returns_leftovers() {
    let mut source =
        RebufferedSource::new(Cursor::new(b"line\r\nrest".to_vec()), TextEncoding::utf8(), 64);
    assert_eq!(source.read_line().unwrap().as_deref(), Some("line"));
    assert_eq!(source.bytes_pulled(), 10);

    let (_, mut stack) = source.into_inner();
    assert_eq!(stack.read_line().as_deref(), Some("rest"));
}

#[test]
fn test_limited_line_read_stops_refilling() {
    let mut source = RebufferedSource::new(
        Cursor::new(b"abcdefghij\r\nnext".to_vec()),
        TextEncoding::utf8(),
        4,
    );

    let cut = source.read_line_bytes_limited(5).unwrap().unwrap();
    assert_eq!(cut, b"abcdefgh");
    assert_eq!(source.bytes_pulled(), 8);

    // The rest of the long line is still there
    assert_eq!(source.read_line().unwrap().as_deref(), Some("ij"));
    assert_eq!(
        source.read_line_bytes_limited(5).unwrap().as_deref(),
        Some(&b"next"[..])
    );
    assert_eq!(source.read_line_bytes_limited(5).unwrap(), None);
}

#[test]
fn test_at_end() {
    let mut source = RebufferedSource::new(Cursor::new(b"x".to_vec()), TextEncoding::utf8(), 4);
    assert!(!source.at_end().unwrap());
    assert_eq!(source.read_byte().unwrap(), Some('x'));
    assert!(source.at_end().unwrap());
    assert_eq!(source.read_byte().unwrap(), None);
}
