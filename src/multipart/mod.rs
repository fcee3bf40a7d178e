//! Streaming multipart/form-data parser
//!
//! The parser pulls bytes through a [`RebufferedSource`], so the body never has
//! to be in memory at once and the underlying reader may hand out data in
//! arbitrarily small pieces. Boundary lines are found with a byte-level search;
//! when a candidate delimiter is cut off at the end of what has been read so
//! far, the partial bytes are pushed back onto the source and scanned again
//! together with the next refill.
//!
//! Sections with a `filename` in their Content-Disposition become
//! [`FilePart`]s whose body is written to a sink obtained from a
//! [`SinkProvider`] (in memory by default). All other sections become
//! [`ParameterPart`]s with the body decoded as text.
//!
//! # Example
//! ```rust
//! use formstack::multipart::{MultipartConfig, MultipartParser};
//! use std::io::Cursor;
//!
//! fn parse_form() -> Result<(), formstack::error::FormError> {
//!     let body = b"--boundry\r\n\
//!         Content-Disposition: form-data; name=\"text\"\r\n\
//!         \r\n\
//!         textdata\r\n\
//!         --boundry\r\n\
//!         Content-Disposition: form-data; name=\"file\"; filename=\"data.txt\"\r\n\
//!         Content-Type: text/plain\r\n\
//!         \r\n\
//!         tiny\r\n\
//!         --boundry--\r\n";
//!
//!     // No boundary configured: it is taken from the first line
//!     let parser = MultipartParser::new(Cursor::new(&body[..]), MultipartConfig::default())?;
//!     let mut result = parser.parse()?;
//!
//!     assert_eq!(result.parameter("text"), Some("textdata"));
//!     let file = result.file_mut("file").unwrap();
//!     assert_eq!(file.file_name, "data.txt");
//!     assert_eq!(file.read_to_string()?, "tiny");
//!     Ok(())
//! }
//! # parse_form().unwrap();
//! ```
//!
//! ## Streaming parts
//! ```rust,no_run
//! use formstack::multipart::{MultipartConfig, MultipartParser, Part};
//! use std::fs::File;
//!
//! fn list_parts() -> Result<(), formstack::error::FormError> {
//!     let config = MultipartConfig {
//!         boundary: Some("----WebKitFormBoundary7MA4YWxkTrZu0gW".to_string()),
//!         chunk_size: 16 * 1024,
//!         ..Default::default()
//!     };
//!     let parser = MultipartParser::new(File::open("upload.bin")?, config)?;
//!
//!     for part in parser {
//!         match part? {
//!             Part::Parameter(p) => println!("{} = {}", p.name, p.value),
//!             Part::File(f) => println!("{}: {} ({} bytes)", f.name, f.file_name, f.len()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod headers;
pub mod part;

pub use headers::{ContentDisposition, PartHeaders};
pub use part::{FilePart, ParameterPart, Part, ParseResult};

use crate::encoding::TextEncoding;
use crate::error::FormError;
use crate::rebuffer::{DEFAULT_CHUNK_SIZE, RebufferedSource};
use crate::sink::{MemorySinks, SinkProvider, SinkRequest};
use crate::subsequence::{find_subsequence, partial_suffix_len};
use headers::fold_header_line;
use log::{debug, trace};
use std::io::{Read, Seek, SeekFrom, Write};

/// Default limits for multipart parsing
const DEFAULT_MAX_PARTS: usize = 100;
const DEFAULT_MAX_PART_SIZE: u64 = 10 * 1024 * 1024 * 1024; // 10GB per part
const DEFAULT_MAX_FILENAME_LENGTH: usize = 255;
const DEFAULT_MAX_FIELD_NAME_LENGTH: usize = 100;
const DEFAULT_MAX_HEADERS_SIZE: usize = 8 * 1024; // 8KB for part headers
const MIN_BOUNDARY_LENGTH: usize = 1;
const MAX_BOUNDARY_LENGTH: usize = 70; // RFC 2046 limit
/// Most spaces/tabs accepted between a boundary and its line break
const MAX_TRANSPORT_PADDING: usize = 32;

/// Marks boundary lines: `--boundary` between sections, `--boundary--` at the end
pub const BOUNDARY_PREFIX: &str = "--";

/// Configuration for multipart parsing
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Boundary token; `None` takes it from the first line of the body
    pub boundary: Option<String>,
    /// How many bytes to request from the underlying reader per refill
    pub chunk_size: usize,
    /// Encoding used for header lines and parameter values
    pub encoding: TextEncoding,
    /// Maximum number of sections allowed
    pub max_parts: usize,
    /// Maximum body size per section in bytes
    pub max_part_size: u64,
    /// Maximum filename length
    pub max_filename_length: usize,
    /// Maximum field name length
    pub max_field_name_length: usize,
    /// Maximum size of one section's header block
    pub max_headers_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            boundary: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            encoding: TextEncoding::default(),
            max_parts: DEFAULT_MAX_PARTS,
            max_part_size: DEFAULT_MAX_PART_SIZE,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
            max_field_name_length: DEFAULT_MAX_FIELD_NAME_LENGTH,
            max_headers_size: DEFAULT_MAX_HEADERS_SIZE,
        }
    }
}

impl MultipartConfig {
    /// Default configuration with an explicit boundary
    pub fn with_boundary<S: Into<String>>(boundary: S) -> Self {
        Self {
            boundary: Some(boundary.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), FormError> {
        if self.chunk_size == 0 {
            return Err(FormError::InvalidConfiguration(
                "chunk_size must be at least 1 byte".to_string(),
            ));
        }
        if self.max_parts == 0 {
            return Err(FormError::InvalidConfiguration(
                "max_parts must be at least 1".to_string(),
            ));
        }
        if let Some(boundary) = &self.boundary {
            validate_boundary(boundary)?;
        }
        Ok(())
    }
}

/// Validate a boundary token against RFC 2046
pub fn validate_boundary(boundary: &str) -> Result<(), FormError> {
    if boundary.len() < MIN_BOUNDARY_LENGTH {
        return Err(FormError::invalid_boundary("Boundary too short"));
    }

    if boundary.len() > MAX_BOUNDARY_LENGTH {
        return Err(FormError::invalid_boundary("Boundary too long"));
    }

    if boundary.contains('\r') || boundary.contains('\n') {
        return Err(FormError::invalid_boundary("Boundary contains line breaks"));
    }

    if !boundary
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c))
    {
        return Err(FormError::invalid_boundary(
            "Boundary contains invalid characters",
        ));
    }

    if boundary.ends_with(' ') {
        return Err(FormError::invalid_boundary("Boundary ends with a space"));
    }

    Ok(())
}

/// Extract the boundary from a `multipart/...; boundary=...` Content-Type value
pub fn extract_boundary_from_content_type(content_type: &str) -> Result<String, FormError> {
    let mut params = headers::split_parameters(content_type).into_iter();

    let media_type = params.next().unwrap_or_default().to_lowercase();
    if !media_type.starts_with("multipart/") {
        return Err(FormError::invalid_multipart(format!(
            "Not a multipart content type: {media_type}"
        )));
    }

    for param in params {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("boundary") {
                let boundary = headers::unquote(value.trim());
                validate_boundary(&boundary)?;
                return Ok(boundary);
            }
        }
    }

    Err(FormError::invalid_boundary("No boundary found in Content-Type"))
}

/// Where the parser is in the body
#[derive(Debug)]
enum State {
    /// Take the boundary from the first line
    DetectBoundary,
    /// Looking for the next `--boundary` or `--boundary--` line
    SeekSection,
    /// Reading a section's header block
    ReadHeaders,
    /// Copying a section's body up to the next delimiter
    ReadBody(PartHeaders),
    Done,
}

/// What follows a `\n--boundary` candidate inside body bytes
enum Follows {
    Delimiter,
    Data,
    NeedMore,
}

fn classify_after_delimiter(after: &[u8], eof: bool) -> Follows {
    match after {
        [b'-', b'-', ..] => return Follows::Delimiter,
        [b'-'] if !eof => return Follows::NeedMore,
        _ => {}
    }

    let padding = after
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    if padding > MAX_TRANSPORT_PADDING {
        return Follows::Data;
    }
    match &after[padding..] {
        [] | [b'\r'] if !eof => Follows::NeedMore,
        [] | [b'\r'] => Follows::Delimiter,
        [b'\n', ..] | [b'\r', b'\n', ..] => Follows::Delimiter,
        _ => Follows::Data,
    }
}

/// Write `bytes` unless that would take the section past `max_size`
fn write_limited<W: Write + ?Sized>(
    out: &mut W,
    bytes: &[u8],
    written: &mut u64,
    max_size: u64,
) -> Result<(), FormError> {
    if bytes.is_empty() {
        return Ok(());
    }
    *written += bytes.len() as u64;
    if *written > max_size {
        return Err(FormError::PartTooLarge(max_size));
    }
    out.write_all(bytes)?;
    Ok(())
}

/// Trim trailing spaces and tabs (RFC 2046 transport padding). Padding
/// longer than the body scanner accepts is left alone.
fn trim_padding(line: &[u8]) -> &[u8] {
    let padding = line
        .iter()
        .rev()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    if padding > MAX_TRANSPORT_PADDING {
        return line;
    }
    &line[..line.len() - padding]
}

/// Binary-safe iterator over the sections of a multipart body
pub struct MultipartIterator<R> {
    source: RebufferedSource<R>,
    config: MultipartConfig,
    sinks: Box<dyn SinkProvider>,
    /// `--boundary`
    dash_boundary: Vec<u8>,
    /// `\n--boundary`, what ends a section body
    delimiter: Vec<u8>,
    state: State,
    parts_count: usize,
}

impl<R: Read> MultipartIterator<R> {
    fn new(reader: R, config: MultipartConfig) -> Self {
        let source = RebufferedSource::new(reader, config.encoding.clone(), config.chunk_size);
        let mut iterator = Self {
            source,
            sinks: Box::new(MemorySinks),
            dash_boundary: Vec::new(),
            delimiter: Vec::new(),
            state: State::DetectBoundary,
            parts_count: 0,
            config,
        };
        if let Some(boundary) = iterator.config.boundary.clone() {
            iterator.set_boundary(&boundary);
            iterator.state = State::SeekSection;
        }
        iterator
    }

    fn set_boundary(&mut self, boundary: &str) {
        self.dash_boundary = format!("{BOUNDARY_PREFIX}{boundary}").into_bytes();
        self.delimiter = Vec::with_capacity(self.dash_boundary.len() + 1);
        self.delimiter.push(b'\n');
        self.delimiter.extend_from_slice(&self.dash_boundary);
    }

    /// The boundary in use, once known
    pub fn boundary(&self) -> Option<&str> {
        std::str::from_utf8(&self.dash_boundary)
            .ok()
            .and_then(|b| b.strip_prefix(BOUNDARY_PREFIX))
    }

    /// Number of sections emitted so far
    pub fn parts_count(&self) -> usize {
        self.parts_count
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Take the boundary from the first line. Returns `false` when that line
    /// is a closing boundary with nothing after it, i.e. an empty form.
    fn detect_boundary(&mut self) -> Result<bool, FormError> {
        let limit = 2 * BOUNDARY_PREFIX.len() + MAX_BOUNDARY_LENGTH + MAX_TRANSPORT_PADDING;
        let line = self
            .source
            .read_line_bytes_limited(limit)?
            .ok_or(FormError::Truncated("detecting boundary"))?;
        if line.len() > limit {
            return Err(FormError::invalid_boundary(format!(
                "First line is longer than {limit} bytes"
            )));
        }
        let line = self.config.encoding.decode(trim_padding(&line));

        let Some(boundary) = line.strip_prefix(BOUNDARY_PREFIX) else {
            return Err(FormError::invalid_boundary(format!(
                "First line does not start with '{BOUNDARY_PREFIX}': {line}"
            )));
        };

        if let Some(closed) = boundary.strip_suffix(BOUNDARY_PREFIX) {
            if validate_boundary(closed).is_ok() && self.source.at_end()? {
                debug!("Body holds only the closing boundary '{closed}'");
                self.set_boundary(closed);
                return Ok(false);
            }
        }
        validate_boundary(boundary)?;

        debug!("Detected multipart boundary '{boundary}'");
        self.set_boundary(boundary);
        Ok(true)
    }

    /// Skip to the next separator line. Returns `false` on the closing line.
    fn seek_section(&mut self) -> Result<bool, FormError> {
        let limit = self.config.max_headers_size;
        loop {
            let line = self
                .source
                .read_line_bytes_limited(limit)?
                .ok_or(FormError::Truncated("seeking next section"))?;
            if line.len() > limit {
                return Err(FormError::invalid_multipart(format!(
                    "Line outside any section is longer than {limit} bytes"
                )));
            }
            let line = trim_padding(&line);

            if line == self.dash_boundary.as_slice() {
                return Ok(true);
            }
            if line.len() == self.dash_boundary.len() + BOUNDARY_PREFIX.len()
                && line.starts_with(&self.dash_boundary)
                && line.ends_with(BOUNDARY_PREFIX.as_bytes())
            {
                debug!("Reached closing boundary after {} parts", self.parts_count);
                return Ok(false);
            }
            trace!("Skipping {} bytes outside any section", line.len());
        }
    }

    fn read_headers(&mut self) -> Result<PartHeaders, FormError> {
        let mut lines: Vec<String> = Vec::new();
        let mut total = 0usize;

        loop {
            let remaining = self.config.max_headers_size.saturating_sub(total);
            let line = self
                .source
                .read_line_bytes_limited(remaining)?
                .ok_or(FormError::Truncated("reading part headers"))?;
            if line.is_empty() {
                break;
            }

            total += line.len();
            if total > self.config.max_headers_size {
                return Err(FormError::invalid_multipart(format!(
                    "Part headers too large: more than {} bytes",
                    self.config.max_headers_size
                )));
            }
            fold_header_line(&mut lines, &self.config.encoding.decode(&line));
        }

        PartHeaders::from_lines(&lines, &self.config)
    }

    /// Copy body bytes into `out` until the delimiter, leaving the source
    /// positioned at the `--boundary` line. Returns the body length.
    fn read_body_into<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64, FormError> {
        let delimiter = self.delimiter.clone();
        // Room for the delimiter, its padding and line break in every block
        let want = self
            .config
            .chunk_size
            .max(delimiter.len() + MAX_TRANSPORT_PADDING + 4);
        let max_size = self.config.max_part_size;
        let mut written = 0u64;
        // The line break ending the header block doubles as the one before an
        // immediate delimiter, so the first scan starts with a virtual `\n`.
        let mut lead = 1usize;

        loop {
            let block = self.source.read_bytes(want)?;
            let eof = block.len() < want;
            let scan = if lead == 1 {
                let mut scan = Vec::with_capacity(block.len() + 1);
                scan.push(b'\n');
                scan.extend_from_slice(&block);
                scan
            } else {
                block
            };

            let mut from = 0;
            let hold_from = loop {
                let Some(rel) = find_subsequence(&scan[from..], &delimiter) else {
                    if eof {
                        return Err(FormError::Truncated("reading part body"));
                    }
                    break scan.len() - partial_suffix_len(&scan, &delimiter);
                };
                let at = from + rel;

                match classify_after_delimiter(&scan[at + delimiter.len()..], eof) {
                    Follows::Delimiter => {
                        let mut end = at;
                        if end > lead && scan[end - 1] == b'\r' {
                            end -= 1;
                        }
                        if end > lead {
                            write_limited(out, &scan[lead..end], &mut written, max_size)?;
                        }
                        self.source.push(&scan[at + 1..]);
                        return Ok(written);
                    }
                    Follows::NeedMore => break at,
                    Follows::Data => from = at + 1,
                }
            };

            // A trailing `\r` might belong to the delimiter's line break
            let mut end = hold_from.max(lead);
            if end > lead && scan[end - 1] == b'\r' {
                end -= 1;
            }
            write_limited(out, &scan[lead..end], &mut written, max_size)?;
            self.source.push(&scan[end..]);
            lead = 0;
        }
    }

    fn read_section(&mut self, headers: PartHeaders) -> Result<Part, FormError> {
        let Some(disposition) = headers.disposition.clone() else {
            return Err(FormError::invalid_multipart(
                "Missing Content-Disposition header",
            ));
        };

        match disposition.filename {
            Some(file_name) => {
                let mut sink = self.sinks.create_sink(SinkRequest {
                    name: &disposition.name,
                    file_name: &file_name,
                    content_type: headers.content_type.as_deref(),
                })?;
                let len = self.read_body_into(&mut sink)?;
                sink.flush()?;
                sink.seek(SeekFrom::Start(0))?;

                debug!(
                    "File part '{}' ({file_name}): {len} bytes",
                    disposition.name
                );
                Ok(Part::File(FilePart::new(
                    headers,
                    disposition.name,
                    file_name,
                    sink,
                    len,
                )))
            }
            None => {
                let mut body = Vec::new();
                self.read_body_into(&mut body)?;

                let value = match headers.charset() {
                    Some(label) => match TextEncoding::for_label(&label) {
                        Ok(encoding) => encoding.decode(&body),
                        Err(_) => {
                            debug!(
                                "Unknown charset '{label}' on field '{}', using configured encoding",
                                disposition.name
                            );
                            self.config.encoding.decode(&body)
                        }
                    },
                    None => self.config.encoding.decode(&body),
                };

                debug!(
                    "Parameter part '{}': {} bytes",
                    disposition.name,
                    body.len()
                );
                Ok(Part::Parameter(ParameterPart {
                    name: disposition.name,
                    value,
                    content_type: headers.content_type,
                }))
            }
        }
    }

    /// Advance the state machine until a part is complete or the body ends
    fn step(&mut self) -> Result<Option<Part>, FormError> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return Ok(None),
                State::DetectBoundary => {
                    if !self.detect_boundary()? {
                        return Ok(None);
                    }
                    self.state = State::ReadHeaders;
                }
                State::SeekSection => {
                    if !self.seek_section()? {
                        return Ok(None);
                    }
                    self.state = State::ReadHeaders;
                }
                State::ReadHeaders => {
                    if self.parts_count >= self.config.max_parts {
                        return Err(FormError::invalid_multipart(format!(
                            "Too many parts: maximum {} allowed",
                            self.config.max_parts
                        )));
                    }
                    let headers = self.read_headers()?;
                    self.state = State::ReadBody(headers);
                }
                State::ReadBody(headers) => {
                    let part = self.read_section(headers)?;
                    self.parts_count += 1;
                    self.state = State::SeekSection;
                    return Ok(Some(part));
                }
            }
        }
    }
}

impl<R: Read> Iterator for MultipartIterator<R> {
    type Item = Result<Part, FormError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Any error leaves the state at Done, so iteration stops after it
        self.step().transpose()
    }
}

/// Main multipart parser
pub struct MultipartParser<R> {
    iterator: MultipartIterator<R>,
}

impl<R: Read> MultipartParser<R> {
    /// Create a parser; validates the configuration and any explicit boundary
    pub fn new(reader: R, config: MultipartConfig) -> Result<Self, FormError> {
        config.validate()?;
        Ok(Self {
            iterator: MultipartIterator::new(reader, config),
        })
    }

    /// Create a parser with default limits and an explicit boundary
    pub fn with_boundary(reader: R, boundary: &str) -> Result<Self, FormError> {
        Self::new(reader, MultipartConfig::with_boundary(boundary))
    }

    /// Create a parser with default limits that detects the boundary
    pub fn with_default_config(reader: R) -> Result<Self, FormError> {
        Self::new(reader, MultipartConfig::default())
    }

    /// Use `sinks` to create the byte streams backing file parts
    pub fn with_sinks<P: SinkProvider + 'static>(mut self, sinks: P) -> Self {
        self.iterator.sinks = Box::new(sinks);
        self
    }

    /// Parse the whole body.
    ///
    /// Fails without a partial result if the input is malformed, the reader
    /// errors, or the closing boundary never arrives.
    pub fn parse(self) -> Result<ParseResult, FormError> {
        let mut result = ParseResult::new();
        for part in self.iterator {
            result.insert(part?);
        }
        Ok(result)
    }
}

impl<R: Read> IntoIterator for MultipartParser<R> {
    type Item = Result<Part, FormError>;
    type IntoIter = MultipartIterator<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iterator
    }
}

/// Parse an in-memory body
pub fn parse_bytes(body: &[u8], config: MultipartConfig) -> Result<ParseResult, FormError> {
    MultipartParser::new(body, config)?.parse()
}
