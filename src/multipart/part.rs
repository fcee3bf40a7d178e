//! Parsed sections and the collection handed to callers.

use super::headers::PartHeaders;
use crate::error::FormError;
use crate::sink::PartSink;
use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A plain form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPart {
    pub name: String,
    /// Body decoded as text
    pub value: String,
    pub content_type: Option<String>,
}

/// An uploaded file; the body lives in a caller-owned sink positioned at 0
pub struct FilePart {
    pub name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    /// Content-Disposition header value as received
    pub content_disposition: String,
    pub headers: PartHeaders,
    sink: Box<dyn PartSink>,
    len: u64,
}

impl FilePart {
    pub(crate) fn new(
        headers: PartHeaders,
        name: String,
        file_name: String,
        sink: Box<dyn PartSink>,
        len: u64,
    ) -> Self {
        Self {
            content_type: headers.content_type.clone(),
            content_disposition: headers.raw_disposition.clone().unwrap_or_default(),
            name,
            file_name,
            headers,
            sink,
            len,
        }
    }

    /// Size of the section body in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Content type, or `application/octet-stream` when none was sent
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }

    pub fn sink_mut(&mut self) -> &mut dyn PartSink {
        self.sink.as_mut()
    }

    /// Take ownership of the sink
    pub fn into_sink(self) -> Box<dyn PartSink> {
        self.sink
    }

    /// Move the read position back to the start of the body
    pub fn rewind(&mut self) -> io::Result<()> {
        self.sink.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Read the rest of the body as bytes
    pub fn read_to_bytes(&mut self) -> Result<Vec<u8>, FormError> {
        let mut buffer = Vec::new();
        self.sink.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Read the rest of the body as UTF-8 text
    pub fn read_to_string(&mut self) -> Result<String, FormError> {
        let bytes = self.read_to_bytes()?;
        String::from_utf8(bytes)
            .map_err(|_| FormError::invalid_multipart("Part contains invalid UTF-8"))
    }

    /// Copy the rest of the body into `writer` using a buffer of `buffer_size`
    /// bytes; returns the number of bytes written
    pub fn stream_to<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        buffer_size: usize,
    ) -> Result<u64, FormError> {
        let mut buffer = vec![0u8; buffer_size.max(1)];
        let mut total = 0u64;
        loop {
            let n = match self.sink.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            writer.write_all(&buffer[..n])?;
            total += n as u64;
        }
        writer.flush()?;
        Ok(total)
    }
}

impl Read for FilePart {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.sink.read(buf)
    }
}

impl Seek for FilePart {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.sink.seek(pos)
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("content_disposition", &self.content_disposition)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// One parsed section
#[derive(Debug)]
pub enum Part {
    Parameter(ParameterPart),
    File(FilePart),
}

impl Part {
    pub fn name(&self) -> &str {
        match self {
            Part::Parameter(p) => &p.name,
            Part::File(f) => &f.name,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Part::File(_))
    }

    pub fn as_parameter(&self) -> Option<&ParameterPart> {
        match self {
            Part::Parameter(p) => Some(p),
            Part::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<FilePart> {
        match self {
            Part::File(f) => Some(f),
            Part::Parameter(_) => None,
        }
    }
}

/// All sections of a body: parameters by name, files in wire order
#[derive(Debug, Default)]
pub struct ParseResult {
    parameters: HashMap<String, ParameterPart>,
    files: Vec<FilePart>,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a part. A parameter whose name was already seen replaces the
    /// earlier one; file parts are always appended.
    pub fn insert(&mut self, part: Part) {
        match part {
            Part::Parameter(parameter) => {
                if let Some(previous) = self.parameters.insert(parameter.name.clone(), parameter)
                {
                    warn!(
                        "Duplicate parameter '{}': later value replaces '{}'",
                        previous.name, previous.value
                    );
                }
            }
            Part::File(file) => self.files.push(file),
        }
    }

    /// Value of the named parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|p| p.value.as_str())
    }

    pub fn parameter_part(&self, name: &str) -> Option<&ParameterPart> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &HashMap<String, ParameterPart> {
        &self.parameters
    }

    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut [FilePart] {
        &mut self.files
    }

    /// First file with the given field name
    pub fn file(&self, name: &str) -> Option<&FilePart> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn file_mut(&mut self, name: &str) -> Option<&mut FilePart> {
        self.files.iter_mut().find(|f| f.name == name)
    }

    /// All files with the given field name, in wire order
    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FilePart> + 'a {
        self.files.iter().filter(move |f| f.name == name)
    }

    /// Files grouped by field name, each group in wire order
    pub fn files_by_name(&self) -> HashMap<&str, Vec<&FilePart>> {
        let mut grouped: HashMap<&str, Vec<&FilePart>> = HashMap::new();
        for file in &self.files {
            grouped.entry(file.name.as_str()).or_default().push(file);
        }
        grouped
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.files.is_empty()
    }

    /// Split into the parameter map and the file list
    pub fn into_parts(self) -> (HashMap<String, ParameterPart>, Vec<FilePart>) {
        (self.parameters, self.files)
    }
}

impl FromIterator<Part> for ParseResult {
    fn from_iter<I: IntoIterator<Item = Part>>(iter: I) -> Self {
        let mut result = ParseResult::new();
        for part in iter {
            result.insert(part);
        }
        result
    }
}
