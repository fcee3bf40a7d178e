//! Output sinks that receive the body bytes of file sections.
//!
//! The parser asks a [`SinkProvider`] for a fresh sink whenever it starts a
//! file section, writes the body into it, rewinds it, and hands it over inside
//! the resulting `FilePart`. From then on the sink belongs to the caller; the
//! parser never closes or reuses it.

use log::debug;
use std::io::{self, Cursor, Read, Seek, Write};

/// A readable, writable, seekable byte stream
pub trait PartSink: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> PartSink for T {}

/// What the parser knows about a file section when it asks for a sink
#[derive(Debug, Clone, Copy)]
pub struct SinkRequest<'a> {
    pub name: &'a str,
    pub file_name: &'a str,
    pub content_type: Option<&'a str>,
}

/// Factory for file section sinks
pub trait SinkProvider: Send {
    fn create_sink(&mut self, request: SinkRequest<'_>) -> io::Result<Box<dyn PartSink>>;
}

impl<F> SinkProvider for F
where
    F: FnMut(SinkRequest<'_>) -> io::Result<Box<dyn PartSink>> + Send,
{
    fn create_sink(&mut self, request: SinkRequest<'_>) -> io::Result<Box<dyn PartSink>> {
        self(request)
    }
}

/// Keeps every file body in a growable in-memory buffer
#[derive(Debug, Default, Clone, Copy)]
pub struct MemorySinks;

impl SinkProvider for MemorySinks {
    fn create_sink(&mut self, _request: SinkRequest<'_>) -> io::Result<Box<dyn PartSink>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }
}

/// Spools every file body to an anonymous temporary file.
///
/// The file is unlinked by the OS as soon as the sink is dropped.
#[derive(Debug, Default)]
pub struct TempFileSinks {
    dir: Option<std::path::PathBuf>,
}

impl TempFileSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the temporary files inside `dir` instead of the system default
    pub fn in_dir<P: Into<std::path::PathBuf>>(dir: P) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl SinkProvider for TempFileSinks {
    fn create_sink(&mut self, request: SinkRequest<'_>) -> io::Result<Box<dyn PartSink>> {
        let file = match &self.dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        debug!(
            "Spooling file part '{}' ({}) to a temporary file",
            request.name, request.file_name
        );
        Ok(Box::new(file))
    }
}
