// SPDX-License-Identifier: MIT

use std::fmt;

#[derive(Debug)]
pub enum FormError {
    Io(std::io::Error),
    Glob(glob::PatternError),
    InvalidBoundary(String),  // Contains the rejected boundary or reason
    InvalidMultipart(String), // Contains details about the structural problem
    Truncated(&'static str),  // Contains the parser state that ran out of input
    PartTooLarge(u64),        // Contains the maximum allowed size
    UnsupportedEncoding(String),
    InvalidConfiguration(String),
    InvalidFilename(String),
}

pub type Result<T> = std::result::Result<T, FormError>;

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::Io(err) => write!(f, "IO error: {err}"),
            FormError::Glob(err) => write!(f, "Glob pattern error: {err}"),
            FormError::InvalidBoundary(msg) => write!(f, "Invalid boundary: {msg}"),
            FormError::InvalidMultipart(msg) => write!(f, "Invalid multipart data: {msg}"),
            FormError::Truncated(state) => {
                write!(f, "Multipart stream ended before the closing boundary ({state})")
            }
            FormError::PartTooLarge(max_size) => {
                write!(f, "Part too large. Maximum allowed size: {max_size} bytes")
            }
            FormError::UnsupportedEncoding(label) => {
                write!(f, "Unsupported text encoding '{label}'")
            }
            FormError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {msg}"),
            FormError::InvalidFilename(filename) => {
                write!(
                    f,
                    "Invalid filename '{filename}': contains illegal characters or path traversal"
                )
            }
        }
    }
}

impl From<std::io::Error> for FormError {
    fn from(err: std::io::Error) -> Self {
        FormError::Io(err)
    }
}

impl From<glob::PatternError> for FormError {
    fn from(err: glob::PatternError) -> Self {
        FormError::Glob(err)
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormError::Io(err) => Some(err),
            FormError::Glob(err) => Some(err),
            _ => None,
        }
    }
}

impl FormError {
    pub fn invalid_boundary<S: Into<String>>(msg: S) -> Self {
        FormError::InvalidBoundary(msg.into())
    }

    pub fn invalid_multipart<S: Into<String>>(msg: S) -> Self {
        FormError::InvalidMultipart(msg.into())
    }

    pub fn invalid_filename<S: Into<String>>(filename: S) -> Self {
        FormError::InvalidFilename(filename.into())
    }

    /// Checks if the error describes malformed multipart input rather than
    /// an environment failure
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            FormError::InvalidBoundary(_)
                | FormError::InvalidMultipart(_)
                | FormError::Truncated(_)
                | FormError::PartTooLarge(_)
        )
    }
}
