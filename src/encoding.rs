//! Pluggable text decoding for character- and line-oriented reads.
//!
//! The byte stack and the parser only need two things from an encoding: how
//! many bytes make up one character, and how to turn bytes into text. Invalid
//! input never fails; it decodes to U+FFFD.

use crate::error::FormError;
use std::fmt;
use std::sync::Arc;

/// Decoding strategy for one text encoding
pub trait TextDecoder: fmt::Debug + Send + Sync {
    /// Canonical label, e.g. `"utf-8"`
    fn label(&self) -> &'static str;

    /// Number of bytes in the character introduced by `lead`
    fn char_width(&self, lead: u8) -> usize {
        let _ = lead;
        1
    }

    /// Whether `byte` may continue a multi-byte character
    fn is_continuation(&self, byte: u8) -> bool {
        let _ = byte;
        false
    }

    /// Decode exactly one character from `bytes`
    fn decode_char(&self, bytes: &[u8]) -> char;

    /// Decode a run of bytes into text
    fn decode(&self, bytes: &[u8]) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl TextDecoder for Utf8 {
    fn label(&self) -> &'static str {
        "utf-8"
    }

    fn char_width(&self, lead: u8) -> usize {
        match lead {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        }
    }

    fn is_continuation(&self, byte: u8) -> bool {
        (0x80..=0xBF).contains(&byte)
    }

    fn decode_char(&self, bytes: &[u8]) -> char {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// ISO-8859-1: every byte maps to the code point of the same value
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1;

impl TextDecoder for Latin1 {
    fn label(&self) -> &'static str {
        "iso-8859-1"
    }

    fn decode_char(&self, bytes: &[u8]) -> char {
        bytes
            .first()
            .map(|&b| b as char)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii;

impl TextDecoder for Ascii {
    fn label(&self) -> &'static str {
        "us-ascii"
    }

    fn decode_char(&self, bytes: &[u8]) -> char {
        match bytes.first() {
            Some(&b) if b.is_ascii() => b as char,
            _ => char::REPLACEMENT_CHARACTER,
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|&b| {
                if b.is_ascii() {
                    b as char
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect()
    }
}

/// Shareable handle to a [`TextDecoder`]; defaults to UTF-8
#[derive(Clone)]
pub struct TextEncoding(Arc<dyn TextDecoder>);

impl TextEncoding {
    pub fn utf8() -> Self {
        Self(Arc::new(Utf8))
    }

    pub fn latin1() -> Self {
        Self(Arc::new(Latin1))
    }

    pub fn ascii() -> Self {
        Self(Arc::new(Ascii))
    }

    /// Wrap a caller-provided decoder
    pub fn custom<D: TextDecoder + 'static>(decoder: D) -> Self {
        Self(Arc::new(decoder))
    }

    /// Look up an encoding by its label (case-insensitive)
    pub fn for_label(label: &str) -> Result<Self, FormError> {
        match label.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::utf8()),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Self::latin1()),
            "us-ascii" | "ascii" => Ok(Self::ascii()),
            _ => Err(FormError::UnsupportedEncoding(label.to_string())),
        }
    }

    pub fn decoder(&self) -> &dyn TextDecoder {
        self.0.as_ref()
    }

    pub fn label(&self) -> &'static str {
        self.0.label()
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        self.0.decode(bytes)
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextEncoding").field(&self.label()).finish()
    }
}
