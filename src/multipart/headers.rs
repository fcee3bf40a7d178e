//! Section header parsing: `Content-Disposition`, `Content-Type` and friends.

use super::MultipartConfig;
use crate::error::FormError;
use std::collections::HashMap;

/// Represents the Content-Disposition header of a multipart section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// The disposition type (usually "form-data")
    pub disposition_type: String,
    /// The name of the form field
    pub name: String,
    /// File name; its presence makes the section a file section
    pub filename: Option<String>,
    /// Remaining parameters, keys lowercased
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parse a Content-Disposition header value
    pub fn parse(value: &str, config: &MultipartConfig) -> Result<Self, FormError> {
        let mut parts = split_parameters(value).into_iter();

        let disposition_type = parts
            .next()
            .map(|p| p.to_lowercase())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| FormError::invalid_multipart("Empty Content-Disposition header"))?;

        let mut name = None;
        let mut filename = None;
        let mut extended_filename = None;
        let mut parameters = HashMap::new();

        for part in parts {
            let Some((key, val)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let val = val.trim();

            match key.as_str() {
                "name" => {
                    let val = unquote(val);
                    if val.len() > config.max_field_name_length {
                        return Err(FormError::invalid_multipart(format!(
                            "Field name too long: {} characters",
                            val.len()
                        )));
                    }
                    name = Some(val);
                }
                "filename" => {
                    let val = unquote(val);
                    check_filename_length(&val, config)?;
                    filename = Some(val);
                }
                "filename*" => {
                    if let Some(val) = decode_extended_value(val) {
                        check_filename_length(&val, config)?;
                        extended_filename = Some(val);
                    }
                }
                _ => {
                    parameters.insert(key, unquote(val));
                }
            }
        }

        let name = name.ok_or_else(|| {
            FormError::invalid_multipart("Missing 'name' in Content-Disposition")
        })?;

        Ok(Self {
            disposition_type,
            name,
            filename: extended_filename.or(filename),
            parameters,
        })
    }
}

fn check_filename_length(filename: &str, config: &MultipartConfig) -> Result<(), FormError> {
    if filename.len() > config.max_filename_length {
        return Err(FormError::invalid_multipart(format!(
            "Filename too long: {} characters",
            filename.len()
        )));
    }
    Ok(())
}

/// The recognized headers of one multipart section
#[derive(Debug, Clone, Default)]
pub struct PartHeaders {
    /// Parsed Content-Disposition header
    pub disposition: Option<ContentDisposition>,
    /// Content-Disposition exactly as received
    pub raw_disposition: Option<String>,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Content-Transfer-Encoding header
    pub transfer_encoding: Option<String>,
    /// All headers, names lowercased
    pub headers: HashMap<String, String>,
}

impl PartHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse header lines (already unfolded, terminators stripped)
    pub fn from_lines<S: AsRef<str>>(
        lines: &[S],
        config: &MultipartConfig,
    ) -> Result<Self, FormError> {
        let mut parsed = Self::new();

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(FormError::invalid_multipart(format!(
                    "Invalid header format: {line}"
                )));
            };
            let name = name.trim().to_lowercase();
            let value = value.trim().to_string();

            match name.as_str() {
                "content-disposition" => {
                    parsed.disposition = Some(ContentDisposition::parse(&value, config)?);
                    parsed.raw_disposition = Some(value.clone());
                }
                "content-type" => parsed.content_type = Some(value.clone()),
                "content-transfer-encoding" => parsed.transfer_encoding = Some(value.clone()),
                _ => {}
            }

            parsed.headers.insert(name, value);
        }

        Ok(parsed)
    }

    /// Look up any header by case-insensitive name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn field_name(&self) -> Option<&str> {
        self.disposition.as_ref().map(|d| d.name.as_str())
    }

    pub fn filename(&self) -> Option<&str> {
        self.disposition.as_ref().and_then(|d| d.filename.as_deref())
    }

    pub fn is_file(&self) -> bool {
        self.filename().is_some()
    }

    /// The `charset` parameter of Content-Type, if any
    pub fn charset(&self) -> Option<String> {
        let content_type = self.content_type.as_deref()?;
        split_parameters(content_type)
            .into_iter()
            .skip(1)
            .filter_map(|p| {
                let (key, val) = p.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("charset")
                    .then(|| unquote(val.trim()))
            })
            .next()
    }
}

/// Append `line` to `lines`, joining it onto the previous header when it is a
/// continuation (leading space or tab)
pub(crate) fn fold_header_line(lines: &mut Vec<String>, line: &str) {
    if line.starts_with([' ', '\t']) {
        if let Some(last) = lines.last_mut() {
            last.push(' ');
            last.push_str(line.trim());
            return;
        }
    }
    lines.push(line.to_string());
}

/// Split a header value on `;`, ignoring separators inside quoted strings
pub(crate) fn split_parameters(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Strip surrounding quotes and resolve backslash escapes
pub(crate) fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode an RFC 5987 extended value such as `UTF-8''na%C3%AFve.txt`.
///
/// Only UTF-8 and ISO-8859-1 charsets are understood.
fn decode_extended_value(value: &str) -> Option<String> {
    let value = unquote(value);
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?.to_lowercase();
    let _language = pieces.next()?;
    let encoded = pieces.next()?;

    let bytes = percent_decode(encoded)?;
    match charset.as_str() {
        "utf-8" => Some(String::from_utf8_lossy(&bytes).into_owned()),
        "iso-8859-1" => Some(bytes.iter().map(|&b| b as char).collect()),
        _ => None,
    }
}

fn percent_decode(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}
