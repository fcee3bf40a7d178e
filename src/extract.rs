//! Reporting on and saving the parts of a parsed body
//!
//! # Security Features
//! - File names are sanitized; path traversal is rejected outright
//! - Only file parts matching the allowed glob patterns are written
//! - Existing files are never overwritten; clashing names get a numeric suffix
//! - Each file is written to a temporary file in the target directory and
//!   renamed into place once complete
//!
//! # Example Usage
//! ```rust,no_run
//! use formstack::extract::{save_files, summarize};
//! use formstack::multipart::parse_bytes;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let body = std::fs::read("upload.bin")?;
//! let mut result = parse_bytes(&body, Default::default())?;
//! for line in summarize(&result) {
//!     println!("{line}");
//! }
//! let report = save_files(&mut result, Path::new("out"), &["*.txt".to_string()])?;
//! println!("saved {} file(s)", report.saved.len());
//! # Ok(())
//! # }
//! ```

use crate::error::FormError;
use crate::multipart::ParseResult;
use glob::Pattern;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Buffer size used when copying a file part to disk
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A file part written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub field_name: String,
    /// File name as sent by the client
    pub original_name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Whether a numeric suffix was added to avoid a clash
    pub renamed: bool,
}

/// A file part that was not written, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub field_name: String,
    pub original_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct SaveReport {
    pub saved: Vec<SavedFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Sanitize a client-supplied file name for use inside a single directory
pub fn sanitize_filename(filename: &str) -> Result<String, FormError> {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(FormError::invalid_filename(filename));
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
        .collect();
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        return Err(FormError::invalid_filename(filename));
    }

    // No hidden files
    if sanitized.starts_with('.') {
        Ok(format!("file{sanitized}"))
    } else {
        Ok(sanitized.to_string())
    }
}

/// Compile glob patterns; an empty list allows everything
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, FormError> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| Pattern::new(p).map_err(FormError::from))
        .collect()
}

fn is_allowed(patterns: &[Pattern], filename: &str) -> bool {
    patterns.is_empty()
        || patterns
            .iter()
            .any(|pattern| pattern.matches_path(Path::new(filename)))
}

/// Pick a name that does not exist yet in `dir`
fn unique_filename(dir: &Path, original: &str) -> Result<(String, bool), FormError> {
    if !dir.join(original).exists() {
        return Ok((original.to_string(), false));
    }

    let path = Path::new(original);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    for i in 1..=9999 {
        let candidate = format!("{stem}_{i}{extension}");
        if !dir.join(&candidate).exists() {
            return Ok((candidate, true));
        }
    }

    Err(FormError::invalid_filename(format!(
        "{original}: no free name after 9999 attempts"
    )))
}

/// Write every allowed file part of `result` into `dir`, creating it if needed.
///
/// Parts are read from the start regardless of their current position.
/// Parts with unusable names or names outside `allowed_patterns` are reported
/// as skipped; I/O failures abort the whole operation.
pub fn save_files(
    result: &mut ParseResult,
    dir: &Path,
    allowed_patterns: &[String],
) -> Result<SaveReport, FormError> {
    let patterns = compile_patterns(allowed_patterns)?;
    fs::create_dir_all(dir)?;

    let mut report = SaveReport::default();

    for file in result.files_mut() {
        let skip = |reason: String| SkippedFile {
            field_name: file.name.clone(),
            original_name: file.file_name.clone(),
            reason,
        };

        let filename = match sanitize_filename(&file.file_name) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping file part '{}': {e}", file.name);
                report.skipped.push(skip(e.to_string()));
                continue;
            }
        };

        if !is_allowed(&patterns, &filename) {
            info!("Skipping '{filename}': not matched by allowed patterns");
            report
                .skipped
                .push(skip(format!("'{filename}' not matched by allowed patterns")));
            continue;
        }

        let (target_name, renamed) = unique_filename(dir, &filename)?;
        let target = dir.join(&target_name);

        let mut temp = NamedTempFile::new_in(dir)?;
        file.rewind()?;
        let size = file.stream_to(temp.as_file_mut(), COPY_BUFFER_SIZE)?;
        temp.as_file().sync_all()?;
        temp.persist_noclobber(&target).map_err(|e| FormError::Io(e.error))?;

        if renamed {
            debug!("Renamed '{filename}' to '{target_name}' to avoid a clash");
        }
        info!("Saved {} ({})", target.display(), format_bytes(size));

        report.saved.push(SavedFile {
            field_name: file.name.clone(),
            original_name: file.file_name.clone(),
            path: target,
            size,
            renamed,
        });
    }

    Ok(report)
}

/// One line per parameter (sorted by name) then one per file in wire order
pub fn summarize(result: &ParseResult) -> Vec<String> {
    let mut parameters: Vec<_> = result.parameters().values().collect();
    parameters.sort_by(|a, b| a.name.cmp(&b.name));

    let mut lines: Vec<String> = parameters
        .into_iter()
        .map(|p| format!("{} = {}", p.name, p.value))
        .collect();

    lines.extend(result.files().iter().map(|f| {
        format!(
            "{}: {} ({}, {} bytes)",
            f.name,
            f.file_name,
            f.content_type_or_default(),
            f.len()
        )
    }));

    lines
}

/// Format bytes into human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("document.txt").unwrap(), "document.txt");
        assert_eq!(sanitize_filename("naïve café.pdf").unwrap(), "naïve café.pdf");
        assert_eq!(sanitize_filename("a<b>c?.txt").unwrap(), "abc.txt");
        assert_eq!(sanitize_filename(".bashrc").unwrap(), "file.bashrc");

        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("dir/file.txt").is_err());
        assert!(sanitize_filename("dir\\file.txt").is_err());
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("***").is_err());
    }

    #[test]
    fn test_unique_filename() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("test.txt"), b"x").unwrap();
        fs::write(temp_dir.path().join("test_1.txt"), b"x").unwrap();

        assert_eq!(
            unique_filename(temp_dir.path(), "test.txt").unwrap(),
            ("test_2.txt".to_string(), true)
        );
        assert_eq!(
            unique_filename(temp_dir.path(), "fresh.txt").unwrap(),
            ("fresh.txt".to_string(), false)
        );
    }

    #[test]
    fn test_pattern_filter() {
        let patterns = compile_patterns(&["*.txt".to_string(), " *.pdf ".to_string()]).unwrap();
        assert!(is_allowed(&patterns, "a.txt"));
        assert!(is_allowed(&patterns, "b.pdf"));
        assert!(!is_allowed(&patterns, "c.exe"));
        assert!(is_allowed(&[], "anything"));
        assert!(compile_patterns(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
    }
}
