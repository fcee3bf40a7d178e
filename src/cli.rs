use crate::error::FormError;
use clap::Parser;
use log::warn;
use std::path::PathBuf;

// Defines the command-line interface using clap.
// Every option is optional so the config layer can tell "not given" from a default.
#[derive(Parser, Clone, Debug)]
#[command(
    name = "formstack",
    version,
    long_about = "Streams a multipart/form-data body from a file or stdin and reports what it contains.\n The boundary can be given explicitly, taken from a Content-Type header value, or detected from the first line of the body.\n Bodies are pulled through a small rebuffering layer, so arbitrarily large uploads are handled in fixed-size chunks.\n File parts are kept in memory or spooled to anonymous temporary files, and can be saved into a directory with sanitized names.\n",
    about = "Streaming multipart/form-data inspector and extractor."
)]
pub struct Cli {
    /// Multipart body to read, or "-" for stdin
    pub input: String,

    /// Boundary token (without the leading "--"); detected from the first line when omitted
    #[arg(short, long)]
    pub boundary: Option<String>,

    /// Content-Type header value to take the boundary from, e.g. 'multipart/form-data; boundary=xyz'
    #[arg(long, conflicts_with = "boundary")]
    pub content_type: Option<String>,

    /// Bytes requested from the input per read. Smaller chunks mean less memory held at once.
    #[arg(short, long, value_parser = validate_chunk_size)]
    pub chunk_size: Option<usize>,

    /// Text encoding for headers and parameter values (utf-8, iso-8859-1, us-ascii)
    #[arg(short, long)]
    pub encoding: Option<String>,

    /// Save file parts into this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Spool file parts to temporary files instead of keeping them in memory
    #[arg(short, long)]
    pub spool: Option<bool>,

    /// File name patterns allowed to be saved (comma-separated, supports wildcards like *.zip, *.txt)
    #[arg(short, long)]
    pub allowed_extensions: Option<String>,

    /// Enable verbose logging for debugging (log level: debug)
    #[arg(short, long)]
    pub verbose: Option<bool>,

    /// Enable more detailed logging (log level: info if verbose=false, debug if verbose=true)
    #[arg(long)]
    pub detailed_logging: Option<bool>,

    /// Configuration file path (INI format). If not provided, looks for formstack.ini in current directory or ~/.config/formstack/config.ini
    #[arg(long, value_parser = validate_config_file)]
    pub config_file: Option<String>,
}

/// Chunk sizes between 1 byte and 64 MB
fn validate_chunk_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .parse()
        .map_err(|_| "Chunk size must be a positive number".to_string())?;

    if size == 0 {
        return Err("Chunk size must be at least 1 byte".to_string());
    }

    if size > 64 * 1024 * 1024 {
        return Err("Chunk size must not exceed 64 MB".to_string());
    }

    Ok(size)
}

/// Validate config file path exists and is readable
fn validate_config_file(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Config file path cannot be empty".to_string());
    }

    let path = PathBuf::from(s);

    if !path.exists() {
        return Err(format!("Config file does not exist: {s}"));
    }

    if !path.is_file() {
        return Err(format!("Config path is not a file: {s}"));
    }

    match std::fs::File::open(&path) {
        Ok(_) => Ok(s.to_string()),
        Err(e) => Err(format!("Cannot read config file {s}: {e}")),
    }
}

impl Cli {
    /// Reads from stdin
    pub fn reads_stdin(&self) -> bool {
        self.input == "-"
    }

    /// Validate the arguments for consistency before any input is read
    pub fn validate(&self) -> Result<(), FormError> {
        if !self.reads_stdin() {
            let path = PathBuf::from(&self.input);
            if !path.is_file() {
                return Err(FormError::InvalidConfiguration(format!(
                    "Input is not a readable file: {}",
                    self.input
                )));
            }
        }

        if let Some(dir) = &self.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(FormError::InvalidConfiguration(format!(
                    "Output path is not a directory: {}",
                    dir.display()
                )));
            }
        } else if self.allowed_extensions.is_some() {
            warn!("--allowed-extensions has no effect without --output-dir");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(input: &str) -> Cli {
        Cli {
            input: input.to_string(),
            boundary: None,
            content_type: None,
            chunk_size: None,
            encoding: None,
            output_dir: None,
            spool: None,
            allowed_extensions: None,
            verbose: None,
            detailed_logging: None,
            config_file: None,
        }
    }

    #[test]
    fn test_validate_chunk_size() {
        assert_eq!(validate_chunk_size("1").unwrap(), 1);
        assert_eq!(validate_chunk_size("4096").unwrap(), 4096);

        assert!(validate_chunk_size("0").is_err());
        assert!(validate_chunk_size("-1").is_err());
        assert!(validate_chunk_size("abc").is_err());
        assert!(validate_chunk_size("999999999999").is_err());
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "formstack",
            "body.bin",
            "--boundary",
            "xyz",
            "--chunk-size",
            "16",
            "--spool",
            "true",
        ])
        .unwrap();
        assert_eq!(cli.input, "body.bin");
        assert_eq!(cli.boundary.as_deref(), Some("xyz"));
        assert_eq!(cli.chunk_size, Some(16));
        assert_eq!(cli.spool, Some(true));

        assert!(
            Cli::try_parse_from(["formstack", "-", "--boundary", "a", "--content-type", "b"])
                .is_err()
        );
    }

    #[test]
    fn test_cli_validate() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("body.bin");
        std::fs::write(&input, "--b--\r\n").unwrap();

        let mut valid = cli(&input.to_string_lossy());
        assert!(valid.validate().is_ok());
        assert!(cli("-").validate().is_ok());

        assert!(cli("/nonexistent/body.bin").validate().is_err());

        valid.output_dir = Some(input.clone());
        assert!(valid.validate().is_err());

        valid.output_dir = Some(temp_dir.path().join("not-yet-created"));
        assert!(valid.validate().is_ok());
    }
}
