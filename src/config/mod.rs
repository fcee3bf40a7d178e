//! Configuration management for formstack
//! Supports INI files with CLI argument overrides

pub mod ini_parser;

use crate::cli::Cli;
use crate::encoding::TextEncoding;
use crate::error::FormError;
use crate::multipart::{MultipartConfig, extract_boundary_from_content_type};
use crate::rebuffer::DEFAULT_CHUNK_SIZE;
use ini_parser::IniConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    // Input
    pub input: String,

    // Parser settings
    pub boundary: Option<String>,
    pub chunk_size: usize,
    pub encoding: TextEncoding,
    pub max_parts: usize,
    pub max_part_size: u64,
    pub max_headers_size: usize,

    // Output settings
    pub output_dir: Option<PathBuf>,
    pub spool: bool,
    pub allowed_extensions: Vec<String>,

    // Logging settings
    pub verbose: bool,
    pub detailed_logging: bool,
}

impl Config {
    /// Load configuration with precedence: CLI args > INI file > Defaults
    pub fn load(cli: &Cli) -> Result<Self, FormError> {
        let config_file = Self::find_config_file(cli)?;
        let ini = if let Some(path) = config_file {
            log::info!("Loading configuration from: {}", path.display());
            IniConfig::load_file(&path).map_err(FormError::InvalidConfiguration)?
        } else {
            log::info!("No configuration file found, using defaults and CLI overrides");
            IniConfig::new()
        };

        let defaults = MultipartConfig::default();

        Ok(Self {
            input: cli.input.clone(),

            boundary: Self::get_boundary(&ini, cli)?,
            chunk_size: Self::get_chunk_size(&ini, cli)?,
            encoding: Self::get_encoding(&ini, cli)?,
            max_parts: ini
                .get_usize("parser", "max_parts")
                .unwrap_or(defaults.max_parts),
            max_part_size: ini
                .get_file_size("parser", "max_part_size")
                .unwrap_or(defaults.max_part_size),
            max_headers_size: ini
                .get_file_size("parser", "max_headers_size")
                .map(|size| size as usize)
                .unwrap_or(defaults.max_headers_size),

            output_dir: Self::get_output_dir(&ini, cli),
            spool: Self::get_spool(&ini, cli),
            allowed_extensions: Self::get_allowed_extensions(&ini, cli),

            verbose: Self::get_verbose(&ini, cli),
            detailed_logging: Self::get_detailed_logging(&ini, cli),
        })
    }

    /// Find configuration file in order of preference
    fn find_config_file(cli: &Cli) -> Result<Option<PathBuf>, FormError> {
        // 1. Explicit --config-file
        if let Some(ref config_path) = cli.config_file {
            let path = PathBuf::from(config_path);
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(FormError::InvalidConfiguration(format!(
                    "Config file specified but not found: {config_path}"
                )));
            }
        }

        // 2. Current directory
        let current_config = PathBuf::from("formstack.ini");
        if current_config.exists() {
            return Ok(Some(current_config));
        }

        // 3. User config directory (~/.config/formstack/config.ini)
        if let Some(home_dir) = std::env::var_os("HOME") {
            let user_config = Path::new(&home_dir)
                .join(".config")
                .join("formstack")
                .join("config.ini");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // 4. System config (Unix-like systems)
        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/formstack/config.ini");
            if system_config.exists() {
                return Ok(Some(system_config));
            }
        }

        Ok(None)
    }

    // Configuration value getters with precedence: CLI > INI > Default

    fn get_boundary(ini: &IniConfig, cli: &Cli) -> Result<Option<String>, FormError> {
        if let Some(ref boundary) = cli.boundary {
            return Ok(Some(boundary.clone()));
        }

        if let Some(ref content_type) = cli.content_type {
            return extract_boundary_from_content_type(content_type).map(Some);
        }

        // INI file; None means detect from the body
        Ok(ini
            .get_string("parser", "boundary")
            .filter(|b| !b.is_empty()))
    }

    fn get_chunk_size(ini: &IniConfig, cli: &Cli) -> Result<usize, FormError> {
        let chunk_size = cli
            .chunk_size
            .or_else(|| ini.get_file_size("parser", "chunk_size").map(|s| s as usize))
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        if chunk_size == 0 {
            return Err(FormError::InvalidConfiguration(
                "chunk_size must be at least 1 byte".to_string(),
            ));
        }
        Ok(chunk_size)
    }

    fn get_encoding(ini: &IniConfig, cli: &Cli) -> Result<TextEncoding, FormError> {
        match cli
            .encoding
            .clone()
            .or_else(|| ini.get_string("parser", "encoding"))
        {
            Some(label) => TextEncoding::for_label(&label),
            None => Ok(TextEncoding::default()),
        }
    }

    fn get_output_dir(ini: &IniConfig, cli: &Cli) -> Option<PathBuf> {
        if let Some(ref output_dir) = cli.output_dir {
            return Some(output_dir.clone());
        }

        ini.get_string("output", "directory").map(PathBuf::from)
    }

    fn get_spool(ini: &IniConfig, cli: &Cli) -> bool {
        if let Some(spool) = cli.spool {
            return spool;
        }

        ini.get_bool_or("output", "spool", false)
    }

    fn get_allowed_extensions(ini: &IniConfig, cli: &Cli) -> Vec<String> {
        if let Some(ref extensions) = cli.allowed_extensions {
            return extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let ini_extensions = ini.get_list("output", "allowed_extensions");
        if !ini_extensions.is_empty() {
            return ini_extensions;
        }

        // Default: save everything
        vec!["*".to_string()]
    }

    fn get_verbose(ini: &IniConfig, cli: &Cli) -> bool {
        if let Some(verbose) = cli.verbose {
            return verbose;
        }

        ini.get_bool_or("logging", "verbose", false)
    }

    fn get_detailed_logging(ini: &IniConfig, cli: &Cli) -> bool {
        if let Some(detailed) = cli.detailed_logging {
            return detailed;
        }

        ini.get_bool_or("logging", "detailed", false)
    }

    /// Parser settings derived from this configuration
    pub fn multipart_config(&self) -> MultipartConfig {
        MultipartConfig {
            boundary: self.boundary.clone(),
            chunk_size: self.chunk_size,
            encoding: self.encoding.clone(),
            max_parts: self.max_parts,
            max_part_size: self.max_part_size,
            max_headers_size: self.max_headers_size,
            ..Default::default()
        }
    }

    /// Log level implied by the logging flags
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.detailed_logging {
            "info"
        } else {
            "warn"
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("Configuration Summary:");
        log::info!("  Input: {}", self.input);
        log::info!(
            "  Boundary: {}",
            self.boundary.as_deref().unwrap_or("(detect from body)")
        );
        log::info!("  Chunk Size: {} bytes", self.chunk_size);
        log::info!("  Encoding: {}", self.encoding.label());
        log::info!("  Max Parts: {}", self.max_parts);
        log::info!("  Max Part Size: {} bytes", self.max_part_size);
        if let Some(ref output_dir) = self.output_dir {
            log::info!("  Output Directory: {}", output_dir.display());
            log::info!("  Allowed Extensions: {:?}", self.allowed_extensions);
        }
        log::info!("  Spool To Temp Files: {}", self.spool);
        log::info!("  Verbose Logging: {}", self.verbose);
        log::info!("  Detailed Logging: {}", self.detailed_logging);
    }
}
