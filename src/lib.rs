/// # formstack
///
/// A streaming multipart/form-data parser.
///
/// The body is pulled through a [`rebuffer::RebufferedSource`], a reader that
/// keeps pushed-back bytes on a [`chunk_stack::ChunkedByteStack`], so sections
/// of any size are parsed with bounded memory and boundaries that straddle two
/// reads are still found. The `run` function drives the command-line tool.
pub mod chunk_stack;
pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod multipart;
pub mod rebuffer;
pub mod sink;
pub mod subsequence;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::FormError;
use crate::multipart::{MultipartParser, ParseResult};
use crate::sink::TempFileSinks;
use clap::Parser;
use env_logger::Env;
use log::error;
use std::fs::File;
use std::io::{self, BufReader, Read};

/// Parses command-line arguments, initializes the logger and processes the input.
///
/// This is the entry point of the binary. Any error is logged and the process
/// exits with status 1.
pub fn run() {
    let cli = Cli::parse();

    // Load configuration with precedence: CLI > INI > Defaults
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG, when set, wins over the configured level
    let log_level = config.log_level();
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    log::debug!("Log level set to: {log_level}");

    if config.verbose {
        config.print_summary();
    }

    if let Err(e) = cli.validate() {
        error!("Configuration validation error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = process(&config) {
        error!("Failed to process {}: {e}", config.input);
        std::process::exit(1);
    }
}

/// Parse the configured input, print its summary and save files if asked to
pub fn process(config: &Config) -> Result<(), FormError> {
    let reader: Box<dyn Read> = if config.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(&config.input)?))
    };

    let mut result = parse_input(reader, config)?;

    for line in extract::summarize(&result) {
        println!("{line}");
    }

    if let Some(ref dir) = config.output_dir {
        let report = extract::save_files(&mut result, dir, &config.allowed_extensions)?;
        for saved in &report.saved {
            println!("saved {}", saved.path.display());
        }
        for skipped in &report.skipped {
            println!("skipped {}: {}", skipped.original_name, skipped.reason);
        }
    }

    Ok(())
}

fn parse_input<R: Read>(reader: R, config: &Config) -> Result<ParseResult, FormError> {
    let parser = MultipartParser::new(reader, config.multipart_config())?;
    if config.spool {
        parser.with_sinks(TempFileSinks::new()).parse()
    } else {
        parser.parse()
    }
}
