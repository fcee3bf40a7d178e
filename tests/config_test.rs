use clap::Parser;
use formstack::cli::Cli;
use formstack::config::{Config, ini_parser::IniConfig};
use formstack::process;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_ini_parser_basic() {
    let ini_content = r#"
# This is a comment
[parser]
boundary = abc123
chunk_size = 512
max_part_size = 2GB

[output]
spool = true

[logging]
verbose = false
"#;

    let ini = IniConfig::parse(ini_content).expect("Failed to parse INI");

    assert_eq!(ini.get_string("parser", "boundary"), Some("abc123".to_string()));
    assert_eq!(ini.get_usize("parser", "chunk_size"), Some(512));
    assert_eq!(
        ini.get_file_size("parser", "max_part_size"),
        Some(2 * 1024 * 1024 * 1024)
    );
    assert_eq!(ini.get_bool("output", "spool"), Some(true));
    assert_eq!(ini.get_bool("logging", "verbose"), Some(false));
}

#[test]
fn test_cli_args_override_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("formstack.ini");
    fs::write(
        &config_path,
        "[parser]\nchunk_size = 1KB\nencoding = ascii\n\n[output]\nallowed_extensions = *.txt\n",
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "formstack",
        "-",
        "--chunk-size",
        "32",
        "--config-file",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    let config = Config::load(&cli).unwrap();

    assert_eq!(config.input, "-");
    assert_eq!(config.chunk_size, 32);
    assert_eq!(config.encoding.label(), "us-ascii");
    assert_eq!(config.allowed_extensions, vec!["*.txt"]);

    let parser_config = config.multipart_config();
    assert_eq!(parser_config.chunk_size, 32);
    assert_eq!(parser_config.boundary, None);
}

#[test]
fn test_config_file_must_exist() {
    let result = Cli::try_parse_from(["formstack", "-", "--config-file", "/no/such/file.ini"]);
    assert!(result.is_err());
}

#[test]
fn test_process_saves_files() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("body.bin");
    let out_dir = temp_dir.path().join("saved");
    let config_path = temp_dir.path().join("empty.ini");
    fs::write(&config_path, "").unwrap();
    fs::write(
        &input,
        "--zz\r\nContent-Disposition: form-data; name=\"f\"; filename=\"hello.txt\"\r\n\r\nhello\r\n--zz--\r\n",
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "formstack",
        input.to_str().unwrap(),
        "--output-dir",
        out_dir.to_str().unwrap(),
        "--spool",
        "true",
        "--config-file",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    cli.validate().unwrap();
    let config = Config::load(&cli).unwrap();
    assert!(config.spool);

    process(&config).unwrap();
    assert_eq!(
        fs::read_to_string(out_dir.join("hello.txt")).unwrap(),
        "hello"
    );
}

#[test]
fn test_process_reports_malformed_input() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("body.bin");
    let config_path = temp_dir.path().join("empty.ini");
    fs::write(&config_path, "").unwrap();
    fs::write(&input, "no boundary here\r\n").unwrap();

    let cli = Cli::try_parse_from([
        "formstack",
        input.to_str().unwrap(),
        "--config-file",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    let config = Config::load(&cli).unwrap();

    let err = process(&config).unwrap_err();
    assert!(err.is_parse_error());
}
