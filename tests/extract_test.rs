use formstack::error::FormError;
use formstack::extract::{save_files, summarize};
use formstack::multipart::{MultipartConfig, parse_bytes};
use std::fs;
use tempfile::TempDir;

const BODY: &str = "--x\r\n\
    Content-Disposition: form-data; name=\"title\"\r\n\r\n\
    Quarterly report\r\n\
    --x\r\n\
    Content-Disposition: form-data; name=\"author\"\r\n\r\n\
    Jo\r\n\
    --x\r\n\
    Content-Disposition: form-data; name=\"doc\"; filename=\"report.txt\"\r\n\
    Content-Type: text/plain\r\n\r\n\
    numbers\r\n\
    --x\r\n\
    Content-Disposition: form-data; name=\"doc\"; filename=\"report.txt\"\r\n\r\n\
    more numbers\r\n\
    --x\r\n\
    Content-Disposition: form-data; name=\"evil\"; filename=\"../../etc/passwd\"\r\n\r\n\
    root\r\n\
    --x\r\n\
    Content-Disposition: form-data; name=\"hidden\"; filename=\".env\"\r\n\r\n\
    SECRET=1\r\n\
    --x\r\n\
    Content-Disposition: form-data; name=\"bin\"; filename=\"tool.exe\"\r\n\r\n\
    MZ\r\n\
    --x--\r\n";

fn config() -> MultipartConfig {
    MultipartConfig {
        boundary: Some("x".to_string()),
        chunk_size: 32,
        ..Default::default()
    }
}

#[test]
fn test_summarize() {
    let result = parse_bytes(BODY.as_bytes(), config()).unwrap();
    assert_eq!(
        summarize(&result),
        vec![
            "author = Jo",
            "title = Quarterly report",
            "doc: report.txt (text/plain, 7 bytes)",
            "doc: report.txt (application/octet-stream, 12 bytes)",
            "evil: ../../etc/passwd (application/octet-stream, 4 bytes)",
            "hidden: .env (application/octet-stream, 8 bytes)",
            "bin: tool.exe (application/octet-stream, 2 bytes)",
        ]
    );
}

#[test]
fn test_save_files_sanitizes_and_deduplicates() -> Result<(), FormError> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("out");
    let mut result = parse_bytes(BODY.as_bytes(), config())?;

    let report = save_files(&mut result, &out, &["*.txt".to_string(), "*.env".to_string()])?;

    let saved: Vec<_> = report
        .saved
        .iter()
        .map(|s| {
            let name = s.path.file_name().unwrap().to_string_lossy().to_string();
            (s.field_name.as_str(), name, s.renamed)
        })
        .collect();
    assert_eq!(
        saved,
        vec![
            ("doc", "report.txt".to_string(), false),
            ("doc", "report_1.txt".to_string(), true),
            ("hidden", "file.env".to_string(), false),
        ]
    );

    assert_eq!(fs::read_to_string(out.join("report.txt"))?, "numbers");
    assert_eq!(fs::read_to_string(out.join("report_1.txt"))?, "more numbers");
    assert_eq!(fs::read_to_string(out.join("file.env"))?, "SECRET=1");

    let skipped: Vec<_> = report.skipped.iter().map(|s| s.field_name.as_str()).collect();
    assert_eq!(skipped, vec!["evil", "bin"]);
    assert!(!temp_dir.path().join("etc").exists());

    // Only the saved files ended up in the directory
    assert_eq!(fs::read_dir(&out)?.count(), 3);

    Ok(())
}

#[test]
fn test_save_files_reads_from_start() -> Result<(), FormError> {
    let temp_dir = TempDir::new()?;
    let mut result = parse_bytes(BODY.as_bytes(), config())?;

    // Consume the first file before saving
    assert_eq!(result.files_mut()[0].read_to_string()?, "numbers");

    let report = save_files(&mut result, temp_dir.path(), &["report.txt".to_string()])?;
    assert_eq!(report.saved.len(), 2);
    assert_eq!(report.saved[0].size, 7);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("report.txt"))?,
        "numbers"
    );

    Ok(())
}

#[test]
fn test_save_files_rejects_bad_pattern() {
    let temp_dir = TempDir::new().unwrap();
    let mut result = parse_bytes(BODY.as_bytes(), config()).unwrap();
    assert!(matches!(
        save_files(&mut result, temp_dir.path(), &["[".to_string()]),
        Err(FormError::Glob(_))
    ));
}
