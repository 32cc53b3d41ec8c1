use log::Log;
use std::fs;
use verity_base::logging::{FileLogger, StdoutLogger, init_file_logger, init_stdout_logger};

fn record_args<'a>(args: std::fmt::Arguments<'a>, level: log::Level) -> log::Record<'a> {
    log::RecordBuilder::new()
        .level(level)
        .target("test")
        .file(Some("sampler.rs"))
        .line(Some(100))
        .args(args)
        .build()
}

#[test]
fn test_stdout_logger_logs_without_panicking() {
    let logger = StdoutLogger;
    logger.log(&record_args(format_args!("frames read: 10"), log::Level::Info));
    logger.flush();
}

#[test]
fn test_file_logger_writes_formatted_line() {
    let dir = std::env::temp_dir().join(format!("verity-log-test-{}-write", std::process::id()));
    let _ = fs::remove_dir_all(&dir);

    let logger = FileLogger::new(&dir).expect("Failed to create FileLogger");
    logger.log(&record_args(format_args!("no face in frame 3"), log::Level::Warn));
    logger.flush();

    let entries: Vec<_> = fs::read_dir(&dir).unwrap().filter_map(|e| e.ok()).collect();
    assert_eq!(entries.len(), 1);

    let content = fs::read_to_string(entries[0].path()).unwrap();
    assert!(content.contains("[WARN]"));
    assert!(content.contains("sampler.rs:100"));
    assert!(content.contains("no face in frame 3"));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_init_stdout_logger_is_idempotent() {
    init_stdout_logger();
    init_stdout_logger();
    log::info!("logger installed");
}

#[test]
fn test_init_file_logger_invalid_dir_returns_error() {
    assert!(init_file_logger("/proc/nonexistent/path").is_err());
}
