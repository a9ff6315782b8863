//! Log bootstrap: rotating files under the platform data dir, warnings to stderr.
//!
//! Initialization is idempotent and never panics. When it fails the app keeps
//! running without file logs.

use directories::ProjectDirs;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use once_cell::sync::OnceCell;
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "cardboard";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();

pub fn init_logging(level: &str) -> Result<(), String> {
    let level = normalize_level(level)?;
    LOGGER
        .get_or_try_init(|| -> Result<LoggerHandle, String> {
            let dir = log_dir().ok_or_else(|| "no platform data directory".to_string())?;
            std::fs::create_dir_all(&dir)
                .map_err(|err| format!("failed to create log directory `{}`: {err}", dir.display()))?;

            let handle = Logger::try_with_str(level)
                .map_err(|err| format!("invalid log level `{level}`: {err}"))?
                .log_to_file(FileSpec::default().directory(&dir).basename(LOG_FILE_BASENAME))
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .duplicate_to_stderr(Duplicate::Warn)
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
                .start()
                .map_err(|err| format!("failed to start logger: {err}"))?;

            log::info!(
                "event=app_start version={} level={} log_dir={}",
                env!("CARGO_PKG_VERSION"),
                level,
                dir.display()
            );
            Ok(handle)
        })
        .map(|_| ())
}

fn log_dir() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "cardboard")?;
    Some(dirs.data_dir().join("logs"))
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!("unsupported log level `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_level;

    #[test]
    fn levels_are_normalized() {
        assert_eq!(normalize_level(" INFO "), Ok("info"));
        assert_eq!(normalize_level("warning"), Ok("warn"));
        assert!(normalize_level("loud").is_err());
    }
}
