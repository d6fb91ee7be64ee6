use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
    WriteMode,
};
use std::path::{Path, PathBuf};

pub const LOG_BASENAME: &str = "tg-media-finder";

/// The log file `/logs` hands out, plus the handle that keeps the logger
/// running.
pub struct LogFile {
    path: PathBuf,
    handle: Option<LoggerHandle>,
}

impl LogFile {
    /// A log file not backed by the global logger (tests, external logs).
    pub fn at(path: PathBuf) -> Self {
        LogFile { path, handle: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Push buffered lines to disk so the file is complete before upload.
    pub fn flush(&self) {
        if let Some(handle) = &self.handle {
            handle.flush();
        }
    }
}

/// Initialize logging to a size-rotated file, duplicated to stdout.
/// `RUST_LOG` overrides the level (debug in debug builds, info otherwise).
pub fn init(log_dir: &Path) -> Result<LogFile, FlexiLoggerError> {
    let file_spec = FileSpec::default()
        .directory(log_dir)
        .basename(LOG_BASENAME)
        .suppress_timestamp();

    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };

    let handle = Logger::try_with_env_or_str(default_level)?
        .log_to_file(file_spec)
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(flexi_logger::detailed_format)
        .rotate(
            Criterion::Size(10_000_000), // 10MB
            Naming::Numbers,
            Cleanup::KeepLogFiles(3),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .start()?;

    Ok(LogFile {
        path: current_log_path(log_dir),
        handle: Some(handle),
    })
}

/// With numbered rotation the live file is always `<basename>_rCURRENT.log`.
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("{}_rCURRENT.log", LOG_BASENAME))
}
