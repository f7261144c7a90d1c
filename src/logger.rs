//! Session logger: the `log` backend for the tilepaint binary.
//!
//! All output of a run goes to one file that is **truncated at each launch**,
//! so it only ever holds the most recent session.
//!
//! Default location:
//!   Windows:  `%APPDATA%\tilepaint\tilepaint.log`
//!   Linux:    `~/.local/share/tilepaint/tilepaint.log`
//!   macOS:    `~/Library/Application Support/tilepaint/tilepaint.log`
//!
//! Library code only uses the `log` macros; if the file cannot be opened the
//! records go to stderr instead.  A panic hook mirrors panic messages into
//! the same sink.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

/// Where records end up.
enum Sink {
    File { file: Mutex<File>, path: PathBuf },
    Stderr,
}

pub struct SessionLogger {
    sink: Sink,
    level: LevelFilter,
}

impl SessionLogger {
    fn write_line(&self, line: &str) {
        match &self.sink {
            Sink::File { file, .. } => {
                if let Ok(mut f) = file.lock() {
                    let _ = writeln!(f, "{line}");
                }
            }
            Sink::Stderr => eprintln!("{line}"),
        }
    }

    fn path(&self) -> Option<&Path> {
        match &self.sink {
            Sink::File { path, .. } => Some(path),
            Sink::Stderr => None,
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.write_line(&format!("[{}] [{}] {}", timestamp(), record.level(), record.args()));
        }
    }

    fn flush(&self) {
        if let Sink::File { file, .. } = &self.sink
            && let Ok(mut f) = file.lock()
        {
            let _ = f.flush();
        }
    }
}

/// Path of the active session log, if logging goes to a file.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().and_then(SessionLogger::path)
}

/// Install the session logger.  `path` overrides the default location.
///
/// * Creates (or truncates) the log file; falls back to stderr on failure.
/// * Installs a panic hook that writes the panic message to the log before
///   running the previous hook.
///
/// Later calls are ignored.
pub fn init(path: Option<&Path>, level: LevelFilter) {
    let path = path.map(Path::to_path_buf).unwrap_or_else(log_file_path);
    let logger = LOGGER.get_or_init(|| SessionLogger { sink: open_sink(&path), level });

    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    logger.write_line(&format!("=== tilepaint session started {} ===", human_timestamp()));
    if let Some(p) = logger.path() {
        logger.write_line(&format!("Log file: {}", p.display()));
    }
    logger.write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(logger) = LOGGER.get() {
            logger.write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
            logger.flush();
        }
        prev(info);
    }));
}

fn open_sink(path: &Path) -> Sink {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => Sink::File { file: Mutex::new(f), path: path.to_path_buf() },
        Err(e) => {
            eprintln!("[logger] Failed to open log file {path:?}: {e}");
            Sink::Stderr
        }
    }
}

fn log_file_path() -> PathBuf {
    data_dir().join("tilepaint").join("tilepaint.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_filtered_and_formatted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.log");
        let logger = SessionLogger { sink: open_sink(&path), level: LevelFilter::Info };
        assert_eq!(logger.path(), Some(path.as_path()));

        logger.log(&Record::builder().level(log::Level::Info).args(format_args!("kept")).build());
        logger.log(&Record::builder().level(log::Level::Debug).args(format_args!("dropped")).build());
        logger.flush();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[INFO] kept"));
        assert!(!text.contains("dropped"));
    }

    #[test]
    fn reopening_truncates_the_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        fs::write(&path, "old session\n").unwrap();
        let logger = SessionLogger { sink: open_sink(&path), level: LevelFilter::Trace };
        logger.write_line("new");
        logger.flush();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn timestamps_have_clock_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.as_bytes()[2], b':');
    }
}
