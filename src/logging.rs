// src/logging.rs
//
// Gateway logging. `tlog!` prints one date-stamped line per event to stderr
// and, once file logging is initialised, appends the same line to a fixed
// per-user log file. Restarts write a session separator into the file
// instead of rotating it, so one file holds the full history of a gateway
// that runs unattended. Runtime components tag their lines with a bracketed
// context id ("[Worker:Channel1_Device1] ...") so interleaved device output
// stays attributable.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct LogSink {
    file: File,
    path: PathBuf,
}

static LOG_SINK: Mutex<Option<LogSink>> = Mutex::new(None);

/// Open (or create) `modgate.log` in the given directory and start mirroring
/// `tlog!` output into it.
pub(crate) fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir {}: {}", log_dir.display(), e))?;

    let path = log_dir.join("modgate.log");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

    // Session separator; the file is append-only across restarts.
    let _ = writeln!(
        file,
        "---- modgate session started {} ----",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    {
        let mut sink = LOG_SINK
            .lock()
            .map_err(|_| "Log sink lock poisoned".to_string())?;
        *sink = Some(LogSink {
            file,
            path: path.clone(),
        });
    }

    emit(format!("[logging] Logging to {}", path.display()));
    Ok(())
}

/// Close out the current session in the log file and stop mirroring.
pub(crate) fn stop_file_logging() {
    if let Ok(mut sink) = LOG_SINK.lock() {
        if let Some(mut active) = sink.take() {
            let _ = writeln!(
                active.file,
                "---- modgate session stopped {} ----",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            eprintln!(
                "{} [logging] Closed {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                active.path.display()
            );
        }
    }
}

/// Write one formatted line to stderr and, when active, to the log file.
/// `tlog!` delegates here so the sink handling lives in one place.
pub(crate) fn emit(message: String) {
    let line = format!(
        "{} {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        message
    );
    eprintln!("{}", line);
    if let Ok(mut sink) = LOG_SINK.lock() {
        if let Some(active) = sink.as_mut() {
            let _ = writeln!(active.file, "{}", line);
        }
    }
}

/// Timestamped logging macro used throughout the runtime.
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::emit(format!($($arg)*))
    };
}
