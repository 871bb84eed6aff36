//! Bridge transcripts.
//!
//! Every line exchanged with a bridge process is appended, with a UTC
//! timestamp, to `{log_dir}/{client_id}.log`. Without a log dir the handle is
//! inert and writes are dropped.

use chrono::{SecondsFormat, Utc};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

/// Shared handle to an append-only transcript file.
pub type TranscriptHandle = Arc<Mutex<Option<File>>>;

/// Open (or create) `{log_dir}/{name}.log`.
///
/// Failures are logged and yield an inert handle; transcripts never stop the
/// bridge from starting.
pub fn open_transcript(log_dir: Option<&Path>, name: &str) -> TranscriptHandle {
    let file = log_dir.and_then(|dir| {
        let path = dir.join(format!("{}.log", name));
        let opened = std::fs::create_dir_all(dir).and_then(|_| {
            OpenOptions::new().create(true).append(true).open(&path)
        });
        match opened {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("Cannot open transcript {}: {}", path.display(), e);
                None
            }
        }
    });
    Arc::new(Mutex::new(file))
}

/// Append `[timestamp] DIRECTION: data` to the transcript, if open.
pub fn log_line(handle: &TranscriptHandle, direction: &str, data: &str) {
    let mut guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(file) = guard.as_mut() {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let _ = writeln!(file, "[{}] {}: {}", ts, direction, data);
        let _ = file.flush();
    }
}
