//! # Journal File Sink
//!
//! A dedicated thread drains the frame journal into an append-only file.
//! Entries are written in batches with one flush per batch.
//!
//! ```text
//!   [1718900000123] SENT: {"type":"Ping","id":4,"scopePath":["Room","Quinoa"]}
//!   [1718900000187] RECEIVED: {"type":"Pong","id":4}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use verdant_networking::{JournalEntry, JournalReader};

use crate::error::{AppError, AppResult};

/// Longest a written entry stays unflushed.
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Pending journal entries before new ones are dropped.
pub const JOURNAL_CAPACITY: usize = 4_096;

/// One journal line, without the newline.
#[must_use]
pub fn format_entry(entry: &JournalEntry) -> String {
    let millis = entry
        .at
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_millis());
    format!("[{millis}] {}: {}", entry.direction, entry.raw)
}

/// Handle of the writer thread.
#[derive(Debug)]
pub struct JournalSink {
    path: PathBuf,
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<io::Result<u64>>,
}

impl JournalSink {
    /// Opens `path` for appending and starts the writer thread.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the file cannot be opened or the thread
    /// cannot start.
    pub fn spawn(path: &Path, reader: JournalReader) -> AppResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::io(path, e))?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("journal".into())
            .spawn(move || writer_loop(file, &reader, &flag))
            .map_err(|e| AppError::io(path, e))?;
        tracing::info!("journaling frames to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            shutdown,
            handle,
        })
    }

    /// Writes what is queued, stops the thread and returns the line count.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when a write failed.
    pub fn finish(self) -> AppResult<u64> {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.handle.join() {
            Ok(result) => result.map_err(|e| AppError::io(&self.path, e)),
            Err(_) => Err(AppError::io(&self.path, io::Error::other("journal writer panicked"))),
        }
    }
}

fn writer_loop(file: File, reader: &JournalReader, shutdown: &AtomicBool) -> io::Result<u64> {
    let mut writer = BufWriter::with_capacity(64 * 1024, file);
    let mut written = 0u64;

    while !shutdown.load(Ordering::Relaxed) {
        match reader.recv_timeout(FLUSH_INTERVAL) {
            Ok(first) => {
                written += write_batch(&mut writer, std::iter::once(first).chain(reader.drain()))?;
                writer.flush()?;
            }
            // Every producer is gone.
            Err(true) => break,
            Err(false) => {}
        }
    }

    written += write_batch(&mut writer, reader.drain())?;
    writer.flush()?;
    Ok(written)
}

fn write_batch(writer: &mut impl Write, batch: impl IntoIterator<Item = JournalEntry>) -> io::Result<u64> {
    let mut count = 0;
    for entry in batch {
        writeln!(writer, "{}", format_entry(&entry))?;
        count += 1;
    }
    Ok(count)
}
