// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, timestamped logger for raw child stdout/stderr lines.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Error)]
pub enum OutputLoggerError {
    #[error("output log io error: {0}")]
    Io(#[from] io::Error),
}

struct Inner {
    file: Option<File>,
}

/// Formats each line as `<RFC3339 timestamp> [<stream>] <text>\n` and writes
/// it, under a lock, to both stderr and an append-only file.
pub struct OutputLogger {
    inner: Mutex<Inner>,
}

impl OutputLogger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutputLoggerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }
        let file = opts.open(path)?;
        Ok(Self { inner: Mutex::new(Inner { file: Some(file) }) })
    }

    pub fn write_line(&self, timestamp: DateTime<Utc>, stream: Stream, text: &str) -> Result<(), OutputLoggerError> {
        let line = format!("{} [{}] {}\n", timestamp.to_rfc3339(), stream.as_str(), text);

        let mut guard = self.inner.lock();
        let Some(file) = guard.file.as_mut() else {
            return Ok(());
        };
        file.write_all(line.as_bytes())?;
        file.flush()?;
        io::stderr().write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn close(&self) -> Result<(), OutputLoggerError> {
        let mut guard = self.inner.lock();
        if let Some(file) = guard.file.take() {
            drop(file);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_line_formats_timestamp_stream_and_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.log");
        let logger = OutputLogger::open(&path).unwrap();
        let ts = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        logger.write_line(ts, Stream::Stdout, "go test ./...").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("2026-01-01T00:00:00+00:00 [stdout] go test ./...\n"));
    }

    #[test]
    fn close_is_idempotent_and_suppresses_further_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.log");
        let logger = OutputLogger::open(&path).unwrap();
        logger.close().unwrap();
        logger.close().unwrap();
        assert!(logger.write_line(Utc::now(), Stream::Stderr, "ignored").is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
