// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, validated event journal.
//!
//! A single mutex-guarded writer multiplexes every emitted [`Event`] to
//! stdout and an append-only file so that concurrent emitters from the
//! progress monitor, heartbeat emitter, and supervisor loop never interleave
//! partial lines.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use parking_lot::Mutex;
use sprited_core::{Event, EventError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] EventError),
    #[error("journal io error: {0}")]
    Io(#[from] io::Error),
}

struct Inner {
    file: Option<File>,
}

/// Validated, line-atomic append-only event sink.
pub struct EventJournal {
    inner: Mutex<Inner>,
}

impl EventJournal {
    /// Open (create if missing) the journal file at `path`, permissions 0644,
    /// parent directory 0755.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all_0755(parent)?;
        }

        let file = open_append_0644(path)?;

        Ok(Self { inner: Mutex::new(Inner { file: Some(file) }) })
    }

    /// Validate, marshal, and append `event` to both stdout and the file
    /// under a single critical section.
    pub fn emit(&self, event: &Event) -> Result<(), JournalError> {
        let line = event.marshal()?;

        let mut guard = self.inner.lock();
        let Some(file) = guard.file.as_mut() else {
            return Ok(()); // closed; emit after close is a silent no-op
        };
        file.write_all(&line)?;
        file.flush()?;
        io::stdout().write_all(&line)?;
        Ok(())
    }

    /// Idempotent: a second close is a no-op.
    pub fn close(&self) -> Result<(), JournalError> {
        let mut guard = self.inner.lock();
        if let Some(file) = guard.file.take() {
            drop(file);
        }
        Ok(())
    }
}

fn create_dir_all_0755(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        let _ = std::fs::set_permissions(dir, perms);
    }
    Ok(())
}

fn open_append_0644(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o644);
    }
    opts.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sprited_core::event::EventBody;
    use tempfile::TempDir;

    fn dispatch_event() -> Event {
        Event {
            timestamp: Utc::now(),
            sprite_name: "sprite-1".into(),
            body: EventBody::Dispatch { task: "fix bug".into(), repo: "r".into(), branch: "b".into() },
        }
    }

    #[test]
    fn emit_appends_single_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let journal = EventJournal::open(&path).unwrap();
        journal.emit(&dispatch_event()).unwrap();
        journal.emit(&dispatch_event()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn emit_rejects_invalid_event() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let journal = EventJournal::open(&path).unwrap();
        let mut bad = dispatch_event();
        bad.sprite_name = "".into();
        assert!(matches!(journal.emit(&bad), Err(JournalError::InvalidEvent(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let journal = EventJournal::open(&path).unwrap();
        journal.close().unwrap();
        journal.close().unwrap();
    }

    #[test]
    fn emit_after_close_is_a_silent_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let journal = EventJournal::open(&path).unwrap();
        journal.close().unwrap();
        assert!(journal.emit(&dispatch_event()).is_ok());
    }
}
