//! Durable local replay queue.
//!
//! When the outcome store stays unavailable past the retry budget, outcomes
//! land here as JSONL and a background task replays them once the store
//! recovers. Appends go straight to disk so a worker crash loses nothing.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use exit1_domain::outcome::ProbeOutcome;

use crate::{StoreError, StoreResult};

pub struct DurableQueue {
    path: PathBuf,
    /// Serializes file rewrites; appends hold it too so a drain never
    /// interleaves with a half-written line.
    io: Mutex<()>,
}

impl DurableQueue {
    pub fn new(state_path: &Path) -> Self {
        Self {
            path: state_path.join("outcome_replay.jsonl"),
            io: Mutex::new(()),
        }
    }

    /// Append one outcome to the queue file.
    pub fn push(&self, outcome: &ProbeOutcome) -> StoreResult<()> {
        let line = serde_json::to_string(outcome)?;
        let _guard = self.io.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("queue dir: {e}")))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Unavailable(format!("queue open: {e}")))?;
        writeln!(file, "{line}").map_err(|e| StoreError::Unavailable(format!("queue write: {e}")))?;
        Ok(())
    }

    /// Take up to `max` queued outcomes, rewriting the file with the rest.
    /// Unparseable lines are dropped with a warning.
    pub fn drain(&self, max: usize) -> StoreResult<Vec<ProbeOutcome>> {
        let _guard = self.io.lock();
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Unavailable(format!("queue read: {e}"))),
        };

        let mut taken = Vec::new();
        let mut rest = String::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            if taken.len() < max {
                match serde_json::from_str::<ProbeOutcome>(line) {
                    Ok(o) => taken.push(o),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unparseable replay line");
                    }
                }
            } else {
                rest.push_str(line);
                rest.push('\n');
            }
        }

        fs::write(&self.path, rest)
            .map_err(|e| StoreError::Unavailable(format!("queue rewrite: {e}")))?;
        Ok(taken)
    }

    pub fn len(&self) -> usize {
        let _guard = self.io.lock();
        fs::read_to_string(&self.path)
            .map(|d| d.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
