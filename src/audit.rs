//! Operation audit trail.
//!
//! The vault reports one record per operation to every attached sink. Sinks
//! are observers: the vault never reads from them and does not depend on
//! them for correctness. Records carry no owner, document id, or plaintext.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keys::KeyIdentifier;

/// A sink that receives audit records. Implement this to forward records
/// to a file, a metrics system, or another store.
pub trait AuditSink: Send + Sync {
    /// Called once for every vault operation, successful or not.
    fn append(&self, record: &AuditRecord);
}

/// The vault operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Store,
    Retrieve,
    Delete,
    Purge,
    SetHold,
    ClearHold,
    HasHold,
}

/// How the operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    /// The call found nothing to act on: no such document, or for the
    /// boolean hold and delete calls, a `false` result.
    NotFound,
    /// Authentication failed; reported to the caller as not found.
    Denied,
    KeyNotFound,
    HoldViolation,
    StorageUnavailable,
    Failed,
}

/// One observed vault operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub operation: Operation,
    pub outcome: Outcome,
    /// Key identifier the document's storage key is derived under.
    pub key_identifier: Option<KeyIdentifier>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        operation: Operation,
        outcome: Outcome,
        key_identifier: Option<KeyIdentifier>,
    ) -> Self {
        Self {
            operation,
            outcome,
            key_identifier,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out to the attached sinks.
#[derive(Default)]
pub struct AuditLog {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn append(&self, record: AuditRecord) {
        for sink in &self.sinks {
            sink.append(&record);
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
///
/// Writes are blocking and happen inline on the task running the vault
/// operation. For high-volume deployments, forward records to a channel and
/// write them from a dedicated task instead.
pub struct FileAuditSink {
    file: Mutex<File>,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit record");
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{line}").and_then(|()| file.flush()) {
            warn!(error = %e, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut log = AuditLog::new();
        log.add_sink(Box::new(FileAuditSink::new(&path).unwrap()));
        log.append(AuditRecord::new(Operation::Store, Outcome::Ok, KeyIdentifier::new(2).ok()));
        log.append(AuditRecord::new(Operation::Retrieve, Outcome::NotFound, None));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.operation, Operation::Store);
        assert_eq!(first.key_identifier, KeyIdentifier::new(2).ok());
        assert!(lines[1].contains("\"outcome\":\"not_found\""));
    }
}
