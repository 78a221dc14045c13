//! Decision log
//!
//! Append-only file of [`LogRecord`]s plus an in-memory index of the
//! transactions that are not yet finished. The index is what the
//! coordinator consults to re-drive decisions after a participant was
//! unreachable, or after a restart.
//!
//! ## Replay
//!
//! Opening an existing file replays it front to back. The first record
//! that is truncated or fails its checksum ends the log: the file is cut
//! there so new records are never appended after garbage.

use crate::encoding::{decode_record, encode_record};
use crate::mode::DurabilityMode;
use crate::record::{Decision, LogRecord};
use dtranx_core::{NodeAddr, TxnId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Decision log errors
#[derive(Debug, Error)]
pub enum LogError {
    /// Reading or writing the log file failed
    #[error("decision log I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded
    #[error("decision log serialization error: {0}")]
    Serialization(String),
}

/// A transaction whose decision has not reached every participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTxn {
    /// Transaction
    pub txn_id: TxnId,
    /// Participants that must hear the decision
    pub participants: Vec<NodeAddr>,
    /// Logged decision; `None` if the coordinator stopped before deciding
    pub decision: Option<Decision>,
}

impl PendingTxn {
    /// Decision to deliver: the logged one, or abort if none was logged
    pub fn resolution(&self) -> Decision {
        self.decision.unwrap_or(Decision::Abort)
    }
}

struct LogInner {
    writer: Option<BufWriter<File>>,
    pending: BTreeMap<TxnId, PendingTxn>,
    records: u64,
}

impl LogInner {
    fn apply(&mut self, record: &LogRecord) {
        let txn_id = record.txn_id();
        match record {
            LogRecord::Begin { participants, .. } => {
                self.pending.insert(
                    txn_id,
                    PendingTxn {
                        txn_id,
                        participants: participants.clone(),
                        decision: None,
                    },
                );
            }
            LogRecord::Commit { participants, .. } | LogRecord::Abort { participants, .. } => {
                let entry = self.pending.entry(txn_id).or_insert_with(|| PendingTxn {
                    txn_id,
                    participants: Vec::new(),
                    decision: None,
                });
                entry.participants = participants.clone();
                entry.decision = record.as_decision();
            }
            LogRecord::End { .. } => {
                self.pending.remove(&txn_id);
            }
        }
    }
}

/// Coordinator decision log
///
/// # Example
///
/// ```
/// use dtranx_core::{ClientId, NodeAddr, TxnId};
/// use dtranx_durability::{Decision, DecisionLog};
///
/// let log = DecisionLog::ephemeral();
/// let txn = TxnId::new(ClientId::new(), 1);
///
/// log.begin(txn, vec![NodeAddr::from("a:1")]).unwrap();
/// assert_eq!(log.pending()[0].resolution(), Decision::Abort);
///
/// log.end(txn).unwrap();
/// assert!(log.pending().is_empty());
/// ```
pub struct DecisionLog {
    mode: DurabilityMode,
    path: Option<PathBuf>,
    inner: Mutex<LogInner>,
}

impl DecisionLog {
    /// In-memory log, nothing survives the process
    pub fn ephemeral() -> Self {
        Self {
            mode: DurabilityMode::None,
            path: None,
            inner: Mutex::new(LogInner {
                writer: None,
                pending: BTreeMap::new(),
                records: 0,
            }),
        }
    }

    /// Open (or create) the log at `path` and replay it
    ///
    /// With [`DurabilityMode::None`] the path is ignored and the log is
    /// ephemeral.
    pub fn open(path: impl AsRef<Path>, mode: DurabilityMode) -> Result<Self, LogError> {
        if !mode.requires_file() {
            return Ok(Self::ephemeral());
        }
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut inner = LogInner {
            writer: None,
            pending: BTreeMap::new(),
            records: 0,
        };
        let valid_len = replay(&mut file, &mut inner)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid = valid_len,
                discarded = file_len - valid_len,
                "decision log has a torn tail, truncating"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;
        inner.writer = Some(BufWriter::new(file));

        info!(
            path = %path.display(),
            records = inner.records,
            pending = inner.pending.len(),
            mode = %mode,
            "decision log opened"
        );
        Ok(Self {
            mode,
            path: Some(path),
            inner: Mutex::new(inner),
        })
    }

    /// Durability mode
    pub fn mode(&self) -> DurabilityMode {
        self.mode
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record that `txn_id` is about to prepare `participants`
    pub fn begin(&self, txn_id: TxnId, participants: Vec<NodeAddr>) -> Result<(), LogError> {
        self.append(LogRecord::Begin {
            txn_id,
            participants,
        })
    }

    /// Record the decision for `txn_id`
    ///
    /// Must be durable before the decision is sent to any participant.
    pub fn decide(
        &self,
        txn_id: TxnId,
        decision: Decision,
        participants: Vec<NodeAddr>,
    ) -> Result<(), LogError> {
        self.append(LogRecord::decision(txn_id, decision, participants))
    }

    /// Record that every participant acknowledged the decision
    pub fn end(&self, txn_id: TxnId) -> Result<(), LogError> {
        self.append(LogRecord::End { txn_id })
    }

    /// Unfinished transactions, in id order
    pub fn pending(&self) -> Vec<PendingTxn> {
        self.inner.lock().pending.values().cloned().collect()
    }

    /// Number of unfinished transactions
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Records appended or replayed since open
    pub fn record_count(&self) -> u64 {
        self.inner.lock().records
    }

    /// Rewrite the file so it holds only the records of pending transactions
    ///
    /// No-op for an ephemeral log.
    pub fn compact(&self) -> Result<(), LogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut inner = self.inner.lock();
        if let Some(writer) = inner.writer.as_mut() {
            writer.flush()?;
        }

        let tmp = path.with_extension("compact");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for txn in inner.pending.values() {
                let first = match txn.decision {
                    Some(decision) => {
                        LogRecord::decision(txn.txn_id, decision, txn.participants.clone())
                    }
                    None => LogRecord::Begin {
                        txn_id: txn.txn_id,
                        participants: txn.participants.clone(),
                    },
                };
                out.write_all(&encode_record(&first).map_err(LogError::Serialization)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        file.seek(SeekFrom::End(0))?;
        inner.writer = Some(BufWriter::new(file));
        inner.records = inner.pending.len() as u64;
        debug!(path = %path.display(), pending = inner.pending.len(), "decision log compacted");
        Ok(())
    }

    fn append(&self, record: LogRecord) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        if let Some(writer) = inner.writer.as_mut() {
            let bytes = encode_record(&record).map_err(LogError::Serialization)?;
            writer.write_all(&bytes)?;
            writer.flush()?;
            if self.mode.requires_fsync() {
                writer.get_ref().sync_data()?;
            }
        }
        inner.apply(&record);
        inner.records += 1;
        Ok(())
    }
}

/// Replay every valid record, return the length of the valid prefix
fn replay(file: &mut File, inner: &mut LogInner) -> Result<u64, LogError> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;

    let mut offset = 0usize;
    while offset < buf.len() {
        match decode_record(&buf[offset..]) {
            Ok((record, used)) => {
                inner.apply(&record);
                inner.records += 1;
                offset += used;
            }
            Err(failure) => {
                debug!(offset, reason = %failure, "replay stopped");
                break;
            }
        }
    }
    Ok(offset as u64)
}

impl std::fmt::Debug for DecisionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionLog")
            .field("mode", &self.mode)
            .field("path", &self.path)
            .field("pending", &self.pending_count())
            .finish()
    }
}
