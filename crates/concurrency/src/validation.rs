//! Read-set de-duplication and commit planning
//!
//! Validation happens in two places:
//!
//! 1. Locally, before anything is sent: a transaction that observed two
//!    different versions of the same key can never be serializable.
//! 2. At each participant during prepare: every read key must still be at
//!    the observed version and not locked by another prepared transaction.
//!
//! [`plan_commit`] does step 1 and splits the remaining work into one
//! [`PrepareRequest`] per participant.

use crate::transaction::{ReadMode, ReadRecord, TransactionContext};
use dtranx_core::{Conflict, Key, NodeAddr, PrepareRequest, ReadCheck};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

/// Conflicts found while validating a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    conflicts: Vec<Conflict>,
}

impl ValidationResult {
    /// A result without conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// A result holding `conflicts`
    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        Self { conflicts }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Conflicts found
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Add a conflict
    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.conflicts.as_slice() {
            [] => write!(f, "no conflicts"),
            [only] => write!(f, "{}", only),
            [first, rest @ ..] => write!(f, "{} (+{} more)", first, rest.len()),
        }
    }
}

/// Collapse repeated reads of a key to the earliest record
///
/// Returns the surviving records in first-read order. Two records of one
/// key with different versions produce a [`Conflict::InconsistentRead`].
pub fn dedup_reads(reads: &[ReadRecord]) -> (Vec<&ReadRecord>, ValidationResult) {
    let mut first_seen: BTreeMap<&Key, usize> = BTreeMap::new();
    let mut unique: Vec<&ReadRecord> = Vec::with_capacity(reads.len());
    let mut result = ValidationResult::ok();

    for record in reads {
        match first_seen.entry(&record.key) {
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(record);
            }
            Entry::Occupied(slot) => {
                let first = unique[*slot.get()];
                let already_reported = result
                    .conflicts()
                    .iter()
                    .any(|c| matches!(c, Conflict::InconsistentRead { key, .. } if *key == record.key));
                if first.version != record.version && !already_reported {
                    result.push(Conflict::InconsistentRead {
                        key: record.key.clone(),
                        first: first.version,
                        second: record.version,
                    });
                }
            }
        }
    }
    (unique, result)
}

/// Work to send to each participant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
    requests: BTreeMap<NodeAddr, PrepareRequest>,
}

impl CommitPlan {
    /// Check if there is nothing to validate or write
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of participants
    pub fn participant_count(&self) -> usize {
        self.requests.len()
    }

    /// All participants, in address order
    pub fn participants(&self) -> Vec<NodeAddr> {
        self.requests.keys().cloned().collect()
    }

    /// Participants that keep locks or pins until they hear the decision
    pub fn locking_participants(&self) -> Vec<NodeAddr> {
        self.requests
            .iter()
            .filter(|(_, req)| req.holds_state())
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    /// Check if no participant receives writes
    pub fn is_read_only(&self) -> bool {
        self.requests.values().all(|req| !req.has_writes())
    }

    /// Per-participant requests
    pub fn requests(&self) -> impl Iterator<Item = (&NodeAddr, &PrepareRequest)> {
        self.requests.iter()
    }
}

/// Split a transaction into per-participant prepare requests
///
/// Reads are de-duplicated first; an inconsistent read set fails here
/// without contacting any node. Snapshot reads are validated only when the
/// transaction writes: a read-only snapshot transaction is consistent by
/// construction.
///
/// A transaction that writes asks every participant to pin its read keys,
/// so no other transaction can write them between validation and the
/// decision.
pub fn plan_commit<F>(ctx: &TransactionContext, locate: F) -> Result<CommitPlan, ValidationResult>
where
    F: Fn(&Key) -> NodeAddr,
{
    let (reads, local) = dedup_reads(ctx.reads());
    if !local.is_valid() {
        return Err(local);
    }

    let writes = ctx.has_writes();
    let mut requests: BTreeMap<NodeAddr, PrepareRequest> = BTreeMap::new();
    let txn_id = ctx.txn_id();

    for record in reads {
        if record.mode == ReadMode::Snapshot && !writes {
            continue;
        }
        requests
            .entry(locate(&record.key))
            .or_insert_with(|| PrepareRequest::new(txn_id))
            .reads
            .push(ReadCheck {
                key: record.key.clone(),
                version: record.version,
            });
    }
    for (key, value) in ctx.writes() {
        requests
            .entry(locate(key))
            .or_insert_with(|| PrepareRequest::new(txn_id))
            .writes
            .push((key.clone(), value.clone()));
    }

    for request in requests.values_mut() {
        request.lock_reads = writes;
    }
    Ok(CommitPlan { requests })
}
