// Ledger module - operation models, validation and ledger stores

pub mod models;
pub mod sqlite;
pub mod validation;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{EngineError, Result};
pub use models::{checked_sum, AssetType, Lineage, Operation, OperationType, EPSILON};
pub use sqlite::SqliteLedger;

/// Source of ledger operations consumed by the engine
///
/// Every write is atomic: a reader sees the ledger either before or after
/// the whole write, never in between. Operations come back in insertion
/// order, and replacements are inserted at the end with fresh ids.
pub trait LedgerStore {
    /// All operations, in insertion order
    fn operations(&self) -> Result<Vec<Operation>>;

    /// Record a new operation, returning it with its assigned id
    fn append(&self, operation: Operation) -> Result<Operation>;

    /// Record a batch, all or nothing, returning the operations with ids
    fn append_all(&self, operations: Vec<Operation>) -> Result<Vec<Operation>>;

    /// Replace every operation recorded under `instrument_key` with `new_ops`
    fn replace_operations(&self, instrument_key: &str, new_ops: Vec<Operation>) -> Result<()>;

    /// Swap exactly the lots in `replaced_ids` for `merged`
    ///
    /// Fails without touching the ledger when `replaced_ids` is empty or any
    /// of its ids is no longer stored. Operations that are not listed stay,
    /// including any appended after the lots were read.
    fn replace_lots(&self, replaced_ids: &[i64], merged: Operation) -> Result<Operation>;
}

fn stale_lots(replaced_ids: &[i64]) -> anyhow::Error {
    EngineError::Store(format!(
        "ledger changed since lots {:?} were read, nothing replaced",
        replaced_ids
    ))
    .into()
}

#[derive(Debug, Default)]
struct LedgerState {
    operations: Vec<Operation>,
    next_id: i64,
}

impl LedgerState {
    fn assign_id(&mut self, mut operation: Operation) -> Operation {
        self.next_id += 1;
        operation.id = Some(self.next_id);
        operation
    }
}

/// In-process ledger guarded by a read/write lock
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from existing operations, assigning ids in order
    pub fn with_operations(operations: impl IntoIterator<Item = Operation>) -> Self {
        let mut state = LedgerState::default();
        for op in operations {
            let op = state.assign_id(op);
            state.operations.push(op);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|s| s.operations.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| EngineError::Store("ledger lock poisoned".to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| EngineError::Store("ledger lock poisoned".to_string()).into())
    }
}

impl LedgerStore for InMemoryLedger {
    fn operations(&self) -> Result<Vec<Operation>> {
        Ok(self.read()?.operations.clone())
    }

    fn append(&self, operation: Operation) -> Result<Operation> {
        let mut state = self.write()?;
        let operation = state.assign_id(operation);
        state.operations.push(operation.clone());
        Ok(operation)
    }

    fn append_all(&self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        let mut state = self.write()?;
        let stored: Vec<Operation> = operations
            .into_iter()
            .map(|op| state.assign_id(op))
            .collect();
        state.operations.extend(stored.iter().cloned());
        Ok(stored)
    }

    fn replace_operations(&self, instrument_key: &str, new_ops: Vec<Operation>) -> Result<()> {
        let mut state = self.write()?;

        let before = state.operations.len();
        state
            .operations
            .retain(|op| op.instrument_key != instrument_key);
        let removed = before - state.operations.len();

        let added = new_ops.len();
        for op in new_ops {
            let op = state.assign_id(op);
            state.operations.push(op);
        }

        debug!(
            "Replaced {} operation(s) for {} with {}",
            removed, instrument_key, added
        );
        Ok(())
    }

    fn replace_lots(&self, replaced_ids: &[i64], merged: Operation) -> Result<Operation> {
        let mut state = self.write()?;

        let all_present = replaced_ids
            .iter()
            .all(|id| state.operations.iter().any(|op| op.id == Some(*id)));
        if replaced_ids.is_empty() || !all_present {
            return Err(stale_lots(replaced_ids));
        }

        state
            .operations
            .retain(|op| op.id.map_or(true, |id| !replaced_ids.contains(&id)));
        let merged = state.assign_id(merged);
        state.operations.push(merged.clone());

        debug!(
            "Replaced {} lot(s) of {} with #{:?}",
            replaced_ids.len(),
            merged.instrument_key,
            merged.id
        );
        Ok(merged)
    }
}
