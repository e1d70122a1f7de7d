//! Portfolio service
//!
//! Owns a ledger store and a lazily computed snapshot of the pipeline
//! (positions, anomalies, allocation). The snapshot is recomputed only after
//! an explicit invalidation, either by the caller (`ledger_changed`) or by
//! the service's own writes.

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::info;

use crate::config::AllocationTarget;
use crate::error::Result;
use crate::ledger::{LedgerStore, Operation};
use crate::portfolio::{
    aggregate, allocate, consolidate, find_consolidatable, rebalance_with_policy, Aggregation,
    AllocationView, ConsolidatedLot, Consolidation, Position, RebalancePolicy, RebalancingSuggestion,
};

/// Point-in-time pipeline results for one ledger state
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub aggregation: Aggregation,
    pub allocation: AllocationView,
}

impl Snapshot {
    pub fn compute(operations: &[Operation]) -> Self {
        let aggregation = aggregate(operations);
        let allocation = allocate(&aggregation.positions);
        Self {
            aggregation,
            allocation,
        }
    }
}

pub struct PortfolioService<S: LedgerStore> {
    store: S,
    snapshot: Option<Snapshot>,
}

impl<S: LedgerStore> PortfolioService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            snapshot: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drop the cached snapshot; call after the ledger changed elsewhere
    pub fn ledger_changed(&mut self) {
        self.snapshot = None;
    }

    pub fn is_cached(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Record an operation and invalidate the snapshot
    pub fn record(&mut self, operation: Operation) -> Result<Operation> {
        let stored = self.store.append(operation)?;
        self.ledger_changed();
        Ok(stored)
    }

    pub fn snapshot(&mut self) -> Result<&Snapshot> {
        let snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => {
                let operations = self
                    .store
                    .operations()
                    .context("Failed to load ledger operations")?;
                Snapshot::compute(&operations)
            }
        };
        let snapshot: &Snapshot = self.snapshot.insert(snapshot);
        Ok(snapshot)
    }

    pub fn aggregation(&mut self) -> Result<&Aggregation> {
        Ok(&self.snapshot()?.aggregation)
    }

    pub fn allocation(&mut self) -> Result<&AllocationView> {
        Ok(&self.snapshot()?.allocation)
    }

    /// Position for one instrument, if it appears in the ledger
    pub fn position(&mut self, instrument_key: &str) -> Result<Option<Position>> {
        Ok(self.aggregation()?.position(instrument_key).cloned())
    }

    pub fn consolidatable(&mut self) -> Result<Vec<String>> {
        Ok(find_consolidatable(&self.aggregation()?.positions))
    }

    pub fn rebalance(
        &mut self,
        targets: &AllocationTarget,
        base_amount: Option<Decimal>,
        policy: &RebalancePolicy,
    ) -> Result<Vec<RebalancingSuggestion>> {
        let allocation = self.allocation()?;
        Ok(rebalance_with_policy(allocation, targets, base_amount, policy))
    }

    /// Record a batch, all or nothing, and invalidate the snapshot
    pub fn record_all(&mut self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        let stored = self.store.append_all(operations)?;
        self.ledger_changed();
        Ok(stored)
    }

    /// Merge the buy lots of one instrument and commit the result
    ///
    /// Reads the ledger fresh from the store and swaps exactly the lots that
    /// were merged. Operations recorded after the read survive, and a lot
    /// removed in the meantime makes the whole call fail with no change.
    pub fn consolidate(&mut self, instrument_key: &str) -> Result<Consolidation> {
        let operations = self
            .store
            .operations()
            .context("Failed to load ledger operations")?;

        let outcome = match consolidate(instrument_key, &operations) {
            Consolidation::Merged(lot) => {
                let stored = self
                    .store
                    .replace_lots(&lot.replaced_ids, lot.operation)
                    .with_context(|| format!("Failed to replace lots for {}", instrument_key))?;
                self.ledger_changed();

                info!(
                    "{}: consolidated {} lot(s) into one",
                    instrument_key,
                    stored.lineage.as_ref().map_or(0, |l| l.merged_lots)
                );
                Consolidation::Merged(ConsolidatedLot {
                    operation: stored,
                    replaced_ids: lot.replaced_ids,
                })
            }
            Consolidation::NoOp => Consolidation::NoOp,
        };

        Ok(outcome)
    }

    /// Consolidate every instrument that has more than one buy lot
    pub fn consolidate_all(&mut self) -> Result<Vec<(String, Consolidation)>> {
        let keys = self.consolidatable()?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = self.consolidate(&key)?;
            results.push((key, outcome));
        }
        Ok(results)
    }
}
