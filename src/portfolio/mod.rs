// Portfolio module - positions, lot consolidation, allocation and rebalancing

pub mod allocation;
pub mod consolidation;
pub mod positions;
pub mod rebalancing;

pub use allocation::{allocate, AllocationView, ClassAllocation, HoldingAllocation};
pub use consolidation::{consolidate, find_consolidatable, ConsolidatedLot, Consolidation};
pub use positions::{aggregate, current_holdings, Aggregation, Anomaly, Position};
pub use rebalancing::{
    rebalance, rebalance_with_policy, untargeted_classes, Action, Priority, RebalancePolicy,
    RebalancingSubject, RebalancingSuggestion,
};
