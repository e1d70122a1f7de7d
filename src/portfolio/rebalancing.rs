//! Rebalancing suggestions
//!
//! Compares the current allocation with a target allocation and proposes
//! buy/sell/hold actions per asset class and per held instrument. Pure
//! function of its inputs; no I/O.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::allocation::AllocationView;
use crate::config::AllocationTarget;
use crate::error::ConfigError;
use crate::ledger::AssetType;

/// Suggested action for one subject
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// What a suggestion is about
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RebalancingSubject {
    AssetClass {
        asset_type: AssetType,
    },
    Instrument {
        instrument_key: String,
        asset_type: AssetType,
    },
}

impl RebalancingSubject {
    pub fn asset_type(&self) -> AssetType {
        match self {
            RebalancingSubject::AssetClass { asset_type }
            | RebalancingSubject::Instrument { asset_type, .. } => *asset_type,
        }
    }

    pub fn is_asset_class(&self) -> bool {
        matches!(self, RebalancingSubject::AssetClass { .. })
    }
}

impl fmt::Display for RebalancingSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalancingSubject::AssetClass { asset_type } => write!(f, "{}", asset_type),
            RebalancingSubject::Instrument { instrument_key, .. } => {
                write!(f, "{}", instrument_key)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RebalancingSuggestion {
    pub subject: RebalancingSubject,
    pub current_value: Decimal,
    pub target_value: Decimal,
    /// `target_value - current_value`
    pub delta: Decimal,
    pub action: Action,
    pub priority: Priority,
}

/// Thresholds, as fractions of the base amount
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RebalancePolicy {
    /// Below this |delta| the suggestion is `Hold`
    pub dead_band: Decimal,
    /// Above this |delta| the priority is `High`
    pub high_priority: Decimal,
    /// Above this |delta| the priority is `Medium`
    pub medium_priority: Decimal,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            dead_band: Decimal::new(2, 2),
            high_priority: Decimal::new(10, 2),
            medium_priority: Decimal::new(5, 2),
        }
    }
}

impl RebalancePolicy {
    /// Every threshold must be a fraction in [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("dead_band", self.dead_band),
            ("high_priority", self.high_priority),
            ("medium_priority", self.medium_priority),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigError::InvalidPolicy { name, value });
            }
        }
        Ok(())
    }

    pub fn action_for(&self, delta: Decimal, base: Decimal) -> Action {
        if delta.is_zero() || delta.abs() < self.dead_band * base.abs() {
            Action::Hold
        } else if delta > Decimal::ZERO {
            Action::Buy
        } else {
            Action::Sell
        }
    }

    pub fn priority_for(&self, delta: Decimal, base: Decimal) -> Priority {
        let magnitude = delta.abs();
        let base = base.abs();
        if magnitude > self.high_priority * base {
            Priority::High
        } else if magnitude > self.medium_priority * base {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    fn suggest(
        &self,
        subject: RebalancingSubject,
        current_value: Decimal,
        target_value: Decimal,
        base: Decimal,
    ) -> RebalancingSuggestion {
        // Only a negative cost basis far out of range can reach the bound
        let delta = target_value.saturating_sub(current_value);
        RebalancingSuggestion {
            subject,
            current_value,
            target_value,
            delta,
            action: self.action_for(delta, base),
            priority: self.priority_for(delta, base),
        }
    }
}

/// Rebalance with the default policy (2% dead-band, 10%/5% priorities)
pub fn rebalance(
    allocation: &AllocationView,
    targets: &AllocationTarget,
    base_amount: Option<Decimal>,
) -> Vec<RebalancingSuggestion> {
    rebalance_with_policy(allocation, targets, base_amount, &RebalancePolicy::default())
}

/// Compute suggestions for every targeted asset class and its held instruments
///
/// `base_amount` defaults to the current portfolio value; pass a larger
/// amount to plan a contribution. A class target is split evenly across the
/// instruments currently held in that class. Results are ordered by |delta|
/// descending; ties keep class enumeration order.
pub fn rebalance_with_policy(
    allocation: &AllocationView,
    targets: &AllocationTarget,
    base_amount: Option<Decimal>,
    policy: &RebalancePolicy,
) -> Vec<RebalancingSuggestion> {
    let base = base_amount.unwrap_or(allocation.total_portfolio_value);
    let mut suggestions = Vec::new();

    for (asset_type, percent) in targets.iter() {
        let target_value = class_target_value(percent, base);
        suggestions.push(policy.suggest(
            RebalancingSubject::AssetClass { asset_type },
            allocation.class_value(asset_type),
            target_value,
            base,
        ));
    }

    for (asset_type, percent) in targets.iter() {
        let members: Vec<_> = allocation.holdings_in(asset_type).collect();
        if members.is_empty() {
            continue;
        }

        let share = class_target_value(percent, base) / Decimal::from(members.len());
        for holding in members {
            suggestions.push(policy.suggest(
                RebalancingSubject::Instrument {
                    instrument_key: holding.instrument_key.clone(),
                    asset_type,
                },
                holding.current_value,
                share,
                base,
            ));
        }
    }

    // Stable sort keeps enumeration order between equal deltas
    suggestions.sort_by(|a, b| b.delta.abs().cmp(&a.delta.abs()));
    suggestions
}

/// Held asset classes that have no target at all
pub fn untargeted_classes(allocation: &AllocationView, targets: &AllocationTarget) -> Vec<AssetType> {
    allocation
        .asset_classes
        .iter()
        .map(|c| c.asset_type)
        .filter(|asset_type| targets.get(*asset_type).is_none())
        .collect()
}

fn class_target_value(percent: Decimal, base: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED * base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::allocation::{ClassAllocation, HoldingAllocation};
    use rust_decimal_macros::dec;

    fn holding(key: &str, asset_type: AssetType, value: Decimal) -> HoldingAllocation {
        HoldingAllocation {
            instrument_key: key.to_string(),
            asset_type,
            current_value: value,
            allocation_percent: Decimal::ZERO,
        }
    }

    fn view(holdings: Vec<HoldingAllocation>) -> AllocationView {
        let total: Decimal = holdings.iter().map(|h| h.current_value).sum();
        let mut classes: Vec<ClassAllocation> = Vec::new();
        for asset_type in AssetType::ALL {
            let members: Vec<_> = holdings.iter().filter(|h| h.asset_type == asset_type).collect();
            if members.is_empty() {
                continue;
            }
            classes.push(ClassAllocation {
                asset_type,
                current_value: members.iter().map(|h| h.current_value).sum(),
                allocation_percent: Decimal::ZERO,
                instruments: members.len(),
            });
        }
        AllocationView {
            holdings,
            asset_classes: classes,
            total_portfolio_value: total,
        }
    }

    fn targets(pairs: &[(&str, Decimal)]) -> AllocationTarget {
        AllocationTarget::from_pairs(pairs.iter().map(|(k, v)| (*k, *v))).unwrap()
    }

    fn class_suggestion(
        suggestions: &[RebalancingSuggestion],
        asset_type: AssetType,
    ) -> &RebalancingSuggestion {
        suggestions
            .iter()
            .find(|s| s.subject == RebalancingSubject::AssetClass { asset_type })
            .unwrap()
    }

    #[test]
    fn test_overweight_class_is_sold_with_high_priority() {
        let allocation = view(vec![
            holding("BOVA11", AssetType::Stock, dec!(8000)),
            holding("HGLG11", AssetType::Fii, dec!(2000)),
        ]);
        let t = targets(&[
            ("stock", dec!(60)),
            ("fii", dec!(20)),
            ("treasury", dec!(15)),
            ("crypto", dec!(5)),
        ]);

        let suggestions = rebalance(&allocation, &t, None);
        let stock = class_suggestion(&suggestions, AssetType::Stock);
        assert_eq!(stock.target_value, dec!(6000));
        assert_eq!(stock.current_value, dec!(8000));
        assert_eq!(stock.delta, dec!(-2000));
        assert_eq!(stock.action, Action::Sell);
        assert_eq!(stock.priority, Priority::High);

        let treasury = class_suggestion(&suggestions, AssetType::Treasury);
        assert_eq!(treasury.current_value, Decimal::ZERO);
        assert_eq!(treasury.delta, dec!(1500));
        assert_eq!(treasury.action, Action::Buy);
        assert_eq!(treasury.priority, Priority::High);

        let crypto = class_suggestion(&suggestions, AssetType::Crypto);
        assert_eq!(crypto.action, Action::Buy);
        assert_eq!(crypto.priority, Priority::Low);

        let fii = class_suggestion(&suggestions, AssetType::Fii);
        assert_eq!(fii.delta, Decimal::ZERO);
        assert_eq!(fii.action, Action::Hold);
    }

    #[test]
    fn test_dead_band_holds_small_deltas() {
        let allocation = view(vec![
            holding("A", AssetType::Stock, dec!(5150)),
            holding("B", AssetType::Fii, dec!(4850)),
        ]);
        let t = targets(&[("stock", dec!(50)), ("fii", dec!(50))]);

        let suggestions = rebalance(&allocation, &t, None);
        // |delta| = 150 < 2% of 10000
        assert_eq!(class_suggestion(&suggestions, AssetType::Stock).action, Action::Hold);
        assert_eq!(class_suggestion(&suggestions, AssetType::Fii).action, Action::Hold);
    }

    #[test]
    fn test_delta_at_dead_band_edge_is_acted_on() {
        let allocation = view(vec![
            holding("A", AssetType::Stock, dec!(4800)),
            holding("B", AssetType::Fii, dec!(5200)),
        ]);
        let t = targets(&[("stock", dec!(50)), ("fii", dec!(50))]);

        let suggestions = rebalance(&allocation, &t, None);
        // |delta| = 200, exactly 2% of 10000
        let stock = class_suggestion(&suggestions, AssetType::Stock);
        assert_eq!(stock.delta, dec!(200));
        assert_eq!(stock.action, Action::Buy);
        assert_eq!(stock.priority, Priority::Low);
        let fii = class_suggestion(&suggestions, AssetType::Fii);
        assert_eq!(fii.delta, dec!(-200));
        assert_eq!(fii.action, Action::Sell);
    }

    #[test]
    fn test_threshold_edges() {
        let policy = RebalancePolicy::default();
        let base = dec!(10000);

        assert_eq!(policy.action_for(dec!(199.99), base), Action::Hold);
        assert_eq!(policy.action_for(dec!(-199.99), base), Action::Hold);
        assert_eq!(policy.action_for(dec!(200), base), Action::Buy);
        assert_eq!(policy.action_for(dec!(-200), base), Action::Sell);

        // Priority bands are strict: reaching a threshold is not enough
        assert_eq!(policy.priority_for(dec!(1000), base), Priority::Medium);
        assert_eq!(policy.priority_for(dec!(1000.01), base), Priority::High);
        assert_eq!(policy.priority_for(dec!(-1000.01), base), Priority::High);
        assert_eq!(policy.priority_for(dec!(500), base), Priority::Low);
        assert_eq!(policy.priority_for(dec!(500.01), base), Priority::Medium);
    }

    #[test]
    fn test_zero_base_never_holds_a_nonzero_delta() {
        let policy = RebalancePolicy::default();
        assert_eq!(policy.action_for(Decimal::ZERO, Decimal::ZERO), Action::Hold);
        assert_eq!(policy.action_for(dec!(0.01), Decimal::ZERO), Action::Buy);
        assert_eq!(policy.priority_for(dec!(0.01), Decimal::ZERO), Priority::High);
    }

    #[test]
    fn test_out_of_range_delta_saturates() {
        let policy = RebalancePolicy::default();
        let suggestion = policy.suggest(
            RebalancingSubject::AssetClass { asset_type: AssetType::Stock },
            dec!(-50000000000000000000000000000),
            dec!(50000000000000000000000000000),
            dec!(50000000000000000000000000000),
        );
        assert_eq!(suggestion.delta, Decimal::MAX);
        assert_eq!(suggestion.action, Action::Buy);
        assert_eq!(suggestion.priority, Priority::High);
    }

    #[test]
    fn test_medium_priority_band() {
        let allocation = view(vec![
            holding("A", AssetType::Stock, dec!(4400)),
            holding("B", AssetType::Fii, dec!(5600)),
        ]);
        let t = targets(&[("stock", dec!(50)), ("fii", dec!(50))]);

        let suggestions = rebalance(&allocation, &t, None);
        let stock = class_suggestion(&suggestions, AssetType::Stock);
        assert_eq!(stock.delta, dec!(600));
        assert_eq!(stock.action, Action::Buy);
        assert_eq!(stock.priority, Priority::Medium);
    }

    #[test]
    fn test_base_amount_supports_contribution() {
        let allocation = view(vec![holding("A", AssetType::Stock, dec!(1000))]);
        let t = targets(&[("stock", dec!(100))]);

        let suggestions = rebalance(&allocation, &t, Some(dec!(3000)));
        let stock = class_suggestion(&suggestions, AssetType::Stock);
        assert_eq!(stock.target_value, dec!(3000));
        assert_eq!(stock.delta, dec!(2000));
        assert_eq!(stock.action, Action::Buy);
    }

    #[test]
    fn test_instrument_targets_split_evenly() {
        let allocation = view(vec![
            holding("PETR4", AssetType::Stock, dec!(3000)),
            holding("VALE3", AssetType::Stock, dec!(1000)),
            holding("HGLG11", AssetType::Fii, dec!(6000)),
        ]);
        let t = targets(&[("stock", dec!(40)), ("fii", dec!(60))]);

        let suggestions = rebalance(&allocation, &t, None);
        let petr = suggestions
            .iter()
            .find(|s| s.subject.to_string() == "PETR4")
            .unwrap();
        assert_eq!(petr.target_value, dec!(2000));
        assert_eq!(petr.delta, dec!(-1000));
        assert_eq!(petr.action, Action::Sell);
        assert_eq!(petr.priority, Priority::Medium);

        let vale = suggestions
            .iter()
            .find(|s| s.subject.to_string() == "VALE3")
            .unwrap();
        assert_eq!(vale.delta, dec!(1000));
        assert_eq!(vale.action, Action::Buy);
    }

    #[test]
    fn test_sorted_by_absolute_delta_with_stable_ties() {
        let allocation = view(vec![
            holding("A", AssetType::Stock, dec!(7000)),
            holding("B", AssetType::Fii, dec!(3000)),
        ]);
        let t = targets(&[("stock", dec!(50)), ("fii", dec!(50))]);

        let suggestions = rebalance(&allocation, &t, None);
        let deltas: Vec<Decimal> = suggestions.iter().map(|s| s.delta.abs()).collect();
        assert!(deltas.windows(2).all(|w| w[0] >= w[1]));

        // All four rows have |delta| = 2000; class rows first, stock before fii
        assert_eq!(
            suggestions[0].subject,
            RebalancingSubject::AssetClass { asset_type: AssetType::Stock }
        );
        assert_eq!(
            suggestions[1].subject,
            RebalancingSubject::AssetClass { asset_type: AssetType::Fii }
        );
        assert!(!suggestions[2].subject.is_asset_class());
        assert_eq!(suggestions[2].subject.asset_type(), AssetType::Stock);
    }

    #[test]
    fn test_empty_portfolio_and_targets() {
        let allocation = view(Vec::new());
        assert!(rebalance(&allocation, &AllocationTarget::default(), None).is_empty());

        let t = targets(&[("stock", dec!(100))]);
        let suggestions = rebalance(&allocation, &t, None);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].delta, Decimal::ZERO);
        assert_eq!(suggestions[0].action, Action::Hold);
    }

    #[test]
    fn test_unbalanced_targets_still_computed() {
        let allocation = view(vec![holding("A", AssetType::Stock, dec!(1000))]);
        let t = targets(&[("stock", dec!(80)), ("fii", dec!(80))]);

        let suggestions = rebalance(&allocation, &t, None);
        assert_eq!(class_suggestion(&suggestions, AssetType::Stock).target_value, dec!(800));
        assert_eq!(class_suggestion(&suggestions, AssetType::Fii).target_value, dec!(800));
    }

    #[test]
    fn test_custom_policy_thresholds() {
        let allocation = view(vec![
            holding("A", AssetType::Stock, dec!(5150)),
            holding("B", AssetType::Fii, dec!(4850)),
        ]);
        let t = targets(&[("stock", dec!(50)), ("fii", dec!(50))]);
        let policy = RebalancePolicy {
            dead_band: dec!(0.01),
            ..RebalancePolicy::default()
        };

        let suggestions = rebalance_with_policy(&allocation, &t, None, &policy);
        assert_eq!(class_suggestion(&suggestions, AssetType::Stock).action, Action::Sell);
    }

    #[test]
    fn test_policy_validation() {
        assert!(RebalancePolicy::default().validate().is_ok());
        let bad = RebalancePolicy {
            high_priority: dec!(1.5),
            ..RebalancePolicy::default()
        };
        assert_eq!(
            bad.validate(),
            Err(ConfigError::InvalidPolicy {
                name: "high_priority",
                value: dec!(1.5),
            })
        );
    }

    #[test]
    fn test_untargeted_classes() {
        let allocation = view(vec![
            holding("A", AssetType::Stock, dec!(1)),
            holding("B", AssetType::Crypto, dec!(1)),
        ]);
        let t = targets(&[("stock", dec!(100))]);
        assert_eq!(untargeted_classes(&allocation, &t), vec![AssetType::Crypto]);
    }
}
