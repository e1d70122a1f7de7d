use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use carteira::config::{ConfigurationWarning, EngineConfig};
use carteira::ledger::AssetType;
use carteira::portfolio::{untargeted_classes, RebalancingSuggestion};

use crate::cli::formatters;

#[derive(Serialize)]
struct RebalanceReport<'a> {
    base: Decimal,
    suggestions: &'a [RebalancingSuggestion],
    warnings: &'a [ConfigurationWarning],
    untargeted: &'a [AssetType],
}

pub fn dispatch_rebalance(
    db: Option<&Path>,
    targets_file: Option<&Path>,
    add: Option<Decimal>,
    json: bool,
) -> Result<()> {
    if let Some(amount) = add {
        if amount < Decimal::ZERO {
            bail!("Contribution must not be negative, got {}", amount);
        }
    }

    let (config, config_path) = match targets_file {
        Some(path) => (EngineConfig::load(path)?, path.to_path_buf()),
        None => (EngineConfig::load_default()?, EngineConfig::default_path()?),
    };

    if config.targets.is_empty() {
        if json {
            let report = RebalanceReport {
                base: Decimal::ZERO,
                suggestions: &[],
                warnings: &[],
                untargeted: &[],
            };
            println!("{}", formatters::to_json(&report));
        } else {
            print!(
                "{}",
                formatters::format_no_targets(&config_path.display().to_string())
            );
        }
        return Ok(());
    }

    let warnings = config.targets.warnings();
    let mut service = super::open_service(db)?;

    let current_total = service.allocation()?.total_portfolio_value;
    if current_total.is_zero() && add.is_none() && !json {
        println!("{}", formatters::format_empty_portfolio());
        return Ok(());
    }

    let base = match add {
        Some(amount) => match current_total.checked_add(amount) {
            Some(base) => base,
            None => bail!("Contribution {} is too large to add to the portfolio", amount),
        },
        None => current_total,
    };
    info!("Rebalancing against base {} ({} target(s))", base, config.targets.len());

    let suggestions = service.rebalance(&config.targets, Some(base), &config.policy)?;
    let untargeted = untargeted_classes(service.allocation()?, &config.targets);

    if json {
        let report = RebalanceReport {
            base,
            suggestions: &suggestions,
            warnings: &warnings,
            untargeted: &untargeted,
        };
        println!("{}", formatters::to_json(&report));
        return Ok(());
    }

    print!(
        "{}",
        formatters::format_rebalance_table(&suggestions, &warnings, &untargeted, base)
    );
    Ok(())
}
