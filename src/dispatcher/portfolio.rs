use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use carteira::ledger::LedgerStore;
use carteira::portfolio::{consolidate, Anomaly, Consolidation, Position};

use crate::cli::formatters;

pub fn dispatch_positions(db: Option<&Path>, all: bool, json: bool) -> Result<()> {
    tracing::info!("Generating positions report");

    let mut service = super::open_service(db)?;
    let aggregation = service.aggregation()?;
    let positions: Vec<&Position> = if all {
        aggregation.positions.iter().collect()
    } else {
        aggregation.current_holdings()
    };

    if json {
        #[derive(Serialize)]
        struct PositionsReport<'a> {
            positions: Vec<&'a Position>,
            anomalies: &'a [Anomaly],
        }
        let report = PositionsReport {
            positions,
            anomalies: &aggregation.anomalies,
        };
        println!("{}", formatters::to_json(&report));
        return Ok(());
    }

    if positions.is_empty() {
        println!("{}", formatters::format_empty_portfolio());
        if !aggregation.anomalies.is_empty() {
            print!("{}", formatters::format_anomalies(&aggregation.anomalies));
        }
        return Ok(());
    }

    println!(
        "{}",
        formatters::format_positions_table(&positions, &aggregation.anomalies)
    );
    Ok(())
}

pub fn dispatch_duplicates(db: Option<&Path>, json: bool) -> Result<()> {
    let mut service = super::open_service(db)?;
    let keys = service.consolidatable()?;
    let aggregation = service.aggregation()?;
    let positions: Vec<&Position> = keys
        .iter()
        .filter_map(|key| aggregation.position(key))
        .collect();

    if json {
        #[derive(Serialize)]
        struct DuplicateEntry<'a> {
            instrument_key: &'a str,
            buy_lots: usize,
        }
        let entries: Vec<DuplicateEntry> = positions
            .iter()
            .map(|p| DuplicateEntry {
                instrument_key: &p.instrument_key,
                buy_lots: p.buy_lot_count(),
            })
            .collect();
        println!("{}", formatters::to_json(&entries));
        return Ok(());
    }

    print!("{}", formatters::format_duplicates(&positions));
    Ok(())
}

pub fn dispatch_consolidate(
    db: Option<&Path>,
    instrument: Option<&str>,
    all: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let mut service = super::open_service(db)?;

    let keys: Vec<String> = match (instrument, all) {
        (_, true) => service.consolidatable()?,
        (Some(key), false) => vec![key.to_string()],
        (None, false) => bail!("Specify an instrument or use --all"),
    };

    let outcomes: Vec<(String, Consolidation)> = if dry_run {
        let operations = service.store().operations()?;
        keys.into_iter()
            .map(|key| {
                let outcome = consolidate(&key, &operations);
                (key, outcome)
            })
            .collect()
    } else {
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = service.consolidate(&key)?;
            outcomes.push((key, outcome));
        }
        outcomes
    };

    if json {
        #[derive(Serialize)]
        struct ConsolidationReport<'a> {
            instrument_key: &'a str,
            dry_run: bool,
            #[serde(flatten)]
            outcome: &'a Consolidation,
        }
        let report: Vec<ConsolidationReport> = outcomes
            .iter()
            .map(|(key, outcome)| ConsolidationReport {
                instrument_key: key,
                dry_run,
                outcome,
            })
            .collect();
        println!("{}", formatters::to_json(&report));
        return Ok(());
    }

    if outcomes.is_empty() {
        println!("{} No duplicate lots found", "✓".green().bold());
        return Ok(());
    }

    for (key, outcome) in &outcomes {
        print!("{}", formatters::format_consolidation(key, outcome, dry_run));
    }
    if dry_run {
        println!("\n{} Dry run - ledger unchanged", "ℹ".blue().bold());
    }
    Ok(())
}

pub fn dispatch_allocation(db: Option<&Path>, json: bool) -> Result<()> {
    let mut service = super::open_service(db)?;
    let view = service.allocation()?;

    if json {
        println!("{}", formatters::to_json(view));
        return Ok(());
    }

    if view.is_empty() {
        println!("{}", formatters::format_empty_portfolio());
        return Ok(());
    }

    println!("{}", formatters::format_allocation_table(view));
    Ok(())
}
