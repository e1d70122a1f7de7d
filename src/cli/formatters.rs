//! Output formatting module for CLI display
//!
//! Everything here turns engine results into terminal text or JSON. No
//! calculation happens in this module.

use carteira::config::ConfigurationWarning;
use carteira::importers::SkippedRow;
use carteira::ledger::{checked_sum, AssetType, Operation};
use carteira::portfolio::{
    Action, AllocationView, Anomaly, Consolidation, Position, Priority, RebalancingSuggestion,
};
use colored::Colorize;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

/// Serialize any report to pretty JSON
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

fn money(value: Decimal) -> String {
    format!("R$ {:.2}", value)
}

fn signed_money(value: Decimal) -> String {
    if value >= Decimal::ZERO {
        money(value).green().to_string()
    } else {
        money(value).red().to_string()
    }
}

/// Format a preview of parsed (not yet stored) operations
pub fn format_operations_preview(operations: &[Operation]) -> String {
    #[derive(Tabled)]
    struct OperationRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Type")]
        operation_type: String,
        #[tabled(rename = "Class")]
        asset_type: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Fees")]
        fees: String,
        #[tabled(rename = "Total")]
        total: String,
    }

    let rows: Vec<OperationRow> = operations
        .iter()
        .map(|op| OperationRow {
            date: op.date.format("%Y-%m-%d").to_string(),
            instrument: op.instrument_key.clone(),
            operation_type: op.operation_type.as_str().to_uppercase(),
            asset_type: op.asset_type.as_str().to_string(),
            quantity: op.quantity.normalize().to_string(),
            price: money(op.unit_price),
            fees: money(op.fees),
            total: money(op.total_value),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    table.modify(Columns::new(4..), Alignment::right());
    table.to_string()
}

/// Format rows the importer could not read
pub fn format_skipped_rows(skipped: &[SkippedRow]) -> String {
    let mut output = format!(
        "\n{} Skipped {} row(s):\n",
        "⚠".yellow().bold(),
        skipped.len()
    );
    for row in skipped {
        output.push_str(&format!("  line {}: {}\n", row.row, row.reason));
    }
    output
}

/// Format positions as a terminal table, followed by ledger anomalies
pub fn format_positions_table(positions: &[&Position], anomalies: &[Anomaly]) -> String {
    let mut output = format!("\n{} Positions\n\n", "📊".cyan().bold());

    #[derive(Tabled)]
    struct PositionRow {
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Class")]
        asset_type: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Avg Cost")]
        avg_cost: String,
        #[tabled(rename = "Invested")]
        invested: String,
        #[tabled(rename = "Lots")]
        lots: String,
    }

    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|p| PositionRow {
            instrument: p.instrument_key.clone(),
            asset_type: p.asset_type.as_str().to_string(),
            quantity: p.total_quantity.normalize().to_string(),
            avg_cost: p
                .average_cost
                .map(money)
                .unwrap_or_else(|| "N/A".to_string()),
            invested: money(p.total_invested),
            lots: p.buy_lot_count().to_string(),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    // Right-align all columns except Instrument (0) and Class (1)
    table.modify(Columns::new(2..), Alignment::right());
    output.push_str(&table.to_string());

    let invested = checked_sum(positions.iter().map(|p| p.total_invested))
        .map(money)
        .unwrap_or_else(|| "N/A".to_string());
    output.push_str(&format!("\n\n{} Summary", "━".repeat(60).bright_black()));
    output.push_str(&format!(
        "\n{:<20} {}",
        "Positions:".bold(),
        positions.len()
    ));
    output.push_str(&format!(
        "\n{:<20} {}\n",
        "Total Invested:".bold(),
        invested
    ));

    if !anomalies.is_empty() {
        output.push_str(&format_anomalies(anomalies));
    }

    output
}

/// Format ledger anomalies, grouped by instrument
pub fn format_anomalies(anomalies: &[Anomaly]) -> String {
    let mut output = format!(
        "\n{} {} ledger anomal{}:\n",
        "⚠".yellow().bold(),
        anomalies.len(),
        if anomalies.len() == 1 { "y" } else { "ies" }
    );
    for (key, group) in &anomalies.iter().chunk_by(|a| a.instrument_key().to_string()) {
        output.push_str(&format!("  {}\n", key.bold()));
        for anomaly in group {
            output.push_str(&format!("    - {}\n", anomaly));
        }
    }
    output
}

/// Format empty portfolio message
pub fn format_empty_portfolio() -> String {
    format!(
        "{} No positions found\nImport operations first using: {} import <file>\n",
        "ℹ".blue().bold(),
        "carteira".bold()
    )
}

/// Format the list of instruments with duplicate buy lots
pub fn format_duplicates(positions: &[&Position]) -> String {
    if positions.is_empty() {
        return format!("{} No duplicate lots found\n", "✓".green().bold());
    }

    #[derive(Tabled)]
    struct DuplicateRow {
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Buy Lots")]
        lots: usize,
        #[tabled(rename = "First")]
        first: String,
        #[tabled(rename = "Last")]
        last: String,
    }

    let rows: Vec<DuplicateRow> = positions
        .iter()
        .map(|p| {
            let dates = p.buy_lots().map(|op| op.date).minmax();
            let (first, last) = dates.into_option().unzip();
            DuplicateRow {
                instrument: p.instrument_key.clone(),
                lots: p.buy_lot_count(),
                first: first.map(|d| d.to_string()).unwrap_or_default(),
                last: last.map(|d| d.to_string()).unwrap_or_default(),
            }
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    format!(
        "\n{} {} instrument(s) with duplicate lots\n\n{}\n",
        "🔁".cyan().bold(),
        positions.len(),
        table
    )
}

/// Format the outcome of consolidating one instrument
pub fn format_consolidation(instrument_key: &str, outcome: &Consolidation, dry_run: bool) -> String {
    let Some(lot) = outcome.merged() else {
        return format!(
            "{} {}: nothing to consolidate\n",
            "ℹ".blue().bold(),
            instrument_key
        );
    };

    let op = &lot.operation;
    let verb = if dry_run { "Would merge" } else { "Merged" };
    let mut output = format!(
        "{} {}: {} {} lot(s) into one\n",
        "✓".green().bold(),
        instrument_key.bold(),
        verb,
        lot.lineage().map_or(0, |l| l.merged_lots)
    );
    output.push_str(&format!(
        "  {:<14} {}\n  {:<14} {}\n  {:<14} {}\n",
        "Quantity:",
        op.quantity.normalize(),
        "Avg Price:",
        money(op.unit_price),
        "Total:",
        money(op.total_value)
    ));
    if let Some(lineage) = lot.lineage() {
        output.push_str(&format!(
            "  {:<14} {} to {}\n  {:<14} {}\n",
            "Purchases:",
            lineage.first_purchase,
            lineage.last_purchase,
            "Fees carried:",
            money(lineage.fees_carried)
        ));
    }
    output
}

/// Format allocation by asset class, then per instrument
pub fn format_allocation_table(view: &AllocationView) -> String {
    let mut output = format!("\n{} Allocation by Asset Class\n\n", "📊".cyan().bold());

    #[derive(Tabled)]
    struct ClassRow {
        #[tabled(rename = "Class")]
        asset_type: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "%")]
        percent: String,
        #[tabled(rename = "Instruments")]
        instruments: usize,
    }

    let class_rows: Vec<ClassRow> = view
        .asset_classes
        .iter()
        .map(|c| ClassRow {
            asset_type: c.asset_type.as_str().to_string(),
            value: money(c.current_value),
            percent: format!("{:.2}%", c.allocation_percent),
            instruments: c.instruments,
        })
        .collect();

    let mut table = Table::new(&class_rows);
    table.with(Style::modern());
    table.modify(Columns::new(1..), Alignment::right());
    output.push_str(&table.to_string());

    #[derive(Tabled)]
    struct HoldingRow {
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Class")]
        asset_type: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "%")]
        percent: String,
    }

    let holding_rows: Vec<HoldingRow> = view
        .holdings
        .iter()
        .map(|h| HoldingRow {
            instrument: h.instrument_key.clone(),
            asset_type: h.asset_type.as_str().to_string(),
            value: money(h.current_value),
            percent: format!("{:.2}%", h.allocation_percent),
        })
        .collect();

    output.push_str(&format!("\n\n{} Holdings\n\n", "📈".cyan().bold()));
    let mut table = Table::new(&holding_rows);
    table.with(Style::modern());
    table.modify(Columns::new(2..), Alignment::right());
    output.push_str(&table.to_string());

    output.push_str(&format!(
        "\n\n{:<20} {}\n",
        "Total Value:".bold(),
        money(view.total_portfolio_value)
    ));
    output
}

fn colored_action(action: Action) -> String {
    let label = action.as_str().to_uppercase();
    match action {
        Action::Buy => label.green().bold().to_string(),
        Action::Sell => label.red().bold().to_string(),
        Action::Hold => label.bright_black().to_string(),
    }
}

fn colored_priority(priority: Priority) -> String {
    match priority {
        Priority::High => priority.as_str().red().to_string(),
        Priority::Medium => priority.as_str().yellow().to_string(),
        Priority::Low => priority.as_str().to_string(),
    }
}

/// Format rebalancing suggestions with config warnings and untargeted classes
pub fn format_rebalance_table(
    suggestions: &[RebalancingSuggestion],
    warnings: &[ConfigurationWarning],
    untargeted: &[AssetType],
    base: Decimal,
) -> String {
    let mut output = format!(
        "\n{} Rebalancing plan (base {})\n\n",
        "⚖".cyan().bold(),
        money(base)
    );

    #[derive(Tabled)]
    struct SuggestionRow {
        #[tabled(rename = "Subject")]
        subject: String,
        #[tabled(rename = "Current")]
        current: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Delta")]
        delta: String,
        #[tabled(rename = "Action")]
        action: String,
        #[tabled(rename = "Priority")]
        priority: String,
    }

    let rows: Vec<SuggestionRow> = suggestions
        .iter()
        .map(|s| SuggestionRow {
            subject: if s.subject.is_asset_class() {
                s.subject.to_string().to_uppercase()
            } else {
                format!("  {}", s.subject)
            },
            current: money(s.current_value),
            target: money(s.target_value),
            delta: signed_money(s.delta),
            action: colored_action(s.action),
            priority: colored_priority(s.priority),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(1..4), Alignment::right());
    output.push_str(&table.to_string());
    output.push('\n');

    for warning in warnings {
        output.push_str(&format!("\n{} {}", "⚠".yellow().bold(), warning));
    }
    if !untargeted.is_empty() {
        output.push_str(&format!(
            "\n{} No target set for: {}",
            "ℹ".blue().bold(),
            untargeted.iter().map(|t| t.as_str()).join(", ")
        ));
    }
    if !warnings.is_empty() || !untargeted.is_empty() {
        output.push('\n');
    }
    output
}

/// Message shown when rebalancing is requested without targets
pub fn format_no_targets(config_path: &str) -> String {
    format!(
        "{} No allocation targets configured\nAdd a [targets] table to {} or pass --targets <file>\n",
        "ℹ".blue().bold(),
        config_path
    )
}
