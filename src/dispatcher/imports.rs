use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use carteira::error::ValidationError;
use carteira::importers;
use carteira::ledger::validation::validate_operation;
use carteira::ledger::Operation;

use crate::cli::formatters;

#[derive(Serialize)]
struct RejectedOperation {
    instrument_key: String,
    date: String,
    error: ValidationError,
}

#[derive(Serialize)]
struct SkippedLine {
    row: usize,
    reason: String,
}

#[derive(Serialize)]
struct ImportSummary {
    dry_run: bool,
    parsed: usize,
    imported: usize,
    skipped_rows: Vec<SkippedLine>,
    rejected: Vec<RejectedOperation>,
}

/// Import a ledger CSV; rows failing validation never reach the store
pub fn dispatch_import(file: &Path, dry_run: bool, db: Option<&Path>, json: bool) -> Result<()> {
    info!("Importing operations from: {:?}", file);

    let import = importers::import_file(file)?;
    let parsed = import.operations.len();

    let mut valid: Vec<Operation> = Vec::with_capacity(parsed);
    let mut rejected = Vec::new();
    for op in import.operations {
        match validate_operation(&op) {
            Ok(()) => valid.push(op),
            Err(error) => {
                warn!("Rejecting {} on {}: {}", op.instrument_key, op.date, error);
                rejected.push(RejectedOperation {
                    instrument_key: op.instrument_key.clone(),
                    date: op.date.to_string(),
                    error,
                });
            }
        }
    }

    if !json {
        println!(
            "\n{} Found {} operation(s)\n",
            "✓".green().bold(),
            parsed
        );
        if !valid.is_empty() {
            println!("{}", formatters::format_operations_preview(&valid));
        }
        if !import.skipped.is_empty() {
            print!("{}", formatters::format_skipped_rows(&import.skipped));
        }
        if !rejected.is_empty() {
            println!(
                "\n{} Rejected {} invalid operation(s):",
                "⚠".yellow().bold(),
                rejected.len()
            );
            for r in &rejected {
                println!("  {} {}: {}", r.date, r.instrument_key, r.error);
            }
        }
    }

    let imported = if dry_run || valid.is_empty() {
        0
    } else {
        // One transaction: a failing row leaves the ledger as it was
        let mut service = super::open_service(db)?;
        service.record_all(valid)?.len()
    };

    if json {
        let summary = ImportSummary {
            dry_run,
            parsed,
            imported,
            skipped_rows: import
                .skipped
                .into_iter()
                .map(|s| SkippedLine {
                    row: s.row,
                    reason: s.reason,
                })
                .collect(),
            rejected,
        };
        println!("{}", formatters::to_json(&summary));
    } else if dry_run {
        println!("\n{} Dry run - nothing saved", "ℹ".blue().bold());
    } else {
        println!(
            "\n{} Imported {} operation(s)",
            "✓".green().bold(),
            imported
        );
    }

    Ok(())
}
