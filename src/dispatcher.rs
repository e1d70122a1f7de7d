//! Command dispatcher that routes parsed clap commands to their handlers.
//!
//! Handlers open the ledger, run the engine through `PortfolioService`
//! and print either a table or JSON.

mod imports;
mod portfolio;
mod rebalance;

use anyhow::Result;
use std::path::Path;

use carteira::ledger::SqliteLedger;
use carteira::service::PortfolioService;

use crate::cli::{Cli, Commands};

/// Route a parsed command to its handler
pub fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        json, db, command, ..
    } = cli;
    let db = db.as_deref();

    match command {
        Commands::Import { file, dry_run } => imports::dispatch_import(&file, dry_run, db, json),
        Commands::Positions { all } => portfolio::dispatch_positions(db, all, json),
        Commands::Duplicates => portfolio::dispatch_duplicates(db, json),
        Commands::Consolidate {
            instrument,
            all,
            dry_run,
        } => portfolio::dispatch_consolidate(db, instrument.as_deref(), all, dry_run, json),
        Commands::Allocation => portfolio::dispatch_allocation(db, json),
        Commands::Rebalance { targets, add } => {
            rebalance::dispatch_rebalance(db, targets.as_deref(), add, json)
        }
    }
}

/// Open the ledger at `db` (or the default location) behind a service
pub(crate) fn open_service(db: Option<&Path>) -> Result<PortfolioService<SqliteLedger>> {
    let path = match db {
        Some(path) => path.to_path_buf(),
        None => SqliteLedger::default_path()?,
    };
    Ok(PortfolioService::new(SqliteLedger::open(&path)?))
}
