use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser)]
#[command(name = "carteira")]
#[command(
    version,
    about = "Investment position, consolidation and rebalancing engine"
)]
#[command(
    long_about = "Aggregate a buy/sell ledger into positions, merge duplicate buy lots at weighted-average cost, inspect allocation by instrument and asset class, and get rebalancing suggestions against a target allocation."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Ledger database path (default: ~/.carteira/ledger.db)
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import operations from a ledger CSV file
    Import {
        /// Path to the CSV file
        file: PathBuf,

        /// Preview only, don't save to database
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show positions and ledger anomalies
    Positions {
        /// Include closed and oversold positions
        #[arg(long)]
        all: bool,
    },

    /// List instruments with more than one buy lot
    Duplicates,

    /// Merge the buy lots of an instrument into one weighted-average lot
    Consolidate {
        /// Instrument key (ticker or name)
        #[arg(required_unless_present = "all")]
        instrument: Option<String>,

        /// Consolidate every instrument with duplicate lots
        #[arg(long, conflicts_with = "instrument")]
        all: bool,

        /// Show the merged lot without changing the ledger
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show allocation by asset class and instrument
    Allocation,

    /// Suggest buy/sell actions to reach the target allocation
    Rebalance {
        /// Config file with [targets] (default: <config dir>/carteira/config.toml)
        #[arg(long)]
        targets: Option<PathBuf>,

        /// Plan for a contribution of this amount on top of the current value
        #[arg(long)]
        add: Option<Decimal>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rebalance_with_contribution() {
        let cli = Cli::try_parse_from(["carteira", "--json", "rebalance", "--add", "1500.50"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Rebalance { add, targets } => {
                assert_eq!(add, Some(Decimal::new(150050, 2)));
                assert!(targets.is_none());
            }
            _ => panic!("expected rebalance"),
        }
    }

    #[test]
    fn test_consolidate_requires_instrument_or_all() {
        assert!(Cli::try_parse_from(["carteira", "consolidate"]).is_err());
        assert!(Cli::try_parse_from(["carteira", "consolidate", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["carteira", "consolidate", "PETR4", "--dry-run"]).is_ok());
        assert!(Cli::try_parse_from(["carteira", "consolidate", "PETR4", "--all"]).is_err());
    }
}
