// Import module - ledger CSV parser

pub mod ledger_csv;

use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::info;

pub use ledger_csv::{LedgerImport, SkippedRow};

/// Import ledger operations from a file (format chosen by extension)
pub fn import_file<P: AsRef<Path>>(file_path: P) -> Result<LedgerImport> {
    let path = file_path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("File has no extension"))?
        .to_lowercase();

    info!("Importing ledger file: {:?} (type: {})", path, extension);

    match extension.as_str() {
        "csv" | "txt" => ledger_csv::parse_ledger_csv(path),
        _ => Err(anyhow!(
            "Unsupported file format: {}. Supported formats: .csv, .txt",
            extension
        )),
    }
}
