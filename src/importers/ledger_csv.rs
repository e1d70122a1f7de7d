use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::ledger::{AssetType, Operation, OperationType};

/// A row that could not be turned into an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Line number in the file (header is line 1)
    pub row: usize,
    pub reason: String,
}

/// Operations read from a ledger CSV, plus rows that were skipped
#[derive(Debug, Default)]
pub struct LedgerImport {
    pub operations: Vec<Operation>,
    pub skipped: Vec<SkippedRow>,
}

/// Parse a ledger CSV file (comma or semicolon separated)
pub fn parse_ledger_csv<P: AsRef<Path>>(file_path: P) -> Result<LedgerImport> {
    let path = file_path.as_ref();
    info!("Parsing ledger CSV file: {:?}", path);

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CSV file {:?}", path))?;
    parse_ledger_str(&contents)
}

/// Parse ledger CSV content
pub fn parse_ledger_str(contents: &str) -> Result<LedgerImport> {
    let header_line = contents.lines().next().unwrap_or_default();
    // Semicolon files use the Brazilian number format (1.234,56)
    let decimal_comma = header_line.contains(';');
    let delimiter = if decimal_comma { b';' } else { b',' };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true) // Allow variable number of columns
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    debug!("CSV headers: {:?}", headers);

    let mapping = find_columns(&headers)?;
    debug!("Column mapping: {:?}", mapping);

    let mut import = LedgerImport::default();

    for (idx, result) in reader.records().enumerate() {
        let row_num = idx + 2;
        let parsed = result
            .context("Failed to read CSV record")
            .and_then(|record| parse_row(&record, &mapping, decimal_comma, row_num));

        match parsed {
            Ok(Some(operation)) => import.operations.push(operation),
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping row {}: {:#}", row_num, e);
                import.skipped.push(SkippedRow {
                    row: row_num,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "Parsed {} operation(s) from CSV, skipped {} row(s)",
        import.operations.len(),
        import.skipped.len()
    );
    Ok(import)
}

#[derive(Debug)]
struct ColumnMapping {
    date: usize,
    instrument: usize,
    operation_type: usize,
    asset_type: usize,
    quantity: usize,
    unit_price: usize,
    fees: Option<usize>,
    total: Option<usize>,
    notes: Option<usize>,
}

fn find_columns(headers: &csv::StringRecord) -> Result<ColumnMapping> {
    let find = |names: &[&str]| {
        headers.iter().position(|h| {
            let normalized = h.trim().to_lowercase().replace([' ', '-'], "_");
            names.contains(&normalized.as_str())
        })
    };

    Ok(ColumnMapping {
        date: find(&["date", "data", "trade_date"])
            .ok_or_else(|| anyhow!("Date column not found"))?,
        instrument: find(&["instrument", "instrument_key", "ticker", "codigo", "código", "name"])
            .ok_or_else(|| anyhow!("Instrument column not found"))?,
        operation_type: find(&["type", "operation", "operation_type", "tipo", "c/v"])
            .ok_or_else(|| anyhow!("Operation type column not found"))?,
        asset_type: find(&["asset_type", "asset_class", "class", "classe"])
            .ok_or_else(|| anyhow!("Asset type column not found"))?,
        quantity: find(&["quantity", "qty", "quantidade"])
            .ok_or_else(|| anyhow!("Quantity column not found"))?,
        unit_price: find(&["unit_price", "price", "preco", "preço"])
            .ok_or_else(|| anyhow!("Price column not found"))?,
        fees: find(&["fees", "fee", "taxas"]),
        total: find(&["total", "total_value", "valor_total"]),
        notes: find(&["notes", "note", "obs"]),
    })
}

fn parse_row(
    record: &csv::StringRecord,
    mapping: &ColumnMapping,
    decimal_comma: bool,
    row_num: usize,
) -> Result<Option<Operation>> {
    // Blank lines come through as a single empty field
    if record.iter().all(|field| field.is_empty()) {
        return Ok(None);
    }

    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .ok_or_else(|| anyhow!("Missing {} at row {}", name, row_num))
    };

    let instrument_key = field(mapping.instrument, "instrument")?.to_string();
    let date = parse_csv_date(field(mapping.date, "date")?)?;

    let type_str = field(mapping.operation_type, "operation type")?;
    let operation_type = OperationType::from_str(type_str)
        .map_err(|_| anyhow!("Unknown operation type '{}'", type_str))?;

    let asset_str = field(mapping.asset_type, "asset type")?;
    let asset_type = AssetType::from_str(asset_str)
        .map_err(|_| anyhow!("Unknown asset type '{}'", asset_str))?;

    let decimal = |s: &str| parse_csv_decimal(s, decimal_comma);
    let quantity = decimal(field(mapping.quantity, "quantity")?)?;
    let unit_price = decimal(field(mapping.unit_price, "price")?)?;

    let fees = match mapping.fees.and_then(|idx| record.get(idx)) {
        Some(s) if !s.is_empty() => decimal(s)?,
        _ => Decimal::ZERO,
    };

    let mut operation = Operation::try_new(
        instrument_key,
        operation_type,
        asset_type,
        date,
        quantity,
        unit_price,
        fees,
    )?;

    // A stored total is kept as-is so validation can flag inconsistencies
    if let Some(s) = mapping.total.and_then(|idx| record.get(idx)) {
        if !s.is_empty() {
            operation.total_value = decimal(s)?;
        }
    }

    if let Some(notes) = mapping.notes.and_then(|idx| record.get(idx)) {
        if !notes.is_empty() {
            operation.notes = Some(notes.to_string());
        }
    }

    Ok(Some(operation))
}

fn parse_csv_date(date_str: &str) -> Result<NaiveDate> {
    let date_str = date_str.trim();
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%d/%m/%Y") {
        return Ok(date);
    }

    Err(anyhow!("Could not parse date: {}", date_str))
}

/// Parse plain (`1234.56`) or Brazilian (`R$ 1.234,56`) decimals
fn parse_csv_decimal(text: &str, decimal_comma: bool) -> Result<Decimal> {
    let cleaned = text.replace("R$", "").replace(' ', "");
    let normalized = if decimal_comma {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    Decimal::from_str(&normalized).with_context(|| format!("Failed to parse decimal '{}'", text))
}
