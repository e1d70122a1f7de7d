// SQLite ledger store - persists operations and performs atomic lot replacement

use anyhow::Context;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::models::{AssetType, Lineage, Operation, OperationType};
use super::LedgerStore;
use crate::error::{EngineError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instrument_key TEXT NOT NULL,
    operation_type TEXT NOT NULL CHECK (operation_type IN ('buy', 'sell')),
    asset_type TEXT NOT NULL,
    trade_date DATE NOT NULL,
    quantity TEXT NOT NULL CHECK (CAST(quantity AS REAL) > 0),
    unit_price TEXT NOT NULL CHECK (CAST(unit_price AS REAL) > 0),
    fees TEXT NOT NULL DEFAULT '0',
    total_value TEXT NOT NULL,
    notes TEXT,
    first_purchase DATE,
    last_purchase DATE,
    merged_lots INTEGER,
    fees_carried TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_operations_instrument ON operations(instrument_key);
";

const SELECT_COLUMNS: &str = "id, instrument_key, operation_type, asset_type, trade_date,
    quantity, unit_price, fees, total_value, notes,
    first_purchase, last_purchase, merged_lots, fees_carried";

/// Ledger store backed by a SQLite database
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Get the default database path (~/.carteira/ledger.db)
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        let dir = PathBuf::from(home).join(".carteira");

        std::fs::create_dir_all(&dir).context("Failed to create .carteira directory")?;

        Ok(dir.join("ledger.db"))
    }

    /// Open (and initialize if needed) the ledger database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).with_context(|| format!("Failed to open ledger at {:?}", path))?;
        info!("Opened ledger database at: {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to execute ledger schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored operations
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Store("ledger connection lock poisoned".to_string()).into())
    }
}

impl LedgerStore for SqliteLedger {
    fn operations(&self) -> Result<Vec<Operation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM operations ORDER BY id ASC",
            SELECT_COLUMNS
        ))?;

        let operations = stmt
            .query_map([], read_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read ledger operations")?;

        Ok(operations)
    }

    fn append(&self, operation: Operation) -> Result<Operation> {
        let conn = self.lock()?;
        let id = insert_operation(&conn, &operation)?;
        Ok(operation.with_id(id))
    }

    fn append_all(&self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to start transaction")?;

        let mut stored = Vec::with_capacity(operations.len());
        for (index, op) in operations.into_iter().enumerate() {
            let id = insert_operation(&tx, &op).with_context(|| {
                format!(
                    "Failed to insert operation #{} ({}), nothing imported",
                    index + 1,
                    op.instrument_key
                )
            })?;
            stored.push(op.with_id(id));
        }

        tx.commit().context("Failed to commit batch")?;
        debug!("Appended {} operation(s) in one transaction", stored.len());
        Ok(stored)
    }

    fn replace_operations(&self, instrument_key: &str, new_ops: Vec<Operation>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to start transaction")?;

        let removed = tx.execute(
            "DELETE FROM operations WHERE instrument_key = ?1",
            params![instrument_key],
        )?;

        for op in &new_ops {
            insert_operation(&tx, op).with_context(|| {
                format!("Failed to insert replacement operation for {}", instrument_key)
            })?;
        }

        // Dropping the transaction without commit rolls everything back
        tx.commit().context("Failed to commit replacement")?;

        debug!(
            "Replaced {} stored operation(s) for {} with {}",
            removed,
            instrument_key,
            new_ops.len()
        );
        Ok(())
    }

    fn replace_lots(&self, replaced_ids: &[i64], merged: Operation) -> Result<Operation> {
        if replaced_ids.is_empty() {
            return Err(super::stale_lots(replaced_ids));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to start transaction")?;

        for id in replaced_ids {
            let removed = tx.execute("DELETE FROM operations WHERE id = ?1", params![id])?;
            if removed != 1 {
                // Dropping the transaction restores the lots already deleted
                return Err(super::stale_lots(replaced_ids));
            }
        }

        let id = insert_operation(&tx, &merged).with_context(|| {
            format!("Failed to insert merged lot for {}", merged.instrument_key)
        })?;
        tx.commit().context("Failed to commit lot replacement")?;

        debug!(
            "Replaced {} stored lot(s) of {} with #{}",
            replaced_ids.len(),
            merged.instrument_key,
            id
        );
        Ok(merged.with_id(id))
    }
}

/// Insert operation, returning the new row id
fn insert_operation(conn: &Connection, op: &Operation) -> Result<i64> {
    let lineage = op.lineage.as_ref();
    conn.execute(
        "INSERT INTO operations (
            instrument_key, operation_type, asset_type, trade_date,
            quantity, unit_price, fees, total_value, notes,
            first_purchase, last_purchase, merged_lots, fees_carried
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            op.instrument_key,
            op.operation_type.as_str(),
            op.asset_type.as_str(),
            op.date,
            op.quantity.to_string(),
            op.unit_price.to_string(),
            op.fees.to_string(),
            op.total_value.to_string(),
            op.notes,
            lineage.map(|l| l.first_purchase),
            lineage.map(|l| l.last_purchase),
            lineage.map(|l| l.merged_lots as i64),
            lineage.map(|l| l.fees_carried.to_string()),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn read_operation(row: &Row) -> rusqlite::Result<Operation> {
    let operation_type: String = row.get(2)?;
    let asset_type: String = row.get(3)?;

    let first_purchase: Option<chrono::NaiveDate> = row.get(10)?;
    let last_purchase: Option<chrono::NaiveDate> = row.get(11)?;
    let merged_lots: Option<i64> = row.get(12)?;
    let fees_carried: Option<String> = row.get(13)?;

    let lineage = match (first_purchase, last_purchase, merged_lots) {
        (Some(first_purchase), Some(last_purchase), Some(merged_lots)) => Some(Lineage {
            first_purchase,
            last_purchase,
            merged_lots: merged_lots as usize,
            fees_carried: match fees_carried {
                Some(s) => parse_decimal_column(&s, 13)?,
                None => Decimal::ZERO,
            },
        }),
        _ => None,
    };

    Ok(Operation {
        id: Some(row.get(0)?),
        instrument_key: row.get(1)?,
        operation_type: OperationType::from_str(&operation_type)
            .map_err(|_| conversion_error(2, format!("unknown operation type '{}'", operation_type)))?,
        asset_type: AssetType::from_str(&asset_type)
            .map_err(|_| conversion_error(3, format!("unknown asset type '{}'", asset_type)))?,
        date: row.get(4)?,
        quantity: get_decimal_value(row, 5)?,
        unit_price: get_decimal_value(row, 6)?,
        fees: get_decimal_value(row, 7)?,
        total_value: get_decimal_value(row, 8)?,
        notes: row.get(9)?,
        lineage,
    })
}

/// Helper to read Decimal from SQLite (handles both INTEGER and TEXT)
fn get_decimal_value(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    if let Ok(s) = row.get::<_, String>(idx) {
        return parse_decimal_column(&s, idx);
    }

    // SQLite type affinity may hand back integers
    if let Ok(i) = row.get::<_, i64>(idx) {
        return Ok(Decimal::from(i));
    }

    Err(rusqlite::Error::InvalidColumnType(
        idx,
        "decimal".to_string(),
        rusqlite::types::Type::Null,
    ))
}

fn parse_decimal_column(s: &str, idx: usize) -> rusqlite::Result<Decimal> {
    Decimal::from_str(s).map_err(|e| conversion_error(idx, e.to_string()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(EngineError::Parse(message)),
    )
}
