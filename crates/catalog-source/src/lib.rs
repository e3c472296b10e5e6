//! Read-only extraction of catalog rows from a SQLite database.
//!
//! The connection is opened with `SQLITE_OPEN_READ_ONLY`, lives only for the
//! duration of [`SqliteSource::extract`], and is dropped on every exit path.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, info};

use catalog_core::error::{Error, Result};
use catalog_core::traits::RecordSource;
use catalog_core::types::SourceRecord;

const PRODUCT_COLUMNS: &str =
    "sku, handle, title, description, vendor, price, currency, image_url, product_url, tags, search_content";

#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
    table: String,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(Error::InvalidConfig(format!("source table name '{}' is not a plain identifier", table)));
        }
        Ok(Self { path: path.into(), table })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn open(&self) -> Result<Connection> {
        if !self.path.is_file() {
            return Err(Error::SourceUnavailable(format!("{} does not exist", self.path.display())));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.path.display(), e)))?;
        // SQLite opens lazily; touch the schema so a non-database file fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.path.display(), e)))?;
        Ok(conn)
    }

    fn query_all(&self, conn: &Connection) -> Result<Vec<SourceRecord>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM \"{}\" ORDER BY rowid", self.table);
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt.query_map([], parse_product_row).map_err(query_err)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_err)?);
        }
        Ok(records)
    }
}

impl RecordSource for SqliteSource {
    fn extract(&self) -> Result<Vec<SourceRecord>> {
        let conn = self.open()?;
        debug!(path = %self.path.display(), table = %self.table, "opened source read-only");
        let records = self.query_all(&conn)?;
        drop(conn);
        check_skus(&records)?;
        info!(count = records.len(), table = %self.table, "extracted source records");
        Ok(records)
    }
}

fn parse_product_row(row: &Row<'_>) -> rusqlite::Result<SourceRecord> {
    Ok(SourceRecord {
        sku: text_column(row, 0)?,
        handle: text_column(row, 1)?,
        title: text_column(row, 2)?,
        description: text_column(row, 3)?,
        vendor: text_column(row, 4)?,
        price: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        currency: text_column(row, 6)?,
        image_url: text_column(row, 7)?,
        product_url: text_column(row, 8)?,
        tags: text_column(row, 9)?,
        search_content: text_column(row, 10)?,
    })
}

/// Reads a column as text; NULL becomes empty and numbers are rendered.
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    })
}

fn check_skus(records: &[SourceRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        if record.sku.trim().is_empty() {
            return Err(Error::SourceQueryFailed(format!("row {} has an empty sku", idx + 1)));
        }
        if !seen.insert(record.sku.as_str()) {
            return Err(Error::SourceQueryFailed(format!("duplicate sku '{}' at row {}", record.sku, idx + 1)));
        }
        if record.price < 0.0 || record.price.is_nan() {
            return Err(Error::SourceQueryFailed(format!("sku '{}' has invalid price {}", record.sku, record.price)));
        }
    }
    Ok(())
}

fn query_err(e: rusqlite::Error) -> Error { Error::SourceQueryFailed(e.to_string()) }

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
