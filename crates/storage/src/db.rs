use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use inflow_core::{
    CategorizationMethod, Direction, FileKind, FinalizedTransaction, ImportId, ImportRecord,
    ImportStatus, Metadata, RawTransaction, SourceDialect,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imports (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            filename TEXT NOT NULL,
            file_kind TEXT NOT NULL,
            source_dialect TEXT,
            status TEXT NOT NULL,
            row_count INTEGER NOT NULL DEFAULT 0,
            imported_count INTEGER NOT NULL DEFAULT 0,
            error_log TEXT NOT NULL DEFAULT '[]',
            content_sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT NOT NULL,
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            description TEXT NOT NULL,
            original_description TEXT NOT NULL,
            direction TEXT NOT NULL,
            category_name TEXT NOT NULL,
            categorization_method TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            FOREIGN KEY (import_id) REFERENCES imports(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_import ON transactions(import_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_imports_status ON imports(status)")
        .execute(pool)
        .await?;

    Ok(())
}

// ── Imports ──────────────────────────────────────────────────────────────────

/// Parse outcome written back onto a pending import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub status: ImportStatus,
    pub source_dialect: Option<SourceDialect>,
    pub row_count: usize,
    pub error_log: Vec<String>,
}

type ImportRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    i64,
    i64,
    String,
    String,
    String,
    String,
);

const IMPORT_COLUMNS: &str = "id, filename, file_kind, source_dialect, status, row_count, \
     imported_count, error_log, content_sha256, created_at, updated_at";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(format!("{what}: {e}"))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt("timestamp", e))
}

fn row_to_import(r: ImportRow) -> Result<ImportRecord, StorageError> {
    Ok(ImportRecord {
        id: ImportId::parse_str(&r.0).map_err(|e| corrupt("import id", e))?,
        filename: r.1,
        file_kind: FileKind::from_str(&r.2).map_err(|e| corrupt("file kind", e))?,
        source_dialect: r
            .3
            .as_deref()
            .map(SourceDialect::from_str)
            .transpose()
            .map_err(|e| corrupt("source dialect", e))?,
        status: ImportStatus::from_str(&r.4).map_err(|e| corrupt("status", e))?,
        row_count: r.5.max(0) as usize,
        imported_count: r.6.max(0) as usize,
        error_log: serde_json::from_str(&r.7)?,
        content_sha256: r.8,
        created_at: parse_timestamp(&r.9)?,
        updated_at: parse_timestamp(&r.10)?,
    })
}

pub async fn insert_import(pool: &DbPool, record: &ImportRecord) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO imports (id, filename, file_kind, source_dialect, status, row_count, \
         imported_count, error_log, content_sha256, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(&record.filename)
    .bind(record.file_kind.to_string())
    .bind(record.source_dialect.map(|d| d.to_string()))
    .bind(record.status.as_str())
    .bind(record.row_count as i64)
    .bind(record.imported_count as i64)
    .bind(serde_json::to_string(&record.error_log)?)
    .bind(&record.content_sha256)
    .bind(timestamp(record.created_at))
    .bind(timestamp(record.updated_at))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_import(pool: &DbPool, id: ImportId) -> Result<Option<ImportRecord>, StorageError> {
    let row = sqlx::query_as::<_, ImportRow>(&format!(
        "SELECT {IMPORT_COLUMNS} FROM imports WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(row_to_import).transpose()
}

/// Newest first.
pub async fn list_imports(pool: &DbPool) -> Result<Vec<ImportRecord>, StorageError> {
    let rows = sqlx::query_as::<_, ImportRow>(&format!(
        "SELECT {IMPORT_COLUMNS} FROM imports ORDER BY created_at DESC, seq DESC"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_import).collect()
}

/// Move `id` to `to` only if its current status is one of `from`.
/// Returns whether the transition happened.
pub async fn transition_import(
    pool: &DbPool,
    id: ImportId,
    from: &[ImportStatus],
    to: ImportStatus,
) -> Result<bool, StorageError> {
    if from.is_empty() {
        return Ok(false);
    }
    let placeholders = vec!["?"; from.len()].join(", ");
    let sql = format!(
        "UPDATE imports SET status = ?, updated_at = ? WHERE id = ? AND status IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(timestamp(Utc::now()))
        .bind(id.to_string());
    for status in from {
        query = query.bind(status.as_str());
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected() == 1)
}

/// Write the parse outcome onto an import that is still pending.
pub async fn record_outcome(
    pool: &DbPool,
    id: ImportId,
    outcome: &ImportOutcome,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE imports SET status = ?, source_dialect = ?, row_count = ?, error_log = ?, \
         updated_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(outcome.status.as_str())
    .bind(outcome.source_dialect.map(|d| d.to_string()))
    .bind(outcome.row_count as i64)
    .bind(serde_json::to_string(&outcome.error_log)?)
    .bind(timestamp(Utc::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ── Transactions ─────────────────────────────────────────────────────────────

/// Persist `transactions` and mark the import confirmed, all or nothing.
/// Only an import in `processing` can be committed; returns `false` otherwise
/// and writes nothing.
pub async fn commit_import(
    pool: &DbPool,
    id: ImportId,
    transactions: &[FinalizedTransaction],
) -> Result<bool, StorageError> {
    let now = timestamp(Utc::now());
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE imports SET status = 'confirmed', imported_count = ?, updated_at = ? \
         WHERE id = ? AND status = 'processing'",
    )
    .bind(transactions.len() as i64)
    .bind(&now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    for t in transactions {
        let raw = &t.transaction;
        sqlx::query(
            "INSERT INTO transactions (import_id, date, amount, currency, description, \
             original_description, direction, category_name, categorization_method, metadata, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(raw.date.format("%Y-%m-%d").to_string())
        .bind(raw.amount.to_string())
        .bind(&raw.currency)
        .bind(&raw.description)
        .bind(&raw.original_description)
        .bind(raw.direction.to_string())
        .bind(&t.category_name)
        .bind(t.categorization_method.to_string())
        .bind(serde_json::to_string(&raw.metadata)?)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

type TransactionRow = (String, String, String, String, String, String, String, String, String);

pub async fn get_transactions_for_import(
    pool: &DbPool,
    id: ImportId,
) -> Result<Vec<FinalizedTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT date, amount, currency, description, original_description, direction, \
         category_name, categorization_method, metadata \
         FROM transactions WHERE import_id = ? ORDER BY id",
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| -> Result<FinalizedTransaction, StorageError> {
            let metadata: Metadata = serde_json::from_str(&r.8)?;
            Ok(FinalizedTransaction {
                transaction: RawTransaction {
                    date: NaiveDate::parse_from_str(&r.0, "%Y-%m-%d")
                        .map_err(|e| corrupt("date", e))?,
                    amount: Decimal::from_str(&r.1).map_err(|e| corrupt("amount", e))?,
                    currency: r.2,
                    description: r.3,
                    original_description: r.4,
                    direction: Direction::from_str(&r.5).map_err(|e| corrupt("direction", e))?,
                    metadata,
                },
                category_name: r.6,
                categorization_method: CategorizationMethod::from_str(&r.7)
                    .map_err(|e| corrupt("categorization method", e))?,
            })
        })
        .collect()
}

// ── Ledger ───────────────────────────────────────────────────────────────────

/// Durable record of import attempts and their confirmed transactions.
pub trait ImportLedger: Send + Sync {
    fn insert(&self, record: &ImportRecord) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get(
        &self,
        id: ImportId,
    ) -> impl Future<Output = Result<Option<ImportRecord>, StorageError>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<ImportRecord>, StorageError>> + Send;

    /// Compare-and-set on the status. `false` means the import was not in
    /// any of the `from` states (or does not exist).
    fn transition(
        &self,
        id: ImportId,
        from: &[ImportStatus],
        to: ImportStatus,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn record_outcome(
        &self,
        id: ImportId,
        outcome: &ImportOutcome,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn commit(
        &self,
        id: ImportId,
        transactions: &[FinalizedTransaction],
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;
}

/// [`ImportLedger`] over the SQLite pool.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl ImportLedger for SqliteLedger {
    async fn insert(&self, record: &ImportRecord) -> Result<(), StorageError> {
        insert_import(&self.pool, record).await
    }

    async fn get(&self, id: ImportId) -> Result<Option<ImportRecord>, StorageError> {
        get_import(&self.pool, id).await
    }

    async fn list(&self) -> Result<Vec<ImportRecord>, StorageError> {
        list_imports(&self.pool).await
    }

    async fn transition(
        &self,
        id: ImportId,
        from: &[ImportStatus],
        to: ImportStatus,
    ) -> Result<bool, StorageError> {
        transition_import(&self.pool, id, from, to).await
    }

    async fn record_outcome(&self, id: ImportId, outcome: &ImportOutcome) -> Result<bool, StorageError> {
        record_outcome(&self.pool, id, outcome).await
    }

    async fn commit(
        &self,
        id: ImportId,
        transactions: &[FinalizedTransaction],
    ) -> Result<bool, StorageError> {
        commit_import(&self.pool, id, transactions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inflow_core::{CategorizationResult, CategorizedTransaction, MatchedBy};

    async fn open() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("inflow.db")).await.unwrap();
        (dir, pool)
    }

    fn finalized(desc: &str, amount: &str) -> FinalizedTransaction {
        let amount = Decimal::from_str(amount).unwrap();
        let raw = RawTransaction::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            amount,
            "EUR",
            desc,
            Direction::from_amount(amount),
        )
        .with_metadata("value_date", "2025-03-03")
        .with_metadata("fee", Decimal::from_str("-0.35").unwrap());
        FinalizedTransaction::from_staged(
            CategorizedTransaction {
                transaction: raw,
                categorization: CategorizationResult::new("groceries", 0.7, MatchedBy::Keyword),
            },
            None,
        )
    }

    #[tokio::test]
    async fn import_round_trip() {
        let (_dir, pool) = open().await;
        let mut record = ImportRecord::new("estratto.csv", FileKind::Csv, "ab".repeat(32));
        record.error_log.push("Row 3: bad amount".into());
        insert_import(&pool, &record).await.unwrap();

        let back = get_import(&pool, record.id).await.unwrap().unwrap();
        assert_eq!(back.filename, "estratto.csv");
        assert_eq!(back.status, ImportStatus::Pending);
        assert_eq!(back.error_log, vec!["Row 3: bad amount".to_string()]);

        assert!(get_import(&pool, ImportId::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_dir, pool) = open().await;
        let first = ImportRecord::new("a.csv", FileKind::Csv, "00".repeat(32));
        let second = ImportRecord::new("b.csv", FileKind::Csv, "11".repeat(32));
        insert_import(&pool, &first).await.unwrap();
        insert_import(&pool, &second).await.unwrap();

        let names: Vec<_> = list_imports(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["b.csv", "a.csv"]);
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let (_dir, pool) = open().await;
        let record = ImportRecord::new("a.csv", FileKind::Csv, "00".repeat(32));
        insert_import(&pool, &record).await.unwrap();

        let outcome = ImportOutcome {
            status: ImportStatus::Preview,
            source_dialect: Some(SourceDialect::BankCsv),
            row_count: 4,
            error_log: vec![],
        };
        assert!(record_outcome(&pool, record.id, &outcome).await.unwrap());
        // Only a pending import takes an outcome.
        assert!(!record_outcome(&pool, record.id, &outcome).await.unwrap());

        assert!(transition_import(&pool, record.id, &[ImportStatus::Preview], ImportStatus::Processing)
            .await
            .unwrap());
        assert!(!transition_import(&pool, record.id, &[ImportStatus::Preview], ImportStatus::Processing)
            .await
            .unwrap());

        let back = get_import(&pool, record.id).await.unwrap().unwrap();
        assert_eq!(back.status, ImportStatus::Processing);
        assert_eq!(back.source_dialect, Some(SourceDialect::BankCsv));
        assert_eq!(back.row_count, 4);
    }

    #[tokio::test]
    async fn commit_persists_rows_and_confirms() {
        let (_dir, pool) = open().await;
        let mut record = ImportRecord::new("a.csv", FileKind::Csv, "00".repeat(32));
        record.status = ImportStatus::Processing;
        insert_import(&pool, &record).await.unwrap();

        let rows = vec![finalized("PAGAMENTO POS ESSELUNGA", "-45.80"), finalized("BAR", "-1.20")];
        assert!(commit_import(&pool, record.id, &rows).await.unwrap());

        let back = get_import(&pool, record.id).await.unwrap().unwrap();
        assert_eq!(back.status, ImportStatus::Confirmed);
        assert_eq!(back.imported_count, 2);

        let stored = get_transactions_for_import(&pool, record.id).await.unwrap();
        assert_eq!(stored, rows);
        assert_eq!(stored[0].transaction.amount.to_string(), "-45.80");
    }

    #[tokio::test]
    async fn commit_requires_processing() {
        let (_dir, pool) = open().await;
        let record = ImportRecord::new("a.csv", FileKind::Csv, "00".repeat(32));
        insert_import(&pool, &record).await.unwrap();

        assert!(!commit_import(&pool, record.id, &[finalized("BAR", "-1.20")]).await.unwrap());
        assert!(get_transactions_for_import(&pool, record.id).await.unwrap().is_empty());
        let back = get_import(&pool, record.id).await.unwrap().unwrap();
        assert_eq!(back.status, ImportStatus::Pending);
    }

    #[tokio::test]
    async fn ledger_delegates_to_pool() {
        let (_dir, pool) = open().await;
        let ledger = SqliteLedger::new(pool);
        let record = ImportRecord::new("a.csv", FileKind::Csv, "00".repeat(32));
        ledger.insert(&record).await.unwrap();
        assert!(ledger
            .transition(record.id, &[ImportStatus::Pending], ImportStatus::Cancelled)
            .await
            .unwrap());
        assert_eq!(ledger.list().await.unwrap().len(), 1);
        assert_eq!(
            ledger.get(record.id).await.unwrap().unwrap().status,
            ImportStatus::Cancelled
        );
    }
}
