//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Batches and the calculator go through `PolicyStore`; they never
//! execute SQL directly.
//!
//! RULE: Every write is one predicate-scoped UPDATE. Guards exclude rows
//! already in the target state, so a repeated write affects zero rows.

use crate::{
    error::{StoreError, StoreResult},
    event::BatchLogEntry,
    types::{ContractStatus, Gender, ProductId, RateKey, Relationship, RequestStatus},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, ToSql,
};
use std::sync::{Mutex, MutexGuard};

mod batch_log;
mod contract;
mod rate;
mod report;
mod request;

pub use contract::{
    ContractChange, ContractPredicate, ContractRecord, InsuredPerson, NewContract, PremiumSubject,
};
pub use rate::{NewRate, PremiumRate, RateChange, RatePredicate};
pub use report::{ContractStats, ProductMonthSummary, RequestStats};
pub use request::{DocumentRequestRecord, NewDocumentRequest, RequestPredicate};

/// The narrow persistence surface the engine depends on.
pub trait PolicyStore: Send + Sync {
    // ── Contracts ──────────────────────────────────────────────

    /// Apply `change` to every contract matching `predicate`.
    /// Returns the number of rows affected.
    fn update_contracts(
        &self,
        predicate: &ContractPredicate,
        change: &ContractChange,
    ) -> StoreResult<usize>;

    fn query_contracts(&self, predicate: &ContractPredicate) -> StoreResult<Vec<ContractRecord>>;

    /// Contracts in `statuses` joined with their principal insured person.
    fn premium_subjects(&self, statuses: &[ContractStatus]) -> StoreResult<Vec<PremiumSubject>>;

    // ── Premium rates ──────────────────────────────────────────

    fn update_rates(&self, predicate: &RatePredicate, change: &RateChange) -> StoreResult<usize>;

    /// Every row for `key` whose validity window contains `as_of`.
    /// No tie-break is applied here.
    fn rates_for_key(&self, key: &RateKey, as_of: NaiveDate) -> StoreResult<Vec<PremiumRate>>;

    fn rates_for_product(&self, product_id: ProductId) -> StoreResult<Vec<PremiumRate>>;

    // ── Document requests ──────────────────────────────────────

    fn query_requests(&self, predicate: &RequestPredicate) -> StoreResult<Vec<DocumentRequestRecord>>;

    // ── Reporting ──────────────────────────────────────────────

    fn contract_stats(&self) -> StoreResult<ContractStats>;

    fn request_stats(&self, now: NaiveDateTime) -> StoreResult<RequestStats>;

    fn monthly_contract_summary(&self, year: i32, month: u32) -> StoreResult<Vec<ProductMonthSummary>>;

    // ── Batch log ──────────────────────────────────────────────

    fn append_batch_log(&self, entry: &BatchLogEntry) -> StoreResult<()>;

    fn recent_batch_log(&self, limit: usize) -> StoreResult<Vec<BatchLogEntry>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:
}

impl SqliteStore {
    pub fn open(path: &str) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_contracts.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_premium_rates.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/003_document_requests.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/004_batch_log.sql"))?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl PolicyStore for SqliteStore {
    fn update_contracts(
        &self,
        predicate: &ContractPredicate,
        change: &ContractChange,
    ) -> StoreResult<usize> {
        contract::update(&*self.conn()?, predicate, change)
    }

    fn query_contracts(&self, predicate: &ContractPredicate) -> StoreResult<Vec<ContractRecord>> {
        contract::query(&*self.conn()?, predicate)
    }

    fn premium_subjects(&self, statuses: &[ContractStatus]) -> StoreResult<Vec<PremiumSubject>> {
        contract::premium_subjects(&*self.conn()?, statuses)
    }

    fn update_rates(&self, predicate: &RatePredicate, change: &RateChange) -> StoreResult<usize> {
        rate::update(&*self.conn()?, predicate, change)
    }

    fn rates_for_key(&self, key: &RateKey, as_of: NaiveDate) -> StoreResult<Vec<PremiumRate>> {
        rate::for_key(&*self.conn()?, key, as_of)
    }

    fn rates_for_product(&self, product_id: ProductId) -> StoreResult<Vec<PremiumRate>> {
        rate::for_product(&*self.conn()?, product_id)
    }

    fn query_requests(&self, predicate: &RequestPredicate) -> StoreResult<Vec<DocumentRequestRecord>> {
        request::query(&*self.conn()?, predicate)
    }

    fn contract_stats(&self) -> StoreResult<ContractStats> {
        report::contract_stats(&*self.conn()?)
    }

    fn request_stats(&self, now: NaiveDateTime) -> StoreResult<RequestStats> {
        report::request_stats(&*self.conn()?, now)
    }

    fn monthly_contract_summary(&self, year: i32, month: u32) -> StoreResult<Vec<ProductMonthSummary>> {
        report::monthly_contract_summary(&*self.conn()?, year, month)
    }

    fn append_batch_log(&self, entry: &BatchLogEntry) -> StoreResult<()> {
        batch_log::append(&*self.conn()?, entry)
    }

    fn recent_batch_log(&self, limit: usize) -> StoreResult<Vec<BatchLogEntry>> {
        batch_log::recent(&*self.conn()?, limit)
    }
}

// ── SQL fragments ──────────────────────────────────────────────

/// A SQL fragment with `?` placeholders and its bound values, in order.
struct Fragment {
    sql:    String,
    params: Vec<Box<dyn ToSql>>,
}

impl Fragment {
    fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    fn bind<T: ToSql + 'static>(mut self, value: T) -> Self {
        self.params.push(Box::new(value));
        self
    }

    /// `column IN (?, ?, ...)`; an empty list matches nothing.
    fn status_in<T: ToSql + Copy + 'static>(column: &str, values: &[T]) -> Self {
        if values.is_empty() {
            return Self::new("0");
        }
        let marks = vec!["?"; values.len()].join(", ");
        let mut fragment = Self::new(format!("{column} IN ({marks})"));
        for v in values {
            fragment = fragment.bind(*v);
        }
        fragment
    }
}

/// `UPDATE {table} SET {set} WHERE {filter}` as one statement.
fn update_where(conn: &Connection, table: &str, set: Fragment, filter: Fragment) -> StoreResult<usize> {
    let sql = format!("UPDATE {table} SET {} WHERE {}", set.sql, filter.sql);
    let params = set.params.iter().chain(filter.params.iter());
    let affected = conn.execute(&sql, rusqlite::params_from_iter(params))?;
    Ok(affected)
}

// ── Enum columns ───────────────────────────────────────────────

macro_rules! text_enum_column {
    ($($ty:ty),* $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("unexpected {} value '{s}'", stringify!($ty)).into(),
                    )
                })
            }
        }
    )*};
}

text_enum_column!(ContractStatus, Gender, Relationship, RequestStatus);
