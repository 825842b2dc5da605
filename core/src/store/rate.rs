use super::{update_where, Fragment, SqliteStore};
use crate::{
    error::StoreResult,
    types::{Gender, ProductId, RateId, RateKey},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiumRate {
    pub id:               RateId,
    pub product_id:       ProductId,
    pub gender:           Gender,
    pub entry_age:        i32,
    pub insurance_period: i32,
    pub base_rate:        f64,
    pub loading_rate:     f64,
    pub valid_from:       NaiveDate,
    pub valid_to:         Option<NaiveDate>, // None = open-ended
}

impl PremiumRate {
    pub fn total_rate(&self) -> f64 {
        self.base_rate + self.loading_rate
    }

    /// True when `as_of` falls inside `[valid_from, valid_to]`.
    pub fn is_valid_on(&self, as_of: NaiveDate) -> bool {
        self.valid_from <= as_of && self.valid_to.map_or(true, |to| to >= as_of)
    }

    pub fn key(&self) -> RateKey {
        RateKey {
            product_id:       self.product_id,
            gender:           self.gender,
            entry_age:        self.entry_age,
            insurance_period: self.insurance_period,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRate {
    pub key:          RateKey,
    pub base_rate:    f64,
    pub loading_rate: f64,
    pub valid_from:   NaiveDate,
    pub valid_to:     Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePredicate {
    /// Closed windows that ended before `today` and are not yet pinned to
    /// the day before it.
    ExpiredBefore { today: NaiveDate },
    /// Windows that opened on or before `today`, are still open, and are
    /// not yet stamped with `today`.
    AwaitingActivation { today: NaiveDate },
}

impl RatePredicate {
    fn to_fragment(self) -> Fragment {
        match self {
            Self::ExpiredBefore { today } => {
                Fragment::new("valid_to IS NOT NULL AND valid_to < ? AND valid_to <> ?")
                    .bind(today)
                    .bind(today - Duration::days(1))
            }
            Self::AwaitingActivation { today } => Fragment::new(
                "valid_from <= ? AND valid_from <> ? AND (valid_to IS NULL OR valid_to >= ?)",
            )
            .bind(today)
            .bind(today)
            .bind(today),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateChange {
    CloseOn { valid_to: NaiveDate, at: NaiveDateTime },
    OpenFrom { valid_from: NaiveDate, at: NaiveDateTime },
}

impl RateChange {
    fn to_fragment(self) -> Fragment {
        match self {
            Self::CloseOn { valid_to, at } => {
                Fragment::new("valid_to = ?, updated_at = ?").bind(valid_to).bind(at)
            }
            Self::OpenFrom { valid_from, at } => {
                Fragment::new("valid_from = ?, updated_at = ?").bind(valid_from).bind(at)
            }
        }
    }
}

const RATE_COLUMNS: &str = "id, product_id, gender, entry_age, insurance_period,
    base_rate, loading_rate, valid_from, valid_to";

fn rate_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<PremiumRate> {
    Ok(PremiumRate {
        id:               row.get(0)?,
        product_id:       row.get(1)?,
        gender:           row.get(2)?,
        entry_age:        row.get(3)?,
        insurance_period: row.get(4)?,
        base_rate:        row.get(5)?,
        loading_rate:     row.get(6)?,
        valid_from:       row.get(7)?,
        valid_to:         row.get(8)?,
    })
}

pub(super) fn update(conn: &Connection, predicate: &RatePredicate, change: &RateChange) -> StoreResult<usize> {
    update_where(conn, "premium_rate", change.to_fragment(), predicate.to_fragment())
}

pub(super) fn for_key(conn: &Connection, key: &RateKey, as_of: NaiveDate) -> StoreResult<Vec<PremiumRate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RATE_COLUMNS} FROM premium_rate
         WHERE product_id = ?1 AND gender = ?2 AND entry_age = ?3 AND insurance_period = ?4
           AND valid_from <= ?5 AND (valid_to IS NULL OR valid_to >= ?5)
         ORDER BY id"
    ))?;
    let rows = stmt
        .query_map(
            params![key.product_id, key.gender, key.entry_age, key.insurance_period, as_of],
            rate_row_mapper,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(super) fn for_product(conn: &Connection, product_id: ProductId) -> StoreResult<Vec<PremiumRate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RATE_COLUMNS} FROM premium_rate
         WHERE product_id = ?1
         ORDER BY gender, entry_age, insurance_period, valid_from, id"
    ))?;
    let rows = stmt
        .query_map(params![product_id], rate_row_mapper)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl SqliteStore {
    // ── Rate seeding ───────────────────────────────────────────────

    pub fn insert_rate(&self, r: &NewRate) -> StoreResult<RateId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO premium_rate (
                product_id, gender, entry_age, insurance_period,
                base_rate, loading_rate, valid_from, valid_to
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.key.product_id,
                r.key.gender,
                r.key.entry_age,
                r.key.insurance_period,
                r.base_rate,
                r.loading_rate,
                r.valid_from,
                r.valid_to,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn rate_by_id(&self, id: RateId) -> StoreResult<Option<PremiumRate>> {
        let conn = self.conn()?;
        let rate = conn
            .query_row(
                &format!("SELECT {RATE_COLUMNS} FROM premium_rate WHERE id = ?1"),
                params![id],
                rate_row_mapper,
            )
            .optional()?;
        Ok(rate)
    }
}
