use super::{update_where, Fragment, SqliteStore};
use crate::{
    error::StoreResult,
    types::{ContractId, ContractStatus, CustomerId, Gender, ProductId, Relationship},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractRecord {
    pub id:                  ContractId,
    pub contract_number:     String,
    pub product_id:          ProductId,
    pub customer_id:         CustomerId,
    pub insured_amount:      f64,
    pub monthly_premium:     f64,
    pub annual_premium:      f64,
    pub status:              ContractStatus,
    pub created_at:          NaiveDateTime,
    pub updated_at:          NaiveDateTime,
    pub last_payment_date:   Option<NaiveDate>,
    pub maturity_date:       Option<NaiveDate>,
    pub cancellation_date:   Option<NaiveDate>,
    pub cancellation_reason: Option<String>,
    pub lapse_date:          Option<NaiveDate>,
}

/// Input for a contract created by the interactive layer.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub contract_number:   String,
    pub product_id:        ProductId,
    pub customer_id:       CustomerId,
    pub insured_amount:    f64,
    pub status:            ContractStatus,
    pub created_at:        NaiveDateTime,
    pub last_payment_date: Option<NaiveDate>,
    pub maturity_date:     Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsuredPerson {
    pub contract_id:      ContractId,
    pub relationship:     Relationship,
    pub gender:           Gender,
    pub entry_age:        i32,
    pub insurance_period: i32,
}

/// A contract joined with its principal insured person; the input row of a
/// premium recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct PremiumSubject {
    pub contract_id:      ContractId,
    pub contract_number:  String,
    pub product_id:       ProductId,
    pub insured_amount:   f64,
    pub monthly_premium:  f64,
    pub gender:           Gender,
    pub entry_age:        i32,
    pub insurance_period: i32,
}

/// Guards for contract reads and writes. Each variant carries its own
/// status condition so a write can never move a row backwards.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractPredicate {
    /// UNDER_REVIEW and created strictly before `created_before`.
    ReviewExpired { created_before: NaiveDateTime },
    /// APPROVED and last paid strictly before `paid_before`.
    PaymentOverdue { paid_before: NaiveDate },
    /// APPROVED and maturing on or before `on_or_before`.
    MaturityReached { on_or_before: NaiveDate },
    StatusIn(Vec<ContractStatus>),
    /// A single contract, only while it is still in one of `statuses`.
    IdInStatus { id: ContractId, statuses: Vec<ContractStatus> },
}

impl ContractPredicate {
    fn to_fragment(&self) -> Fragment {
        match self {
            Self::ReviewExpired { created_before } => {
                Fragment::new("status = ? AND created_at < ?")
                    .bind(ContractStatus::UnderReview)
                    .bind(*created_before)
            }
            Self::PaymentOverdue { paid_before } => {
                Fragment::new("status = ? AND last_payment_date IS NOT NULL AND last_payment_date < ?")
                    .bind(ContractStatus::Approved)
                    .bind(*paid_before)
            }
            Self::MaturityReached { on_or_before } => {
                Fragment::new("status = ? AND maturity_date IS NOT NULL AND maturity_date <= ?")
                    .bind(ContractStatus::Approved)
                    .bind(*on_or_before)
            }
            Self::StatusIn(statuses) => Fragment::status_in("status", statuses),
            Self::IdInStatus { id, statuses } => {
                let inner = Fragment::status_in("status", statuses);
                let mut fragment = Fragment::new(format!("id = ? AND {}", inner.sql)).bind(*id);
                fragment.params.extend(inner.params);
                fragment
            }
        }
    }
}

/// Field assignments applied by a contract write.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractChange {
    Cancel { on: NaiveDate, reason: String, at: NaiveDateTime },
    Lapse { on: NaiveDate, at: NaiveDateTime },
    /// Completes the contract and stamps the maturity date with `on`.
    Mature { on: NaiveDate, at: NaiveDateTime },
    /// Writes the monthly premium; the annual premium is derived in SQL.
    Premium { monthly_premium: f64, at: NaiveDateTime },
}

impl ContractChange {
    fn to_fragment(&self) -> Fragment {
        match self {
            Self::Cancel { on, reason, at } => Fragment::new(
                "status = ?, cancellation_date = ?, cancellation_reason = ?, updated_at = ?",
            )
            .bind(ContractStatus::Cancelled)
            .bind(*on)
            .bind(reason.clone())
            .bind(*at),
            Self::Lapse { on, at } => Fragment::new("status = ?, lapse_date = ?, updated_at = ?")
                .bind(ContractStatus::Lapsed)
                .bind(*on)
                .bind(*at),
            Self::Mature { on, at } => Fragment::new("status = ?, maturity_date = ?, updated_at = ?")
                .bind(ContractStatus::Matured)
                .bind(*on)
                .bind(*at),
            Self::Premium { monthly_premium, at } => Fragment::new(
                "monthly_premium = ?, annual_premium = ? * 12, updated_at = ?",
            )
            .bind(*monthly_premium)
            .bind(*monthly_premium)
            .bind(*at),
        }
    }
}

const CONTRACT_COLUMNS: &str = "id, contract_number, product_id, customer_id, insured_amount,
    monthly_premium, annual_premium, status, created_at, updated_at, last_payment_date,
    maturity_date, cancellation_date, cancellation_reason, lapse_date";

fn contract_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContractRecord> {
    Ok(ContractRecord {
        id:                  row.get(0)?,
        contract_number:     row.get(1)?,
        product_id:          row.get(2)?,
        customer_id:         row.get(3)?,
        insured_amount:      row.get(4)?,
        monthly_premium:     row.get(5)?,
        annual_premium:      row.get(6)?,
        status:              row.get(7)?,
        created_at:          row.get(8)?,
        updated_at:          row.get(9)?,
        last_payment_date:   row.get(10)?,
        maturity_date:       row.get(11)?,
        cancellation_date:   row.get(12)?,
        cancellation_reason: row.get(13)?,
        lapse_date:          row.get(14)?,
    })
}

pub(super) fn update(
    conn: &Connection,
    predicate: &ContractPredicate,
    change: &ContractChange,
) -> StoreResult<usize> {
    update_where(conn, "contract", change.to_fragment(), predicate.to_fragment())
}

pub(super) fn query(conn: &Connection, predicate: &ContractPredicate) -> StoreResult<Vec<ContractRecord>> {
    let filter = predicate.to_fragment();
    let sql = format!("SELECT {CONTRACT_COLUMNS} FROM contract WHERE {} ORDER BY id", filter.sql);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(filter.params.iter()), contract_row_mapper)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(super) fn premium_subjects(
    conn: &Connection,
    statuses: &[ContractStatus],
) -> StoreResult<Vec<PremiumSubject>> {
    let filter = Fragment::status_in("c.status", statuses);
    let sql = format!(
        "SELECT c.id, c.contract_number, c.product_id, c.insured_amount, c.monthly_premium,
                p.gender, p.entry_age, p.insurance_period
         FROM contract c
         JOIN insured_person p ON p.contract_id = c.id AND p.relationship = 'PRINCIPAL'
         WHERE {}
         ORDER BY c.id",
        filter.sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(filter.params.iter()), |row| {
            Ok(PremiumSubject {
                contract_id:      row.get(0)?,
                contract_number:  row.get(1)?,
                product_id:       row.get(2)?,
                insured_amount:   row.get(3)?,
                monthly_premium:  row.get(4)?,
                gender:           row.get(5)?,
                entry_age:        row.get(6)?,
                insurance_period: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl SqliteStore {
    // ── Contract seeding ───────────────────────────────────────────

    pub fn insert_contract(&self, c: &NewContract) -> StoreResult<ContractId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO contract (
                contract_number, product_id, customer_id, insured_amount, status,
                created_at, updated_at, last_payment_date, maturity_date
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8)",
            params![
                &c.contract_number,
                c.product_id,
                c.customer_id,
                c.insured_amount,
                c.status,
                c.created_at,
                c.last_payment_date,
                c.maturity_date,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_insured_person(&self, p: &InsuredPerson) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO insured_person (contract_id, relationship, gender, entry_age, insurance_period)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![p.contract_id, p.relationship, p.gender, p.entry_age, p.insurance_period],
        )?;
        Ok(())
    }

    pub fn contract_by_id(&self, id: ContractId) -> StoreResult<Option<ContractRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {CONTRACT_COLUMNS} FROM contract WHERE id = ?1"),
                params![id],
                contract_row_mapper,
            )
            .optional()?;
        Ok(record)
    }
}
