use crate::{
    error::StoreResult,
    types::{ContractStatus, ProductId, RequestStatus},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractStats {
    pub total:                   i64,
    pub by_status:               BTreeMap<ContractStatus, i64>,
    pub average_monthly_premium: Option<f64>,
    pub total_insured_amount:    f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestStats {
    pub total:                   i64,
    pub by_status:               BTreeMap<RequestStatus, i64>,
    /// Requests created in the seven days before the report.
    pub opened_last_week:        i64,
    /// Mean days from creation to completion over completed requests.
    pub average_processing_days: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductMonthSummary {
    pub product_id:              ProductId,
    pub contracts:               i64,
    pub total_insured_amount:    f64,
    pub total_monthly_premium:   f64,
    pub average_monthly_premium: f64,
}

pub(super) fn contract_stats(conn: &Connection) -> StoreResult<ContractStats> {
    let mut stats = ContractStats::default();

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM contract GROUP BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, ContractStatus>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (status, n) in counts {
        stats.total += n;
        stats.by_status.insert(status, n);
    }

    let (avg, insured): (Option<f64>, Option<f64>) = conn.query_row(
        "SELECT AVG(monthly_premium), SUM(insured_amount) FROM contract",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    stats.average_monthly_premium = avg;
    stats.total_insured_amount = insured.unwrap_or(0.0);
    Ok(stats)
}

pub(super) fn request_stats(conn: &Connection, now: NaiveDateTime) -> StoreResult<RequestStats> {
    let mut stats = RequestStats::default();

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM document_request GROUP BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, RequestStatus>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (status, n) in counts {
        stats.total += n;
        stats.by_status.insert(status, n);
    }

    stats.opened_last_week = conn.query_row(
        "SELECT COUNT(*) FROM document_request WHERE created_at >= ?1",
        params![now - Duration::days(7)],
        |row| row.get(0),
    )?;
    stats.average_processing_days = conn.query_row(
        "SELECT AVG(julianday(completed_date) - julianday(date(created_at)))
         FROM document_request
         WHERE status = ?1 AND completed_date IS NOT NULL",
        params![RequestStatus::Completed],
        |row| row.get(0),
    )?;
    Ok(stats)
}

pub(super) fn monthly_contract_summary(
    conn: &Connection,
    year: i32,
    month: u32,
) -> StoreResult<Vec<ProductMonthSummary>> {
    // An invalid month yields an empty report rather than an error.
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Ok(Vec::new());
    };
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let Some(next) = next else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT product_id, COUNT(*), SUM(insured_amount), SUM(monthly_premium), AVG(monthly_premium)
         FROM contract
         WHERE created_at >= ?1 AND created_at < ?2
         GROUP BY product_id
         ORDER BY product_id",
    )?;
    let rows = stmt
        .query_map(params![first, next], |row| {
            Ok(ProductMonthSummary {
                product_id:              row.get(0)?,
                contracts:               row.get(1)?,
                total_insured_amount:    row.get(2)?,
                total_monthly_premium:   row.get(3)?,
                average_monthly_premium: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
