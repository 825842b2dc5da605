use super::{Fragment, SqliteStore};
use crate::{
    error::StoreResult,
    types::{CustomerId, RequestId, RequestStatus},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRequestRecord {
    pub id:             RequestId,
    pub request_number: String,
    pub customer_id:    CustomerId,
    pub status:         RequestStatus,
    pub created_at:     NaiveDateTime,
    pub follow_up_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewDocumentRequest {
    pub request_number: String,
    pub customer_id:    CustomerId,
    pub status:         RequestStatus,
    pub created_at:     NaiveDateTime,
    pub follow_up_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPredicate {
    /// Still in `status` and created strictly before `created_before`.
    StaleInStatus { status: RequestStatus, created_before: NaiveDateTime },
    /// Follow-up date before `today` on a request that is not closed.
    FollowUpOverdue { today: NaiveDate },
}

impl RequestPredicate {
    fn to_fragment(self) -> Fragment {
        match self {
            Self::StaleInStatus { status, created_before } => {
                Fragment::new("status = ? AND created_at < ?").bind(status).bind(created_before)
            }
            Self::FollowUpOverdue { today } => Fragment::new(
                "follow_up_date IS NOT NULL AND follow_up_date < ? AND status NOT IN (?, ?)",
            )
            .bind(today)
            .bind(RequestStatus::Completed)
            .bind(RequestStatus::Cancelled),
        }
    }
}

pub(super) fn query(conn: &Connection, predicate: &RequestPredicate) -> StoreResult<Vec<DocumentRequestRecord>> {
    let filter = predicate.to_fragment();
    let sql = format!(
        "SELECT id, request_number, customer_id, status, created_at, follow_up_date, completed_date
         FROM document_request WHERE {} ORDER BY created_at, id",
        filter.sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(filter.params.iter()), |row| {
            Ok(DocumentRequestRecord {
                id:             row.get(0)?,
                request_number: row.get(1)?,
                customer_id:    row.get(2)?,
                status:         row.get(3)?,
                created_at:     row.get(4)?,
                follow_up_date: row.get(5)?,
                completed_date: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl SqliteStore {
    pub fn insert_document_request(&self, r: &NewDocumentRequest) -> StoreResult<RequestId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO document_request (
                request_number, customer_id, status, created_at, follow_up_date, completed_date
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &r.request_number,
                r.customer_id,
                r.status,
                r.created_at,
                r.follow_up_date,
                r.completed_date,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}
