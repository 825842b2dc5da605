use crate::{error::StoreResult, event::BatchLogEntry};
use rusqlite::{params, Connection};

pub(super) fn append(conn: &Connection, entry: &BatchLogEntry) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO batch_log (run_id, job, source, event_type, started_at, finished_at, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.run_id,
            entry.job,
            entry.source,
            entry.event_type,
            entry.started_at,
            entry.finished_at,
            entry.payload,
        ],
    )?;
    Ok(())
}

/// Newest first.
pub(super) fn recent(conn: &Connection, limit: usize) -> StoreResult<Vec<BatchLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, job, source, event_type, started_at, finished_at, payload
         FROM batch_log
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit as i64], |row| {
            Ok(BatchLogEntry {
                id:          Some(row.get(0)?),
                run_id:      row.get(1)?,
                job:         row.get(2)?,
                source:      row.get(3)?,
                event_type:  row.get(4)?,
                started_at:  row.get(5)?,
                finished_at: row.get(6)?,
                payload:     row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}
