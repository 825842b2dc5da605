//! Batch run events and their persisted form.
//!
//! RULE: Every job run, scheduled or manual, leaves exactly one event in
//! the batch log. The log is append-only.

use crate::job::{JobId, RunSource};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Outcome of one job run as written to the batch log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    JobSucceeded {
        job: JobId,
        source: RunSource,
        summary: String,
        detail: serde_json::Value,
    },
    JobFailed {
        job: JobId,
        source: RunSource,
        error: String,
    },
}

impl BatchEvent {
    pub fn job(&self) -> JobId {
        match self {
            Self::JobSucceeded { job, .. } | Self::JobFailed { job, .. } => *job,
        }
    }

    pub fn source(&self) -> RunSource {
        match self {
            Self::JobSucceeded { source, .. } | Self::JobFailed { source, .. } => *source,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobSucceeded { .. } => "job_succeeded",
            Self::JobFailed { .. }    => "job_failed",
        }
    }
}

/// The batch log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchLogEntry {
    pub id:          Option<i64>,
    pub run_id:      String,
    pub job:         String,
    pub source:      String,
    pub event_type:  String,
    pub started_at:  NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub payload:     String, // JSON-serialized BatchEvent
}

impl BatchLogEntry {
    pub fn from_event(
        run_id: &str,
        started_at: NaiveDateTime,
        finished_at: NaiveDateTime,
        event: &BatchEvent,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            run_id: run_id.to_string(),
            job: event.job().to_string(),
            source: event.source().to_string(),
            event_type: event.event_type().to_string(),
            started_at,
            finished_at,
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn event(&self) -> serde_json::Result<BatchEvent> {
        serde_json::from_str(&self.payload)
    }
}
