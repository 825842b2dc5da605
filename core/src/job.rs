//! The closed set of batch jobs and the timelines they run on.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::trigger::Trigger;

/// Every job the engine knows about. Variants are added, never renamed:
/// the snake_case name is persisted in the batch log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobId {
    /// Review timeout, payment lapse and maturity transitions.
    ContractStatus,
    /// Read-only delinquency scan.
    PaymentCheck,
    /// Rate window maintenance and premium recomputation.
    PremiumUpdate,
    /// Read-only document request staleness scan.
    RequestStatusCheck,
    WeeklyReport,
    MonthlyReport,
}

impl JobId {
    /// Registration order. `run_all` also follows it.
    pub const ALL: [JobId; 6] = [
        JobId::PremiumUpdate,
        JobId::RequestStatusCheck,
        JobId::ContractStatus,
        JobId::PaymentCheck,
        JobId::WeeklyReport,
        JobId::MonthlyReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ContractStatus     => "contract_status",
            Self::PaymentCheck       => "payment_check",
            Self::PremiumUpdate      => "premium_update",
            Self::RequestStatusCheck => "request_status_check",
            Self::WeeklyReport       => "weekly_report",
            Self::MonthlyReport      => "monthly_report",
        }
    }

    pub fn timeline(&self) -> Timeline {
        match self {
            Self::ContractStatus | Self::PaymentCheck => Timeline::Lifecycle,
            Self::PremiumUpdate | Self::RequestStatusCheck => Timeline::PremiumMaintenance,
            Self::WeeklyReport | Self::MonthlyReport => Timeline::Reporting,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobId::ALL
            .into_iter()
            .find(|job| job.name() == s)
            .ok_or_else(|| format!("unknown job '{s}'"))
    }
}

/// A single-worker execution lane. Runs on the same timeline never overlap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    Lifecycle,
    PremiumMaintenance,
    Reporting,
}

impl Timeline {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lifecycle          => "lifecycle",
            Self::PremiumMaintenance => "premium_maintenance",
            Self::Reporting          => "reporting",
        }
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who asked for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    Scheduled,
    Manual,
}

impl fmt::Display for RunSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scheduled => "scheduled",
            Self::Manual    => "manual",
        })
    }
}

/// What a successful job run hands back: a one-line summary for logs and
/// status, plus the job's typed report as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobReport {
    pub summary: String,
    pub detail:  serde_json::Value,
}

impl JobReport {
    pub fn new<T: Serialize>(summary: String, detail: &T) -> serde_json::Result<Self> {
        Ok(Self { summary, detail: serde_json::to_value(detail)? })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { summary: String },
    Failed { error: String },
}

/// Point-in-time view of one registered job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub job:          JobId,
    pub timeline:     Timeline,
    pub trigger:      Trigger,
    pub running:      bool,
    pub last_run_at:  Option<NaiveDateTime>,
    pub last_outcome: Option<JobOutcome>,
    pub next_run_at:  Option<NaiveDateTime>,
}

/// Scheduler-wide view returned to the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchStatus {
    pub running: bool,
    pub jobs:    Vec<JobStatus>,
}

impl BatchStatus {
    /// Most recent run start across all jobs.
    pub fn last_run_at(&self) -> Option<NaiveDateTime> {
        self.jobs.iter().filter_map(|j| j.last_run_at).max()
    }
}
