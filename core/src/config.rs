//! Batch engine configuration, loaded from a JSON file.
//!
//! Every field has a default, so a partial file (or none at all) yields a
//! working production setup.

use crate::{
    error::{BatchError, BatchResult},
    job::JobId,
    trigger::Trigger,
};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// UNDER_REVIEW contracts older than this are cancelled.
    pub review_timeout_days:  i64,
    /// APPROVED contracts unpaid for longer than this lapse.
    pub lapse_after_days:     i64,
    pub overdue_notice_days:  i64,
    pub reminder_notice_days: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            review_timeout_days:  30,
            lapse_after_days:     60,
            overdue_notice_days:  30,
            reminder_notice_days: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PremiumMaintenanceConfig {
    /// PROCESSING requests older than this are reported as stale.
    pub stale_request_days: i64,
}

impl Default for PremiumMaintenanceConfig {
    fn default() -> Self {
        Self { stale_request_days: 7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobTriggers {
    pub contract_status:      Trigger,
    pub payment_check:        Trigger,
    pub premium_update:       Trigger,
    pub request_status_check: Trigger,
    pub weekly_report:        Trigger,
    pub monthly_report:       Trigger,
}

impl Default for JobTriggers {
    fn default() -> Self {
        Self {
            contract_status:      Trigger::DailyAt { hour: 3 },
            payment_check:        Trigger::HourlyAt { minute: 30 },
            premium_update:       Trigger::DailyAt { hour: 2 },
            request_status_check: Trigger::HourlyAt { minute: 0 },
            weekly_report:        Trigger::WeeklyAt { weekday: Weekday::Mon, hour: 4 },
            monthly_report:       Trigger::MonthlyAt { day: 1, hour: 5 },
        }
    }
}

impl JobTriggers {
    pub fn for_job(&self, job: JobId) -> Trigger {
        match job {
            JobId::ContractStatus     => self.contract_status,
            JobId::PaymentCheck       => self.payment_check,
            JobId::PremiumUpdate      => self.premium_update,
            JobId::RequestStatusCheck => self.request_status_check,
            JobId::WeeklyReport       => self.weekly_report,
            JobId::MonthlyReport      => self.monthly_report,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub lifecycle:          LifecycleConfig,
    pub premium:            PremiumMaintenanceConfig,
    pub triggers:           JobTriggers,
    /// How long `stop()` waits for in-flight runs.
    pub drain_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            lifecycle:          LifecycleConfig::default(),
            premium:            PremiumMaintenanceConfig::default(),
            triggers:           JobTriggers::default(),
            drain_timeout_secs: 60,
        }
    }
}

impl BatchConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: BatchConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        log::info!("config: loaded {path}");
        Ok(config)
    }

    pub fn validate(&self) -> BatchResult<()> {
        let thresholds = [
            ("lifecycle.review_timeout_days", self.lifecycle.review_timeout_days),
            ("lifecycle.lapse_after_days", self.lifecycle.lapse_after_days),
            ("lifecycle.overdue_notice_days", self.lifecycle.overdue_notice_days),
            ("lifecycle.reminder_notice_days", self.lifecycle.reminder_notice_days),
            ("premium.stale_request_days", self.premium.stale_request_days),
        ];
        for (name, days) in thresholds {
            if days <= 0 {
                return Err(BatchError::Config(format!("{name} must be positive, got {days}")));
            }
        }

        for job in JobId::ALL {
            self.triggers
                .for_job(job)
                .validate()
                .map_err(|e| BatchError::Config(format!("trigger for {job}: {e}")))?;
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
