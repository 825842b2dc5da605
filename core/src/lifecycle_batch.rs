//! Contract lifecycle batch.
//!
//! Status run (daily), in this order:
//!   1. Cancel UNDER_REVIEW contracts whose review window has expired
//!   2. Lapse APPROVED contracts with no payment inside the lapse window
//!   3. Mature APPROVED contracts whose maturity date has arrived
//!
//! Payment check (hourly) is read-only: it lists APPROVED contracts that
//! are overdue or due a payment reminder.
//!
//! A contract that qualifies for both lapse and maturity in one run is
//! lapsed by step 2, so step 3 no longer matches it. The order is kept as
//! is; there is no separate precedence rule.

use crate::{
    clock::Clock,
    config::LifecycleConfig,
    error::StoreResult,
    store::{ContractChange, ContractPredicate, ContractRecord, PolicyStore},
    types::{ContractId, CustomerId},
};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const REVIEW_EXPIRED_REASON: &str = "review_expired";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusUpdateReport {
    pub cancelled: usize,
    pub lapsed:    usize,
    pub matured:   usize,
}

impl StatusUpdateReport {
    pub fn total(&self) -> usize {
        self.cancelled + self.lapsed + self.matured
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelinquentContract {
    pub contract_id:        ContractId,
    pub contract_number:    String,
    pub customer_id:        CustomerId,
    pub last_payment_date:  NaiveDate,
    pub days_since_payment: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelinquencyReport {
    /// Unpaid past the overdue threshold.
    pub overdue:   Vec<DelinquentContract>,
    /// Unpaid past the reminder threshold (includes overdue contracts).
    pub reminders: Vec<DelinquentContract>,
}

pub struct ContractLifecycleBatch {
    store:  Arc<dyn PolicyStore>,
    clock:  Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl ContractLifecycleBatch {
    pub fn new(store: Arc<dyn PolicyStore>, clock: Arc<dyn Clock>, config: LifecycleConfig) -> Self {
        Self { store, clock, config }
    }

    /// All three transitions, in order. A persistence failure aborts the
    /// remaining steps for this run.
    pub fn run_status_update(&self) -> StoreResult<StatusUpdateReport> {
        let report = StatusUpdateReport {
            cancelled: self.cancel_expired_reviews()?,
            lapsed:    self.lapse_overdue_payments()?,
            matured:   self.complete_matured()?,
        };
        log::info!(
            "job=contract_status lifecycle: cancelled={} lapsed={} matured={}",
            report.cancelled,
            report.lapsed,
            report.matured
        );
        Ok(report)
    }

    pub fn cancel_expired_reviews(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let today = now.date();
        let cutoff = (today - Duration::days(self.config.review_timeout_days)).and_time(NaiveTime::default());
        let affected = self.store.update_contracts(
            &ContractPredicate::ReviewExpired { created_before: cutoff },
            &ContractChange::Cancel {
                on:     today,
                reason: REVIEW_EXPIRED_REASON.to_string(),
                at:     now,
            },
        )?;
        if affected > 0 {
            log::info!("job=contract_status lifecycle: cancelled {affected} expired reviews");
        }
        Ok(affected)
    }

    pub fn lapse_overdue_payments(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let today = now.date();
        let affected = self.store.update_contracts(
            &ContractPredicate::PaymentOverdue {
                paid_before: today - Duration::days(self.config.lapse_after_days),
            },
            &ContractChange::Lapse { on: today, at: now },
        )?;
        if affected > 0 {
            log::info!("job=contract_status lifecycle: lapsed {affected} unpaid contracts");
        }
        Ok(affected)
    }

    pub fn complete_matured(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let today = now.date();
        let affected = self.store.update_contracts(
            &ContractPredicate::MaturityReached { on_or_before: today },
            &ContractChange::Mature { on: today, at: now },
        )?;
        if affected > 0 {
            log::info!("job=contract_status lifecycle: matured {affected} contracts");
        }
        Ok(affected)
    }

    pub fn delinquency_scan(&self) -> StoreResult<DelinquencyReport> {
        let today = self.clock.today();
        let overdue = self.unpaid_since(today, self.config.overdue_notice_days)?;
        let reminders = self.unpaid_since(today, self.config.reminder_notice_days)?;

        for c in &overdue {
            log::info!(
                "job=payment_check lifecycle: overdue contract={} customer={} days={}",
                c.contract_number,
                c.customer_id,
                c.days_since_payment
            );
        }
        for c in &reminders {
            log::debug!(
                "job=payment_check lifecycle: reminder due contract={} customer={} days={}",
                c.contract_number,
                c.customer_id,
                c.days_since_payment
            );
        }
        log::info!(
            "job=payment_check lifecycle: {} overdue, {} reminders due",
            overdue.len(),
            reminders.len()
        );
        Ok(DelinquencyReport { overdue, reminders })
    }

    fn unpaid_since(&self, today: NaiveDate, days: i64) -> StoreResult<Vec<DelinquentContract>> {
        let rows = self.store.query_contracts(&ContractPredicate::PaymentOverdue {
            paid_before: today - Duration::days(days),
        })?;
        Ok(rows.into_iter().filter_map(|c| delinquent(c, today)).collect())
    }
}

fn delinquent(c: ContractRecord, today: NaiveDate) -> Option<DelinquentContract> {
    let last_payment_date = c.last_payment_date?;
    Some(DelinquentContract {
        contract_id: c.id,
        contract_number: c.contract_number,
        customer_id: c.customer_id,
        last_payment_date,
        days_since_payment: (today - last_payment_date).num_days(),
    })
}
