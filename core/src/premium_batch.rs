//! Premium maintenance batch.
//!
//! Premium update run (daily):
//!   1. Expire closed rate windows that ended in the past
//!   2. Activate rate windows that have opened and are still open
//!   3. Recompute the premium of every open contract
//!
//! Request status check (hourly) is read-only: stale PROCESSING requests
//! and requests whose follow-up date has passed.
//!
//! Step 3 never aborts on a single contract. A rate miss, a calculation
//! error or a failed write is logged and that contract is skipped.

use crate::{
    clock::Clock,
    config::PremiumMaintenanceConfig,
    error::StoreResult,
    premium::{PremiumCalculator, QuoteRequest},
    store::{
        ContractChange, ContractPredicate, DocumentRequestRecord, PolicyStore, PremiumSubject,
        RateChange, RatePredicate, RequestPredicate,
    },
    types::{ContractId, ContractStatus, RequestStatus},
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedContract {
    pub contract_id: ContractId,
    pub reason:      String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecomputeReport {
    pub examined: usize,
    pub updated:  usize,
    pub skipped:  Vec<SkippedContract>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PremiumUpdateReport {
    pub rates_expired:   usize,
    pub rates_activated: usize,
    pub recompute:       RecomputeReport,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestScanReport {
    pub stale:             Vec<DocumentRequestRecord>,
    pub follow_up_overdue: Vec<DocumentRequestRecord>,
}

pub struct PremiumMaintenanceBatch {
    store:      Arc<dyn PolicyStore>,
    clock:      Arc<dyn Clock>,
    calculator: Arc<PremiumCalculator>,
    config:     PremiumMaintenanceConfig,
}

impl PremiumMaintenanceBatch {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        clock: Arc<dyn Clock>,
        calculator: Arc<PremiumCalculator>,
        config: PremiumMaintenanceConfig,
    ) -> Self {
        Self { store, clock, calculator, config }
    }

    pub fn run_premium_update(&self) -> StoreResult<PremiumUpdateReport> {
        let report = PremiumUpdateReport {
            rates_expired:   self.expire_rates()?,
            rates_activated: self.activate_rates()?,
            recompute:       self.recompute_premiums()?,
        };
        log::info!(
            "job=premium_update premium: expired={} activated={} recomputed={}/{} skipped={}",
            report.rates_expired,
            report.rates_activated,
            report.recompute.updated,
            report.recompute.examined,
            report.recompute.skipped.len()
        );
        Ok(report)
    }

    /// Pins closed windows that ended in the past to end yesterday.
    pub fn expire_rates(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let today = now.date();
        let affected = self.store.update_rates(
            &RatePredicate::ExpiredBefore { today },
            &RateChange::CloseOn { valid_to: today - Duration::days(1), at: now },
        )?;
        if affected > 0 {
            log::info!("job=premium_update premium: expired {affected} rate rows");
        }
        Ok(affected)
    }

    /// Stamps still-open windows that have already started with today.
    pub fn activate_rates(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let today = now.date();
        let affected = self.store.update_rates(
            &RatePredicate::AwaitingActivation { today },
            &RateChange::OpenFrom { valid_from: today, at: now },
        )?;
        if affected > 0 {
            log::info!("job=premium_update premium: activated {affected} rate rows");
        }
        Ok(affected)
    }

    /// Only the initial subject query can fail the run; everything after it
    /// is handled per contract.
    pub fn recompute_premiums(&self) -> StoreResult<RecomputeReport> {
        let subjects = self.store.premium_subjects(&ContractStatus::OPEN)?;
        let today = self.clock.today();
        let mut report = RecomputeReport { examined: subjects.len(), ..Default::default() };

        for subject in &subjects {
            match self.recompute_one(subject, today) {
                Ok(true) => report.updated += 1,
                Ok(false) => {
                    log::debug!(
                        "job=premium_update premium: contract {} left its open status, skipped",
                        subject.contract_number
                    );
                }
                Err(reason) => {
                    log::warn!(
                        "job=premium_update premium: contract {} skipped: {reason}",
                        subject.contract_number
                    );
                    report.skipped.push(SkippedContract { contract_id: subject.contract_id, reason });
                }
            }
        }
        Ok(report)
    }

    fn recompute_one(&self, subject: &PremiumSubject, today: NaiveDate) -> Result<bool, String> {
        let quote = self
            .calculator
            .calculate_as_of(
                &QuoteRequest {
                    product_id:       subject.product_id,
                    gender:           subject.gender.as_str().to_string(),
                    entry_age:        subject.entry_age,
                    insurance_period: subject.insurance_period,
                    insured_amount:   subject.insured_amount,
                },
                today,
            )
            .map_err(|e| e.to_string())?;

        let affected = self
            .store
            .update_contracts(
                &ContractPredicate::IdInStatus {
                    id:       subject.contract_id,
                    statuses: ContractStatus::OPEN.to_vec(),
                },
                &ContractChange::Premium {
                    monthly_premium: quote.monthly_premium,
                    at:              self.clock.now(),
                },
            )
            .map_err(|e| e.to_string())?;
        Ok(affected > 0)
    }

    pub fn request_status_scan(&self) -> StoreResult<RequestScanReport> {
        let now = self.clock.now();
        let stale = self.store.query_requests(&RequestPredicate::StaleInStatus {
            status:         RequestStatus::Processing,
            created_before: now - Duration::days(self.config.stale_request_days),
        })?;
        let follow_up_overdue =
            self.store.query_requests(&RequestPredicate::FollowUpOverdue { today: now.date() })?;

        for r in &stale {
            log::info!(
                "job=request_status_check premium: stale request={} customer={} since={}",
                r.request_number,
                r.customer_id,
                r.created_at
            );
        }
        for r in &follow_up_overdue {
            log::info!(
                "job=request_status_check premium: follow-up overdue request={} status={}",
                r.request_number,
                r.status.as_str()
            );
        }
        Ok(RequestScanReport { stale, follow_up_overdue })
    }
}
