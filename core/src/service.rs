//! The batch control surface.
//!
//! `BatchService` is the one object the interactive layer holds. It owns
//! the store handle, the clock, the scheduler and the calculator; nothing
//! in the engine is global.
//!
//! RULE: Every job run, scheduled or manual, goes through
//! `ServiceCore::execute`, which appends one entry to the batch log.

use crate::{
    clock::Clock,
    config::BatchConfig,
    error::{BatchResult, CalcResult},
    event::{BatchEvent, BatchLogEntry},
    job::{BatchStatus, JobId, JobReport, RunSource},
    lifecycle_batch::ContractLifecycleBatch,
    premium::{GridRequest, PremiumCalculator, PremiumGrid, PremiumQuote, QuoteRequest, RateTable},
    premium_batch::PremiumMaintenanceBatch,
    report_batch::ReportBatch,
    scheduler::{JobAction, Scheduler, StopReport},
    store::PolicyStore,
    types::ProductId,
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

pub struct BatchService {
    core:          Arc<ServiceCore>,
    scheduler:     Scheduler,
    drain_timeout: Duration,
}

struct ServiceCore {
    store:      Arc<dyn PolicyStore>,
    clock:      Arc<dyn Clock>,
    calculator: Arc<PremiumCalculator>,
    lifecycle:  ContractLifecycleBatch,
    premium:    PremiumMaintenanceBatch,
    reports:    ReportBatch,
}

impl BatchService {
    /// Validate the config and register every job. Does not start the
    /// scheduler.
    pub fn new(store: Arc<dyn PolicyStore>, clock: Arc<dyn Clock>, config: BatchConfig) -> BatchResult<Self> {
        config.validate()?;

        let calculator = Arc::new(PremiumCalculator::new(Arc::clone(&store), Arc::clone(&clock)));
        let core = Arc::new(ServiceCore {
            lifecycle: ContractLifecycleBatch::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                config.lifecycle.clone(),
            ),
            premium: PremiumMaintenanceBatch::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                Arc::clone(&calculator),
                config.premium.clone(),
            ),
            reports: ReportBatch::new(Arc::clone(&store), Arc::clone(&clock)),
            calculator,
            store,
            clock: Arc::clone(&clock),
        });

        let mut scheduler = Scheduler::new(clock);
        for job in JobId::ALL {
            let job_core = Arc::clone(&core);
            let action: JobAction = Arc::new(move |source| job_core.execute(job, source));
            scheduler.register(job, config.triggers.for_job(job), action)?;
        }

        Ok(Self { core, scheduler, drain_timeout: config.drain_timeout() })
    }

    pub fn start(&self) -> BatchResult<()> {
        self.scheduler.start()
    }

    /// Stop with the configured drain timeout.
    pub fn stop(&self) -> BatchResult<StopReport> {
        self.scheduler.stop(self.drain_timeout)
    }

    pub fn stop_with_timeout(&self, drain: Duration) -> BatchResult<StopReport> {
        self.scheduler.stop(drain)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run one job synchronously on the caller's thread.
    pub fn run_now(&self, job: JobId) -> BatchResult<JobReport> {
        self.scheduler.run_now(job)
    }

    /// Every job in registration order. A failing job does not stop the
    /// ones after it.
    pub fn run_all(&self) -> Vec<(JobId, BatchResult<JobReport>)> {
        self.scheduler
            .jobs()
            .map(|job| (job, self.scheduler.run_now(job)))
            .collect()
    }

    pub fn status(&self) -> BatchStatus {
        self.scheduler.status()
    }

    pub fn calculate_premium(&self, req: &QuoteRequest) -> CalcResult<PremiumQuote> {
        self.core.calculator.calculate(req)
    }

    pub fn calculate_grid(&self, req: &GridRequest) -> CalcResult<PremiumGrid> {
        self.core.calculator.calculate_grid(req)
    }

    pub fn rate_table(&self, product_id: ProductId) -> CalcResult<RateTable> {
        self.core.calculator.rate_table(product_id)
    }

    /// Newest batch log entries first.
    pub fn recent_runs(&self, limit: usize) -> BatchResult<Vec<BatchLogEntry>> {
        Ok(self.core.store.recent_batch_log(limit)?)
    }
}

impl ServiceCore {
    fn execute(&self, job: JobId, source: RunSource) -> BatchResult<JobReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        let result = self.dispatch(job);
        let finished_at = self.clock.now();

        let event = match &result {
            Ok(report) => BatchEvent::JobSucceeded {
                job,
                source,
                summary: report.summary.clone(),
                detail: report.detail.clone(),
            },
            Err(e) => BatchEvent::JobFailed { job, source, error: e.to_string() },
        };
        // Batch log failures never change the job result.
        match BatchLogEntry::from_event(&run_id, started_at, finished_at, &event) {
            Ok(entry) => {
                if let Err(e) = self.store.append_batch_log(&entry) {
                    log::warn!("job={job} run={run_id} batch log append failed: {e}");
                }
            }
            Err(e) => log::warn!("job={job} run={run_id} batch log encode failed: {e}"),
        }
        result
    }

    fn dispatch(&self, job: JobId) -> BatchResult<JobReport> {
        let report = match job {
            JobId::ContractStatus => {
                let r = self.lifecycle.run_status_update()?;
                JobReport::new(
                    format!("cancelled={} lapsed={} matured={}", r.cancelled, r.lapsed, r.matured),
                    &r,
                )?
            }
            JobId::PaymentCheck => {
                let r = self.lifecycle.delinquency_scan()?;
                JobReport::new(
                    format!("overdue={} reminders={}", r.overdue.len(), r.reminders.len()),
                    &r,
                )?
            }
            JobId::PremiumUpdate => {
                let r = self.premium.run_premium_update()?;
                JobReport::new(
                    format!(
                        "expired={} activated={} updated={}/{} skipped={}",
                        r.rates_expired,
                        r.rates_activated,
                        r.recompute.updated,
                        r.recompute.examined,
                        r.recompute.skipped.len()
                    ),
                    &r,
                )?
            }
            JobId::RequestStatusCheck => {
                let r = self.premium.request_status_scan()?;
                JobReport::new(
                    format!("stale={} follow_up_overdue={}", r.stale.len(), r.follow_up_overdue.len()),
                    &r,
                )?
            }
            JobId::WeeklyReport => {
                let r = self.reports.weekly_report()?;
                JobReport::new(
                    format!("contracts={} requests={}", r.contracts.total, r.requests.total),
                    &r,
                )?
            }
            JobId::MonthlyReport => {
                let r = self.reports.monthly_report()?;
                JobReport::new(
                    format!("{}-{:02} products={}", r.year, r.month, r.products.len()),
                    &r,
                )?
            }
        };
        Ok(report)
    }
}
