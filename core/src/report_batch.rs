//! Reporting batch: read-only weekly and monthly summaries.

use crate::{
    clock::Clock,
    error::StoreResult,
    store::{ContractStats, PolicyStore, ProductMonthSummary, RequestStats},
};
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyReport {
    pub generated_at: NaiveDateTime,
    pub contracts:    ContractStats,
    pub requests:     RequestStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyReport {
    pub generated_at: NaiveDateTime,
    pub year:         i32,
    pub month:        u32,
    pub products:     Vec<ProductMonthSummary>,
}

pub struct ReportBatch {
    store: Arc<dyn PolicyStore>,
    clock: Arc<dyn Clock>,
}

impl ReportBatch {
    pub fn new(store: Arc<dyn PolicyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn weekly_report(&self) -> StoreResult<WeeklyReport> {
        let now = self.clock.now();
        let contracts = self.store.contract_stats()?;
        let requests = self.store.request_stats(now)?;

        log::info!(
            "job=weekly_report reporting: contracts={} avg_monthly_premium={:.2} insured_total={:.2}",
            contracts.total,
            contracts.average_monthly_premium.unwrap_or(0.0),
            contracts.total_insured_amount
        );
        for (status, n) in &contracts.by_status {
            log::info!("job=weekly_report reporting: contracts {status}={n}");
        }
        log::info!(
            "job=weekly_report reporting: requests={} opened_last_week={} avg_processing_days={:.1}",
            requests.total,
            requests.opened_last_week,
            requests.average_processing_days.unwrap_or(0.0)
        );

        Ok(WeeklyReport { generated_at: now, contracts, requests })
    }

    /// Per-product summary of contracts created in the current month.
    pub fn monthly_report(&self) -> StoreResult<MonthlyReport> {
        let now = self.clock.now();
        let (year, month) = (now.year(), now.month());
        let products = self.store.monthly_contract_summary(year, month)?;

        for p in &products {
            log::info!(
                "job=monthly_report reporting: {year}-{month:02} product={} contracts={} insured={:.2} premium={:.2}",
                p.product_id,
                p.contracts,
                p.total_insured_amount,
                p.total_monthly_premium
            );
        }
        if products.is_empty() {
            log::info!("job=monthly_report reporting: {year}-{month:02} no new contracts");
        }

        Ok(MonthlyReport { generated_at: now, year, month, products })
    }
}
