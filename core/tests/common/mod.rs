//! Shared fixtures for integration tests: an in-memory store, a manual
//! clock and small seeding helpers.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use insurance_core::{
    clock::{Clock, ManualClock},
    config::{LifecycleConfig, PremiumMaintenanceConfig},
    error::{StoreError, StoreResult},
    event::BatchLogEntry,
    lifecycle_batch::ContractLifecycleBatch,
    premium::PremiumCalculator,
    premium_batch::PremiumMaintenanceBatch,
    store::{
        ContractChange, ContractPredicate, ContractRecord, DocumentRequestRecord, InsuredPerson,
        NewContract, NewRate, PolicyStore, PremiumRate, PremiumSubject, ProductMonthSummary,
        RateChange, RatePredicate, RequestPredicate, RequestStats, ContractStats, SqliteStore,
    },
    types::{ContractId, ContractStatus, Gender, ProductId, RateId, RateKey, Relationship},
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).expect("valid time")
}

pub fn key(product_id: ProductId, gender: Gender, age: i32, period: i32) -> RateKey {
    RateKey { product_id, gender, entry_age: age, insurance_period: period }
}

pub struct Fixture {
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
    next_number: AtomicUsize,
}

impl Fixture {
    pub fn new(now: NaiveDateTime) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = SqliteStore::in_memory().expect("in-memory store");
        store.migrate().expect("migrations apply");
        Self {
            store: Arc::new(store),
            clock: Arc::new(ManualClock::new(now)),
            next_number: AtomicUsize::new(1),
        }
    }

    pub fn policy_store(&self) -> Arc<dyn PolicyStore> {
        self.store.clone()
    }

    pub fn dyn_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn lifecycle(&self) -> ContractLifecycleBatch {
        ContractLifecycleBatch::new(self.policy_store(), self.dyn_clock(), LifecycleConfig::default())
    }

    pub fn calculator(&self) -> Arc<PremiumCalculator> {
        Arc::new(PremiumCalculator::new(self.policy_store(), self.dyn_clock()))
    }

    pub fn premium_batch(&self) -> PremiumMaintenanceBatch {
        self.premium_batch_over(self.policy_store())
    }

    /// Premium batch reading and writing through `store` instead of the
    /// plain SQLite handle.
    pub fn premium_batch_over(&self, store: Arc<dyn PolicyStore>) -> PremiumMaintenanceBatch {
        let calculator = Arc::new(PremiumCalculator::new(Arc::clone(&store), self.dyn_clock()));
        PremiumMaintenanceBatch::new(
            store,
            self.dyn_clock(),
            calculator,
            PremiumMaintenanceConfig::default(),
        )
    }

    pub fn contract(
        &self,
        status: ContractStatus,
        created_at: NaiveDateTime,
        last_payment_date: Option<NaiveDate>,
        maturity_date: Option<NaiveDate>,
    ) -> ContractId {
        self.contract_for_product(1, 1_000_000.0, status, created_at, last_payment_date, maturity_date)
    }

    pub fn contract_for_product(
        &self,
        product_id: ProductId,
        insured_amount: f64,
        status: ContractStatus,
        created_at: NaiveDateTime,
        last_payment_date: Option<NaiveDate>,
        maturity_date: Option<NaiveDate>,
    ) -> ContractId {
        let n = self.next_number.fetch_add(1, Ordering::SeqCst);
        self.store
            .insert_contract(&NewContract {
                contract_number: format!("C{n:06}"),
                product_id,
                customer_id: 100 + n as i64,
                insured_amount,
                status,
                created_at,
                last_payment_date,
                maturity_date,
            })
            .expect("insert contract")
    }

    pub fn principal(&self, contract_id: ContractId, gender: Gender, age: i32, period: i32) {
        self.store
            .insert_insured_person(&InsuredPerson {
                contract_id,
                relationship: Relationship::Principal,
                gender,
                entry_age: age,
                insurance_period: period,
            })
            .expect("insert insured person");
    }

    pub fn rate(
        &self,
        key: RateKey,
        base_rate: f64,
        loading_rate: f64,
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
    ) -> RateId {
        self.store
            .insert_rate(&NewRate { key, base_rate, loading_rate, valid_from, valid_to })
            .expect("insert rate")
    }

    pub fn get(&self, id: ContractId) -> ContractRecord {
        self.store.contract_by_id(id).expect("query").expect("contract exists")
    }
}

/// Wraps the SQLite store, fails the premium write for one contract,
/// can fail the premium subject query outright and counts rate lookups.
pub struct FlakyStore {
    pub inner:         Arc<SqliteStore>,
    pub fail_premium:  Option<ContractId>,
    pub fail_subjects: AtomicBool,
    pub rate_lookups:  AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteStore>, fail_premium: Option<ContractId>) -> Self {
        Self {
            inner,
            fail_premium,
            fail_subjects: AtomicBool::new(false),
            rate_lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_subjects_failing(&self, failing: bool) {
        self.fail_subjects.store(failing, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.rate_lookups.load(Ordering::SeqCst)
    }
}

impl PolicyStore for FlakyStore {
    fn update_contracts(&self, predicate: &ContractPredicate, change: &ContractChange) -> StoreResult<usize> {
        if let (ContractPredicate::IdInStatus { id, .. }, ContractChange::Premium { .. }) = (predicate, change) {
            if Some(*id) == self.fail_premium {
                return Err(StoreError::LockPoisoned);
            }
        }
        self.inner.update_contracts(predicate, change)
    }

    fn query_contracts(&self, predicate: &ContractPredicate) -> StoreResult<Vec<ContractRecord>> {
        self.inner.query_contracts(predicate)
    }

    fn premium_subjects(&self, statuses: &[ContractStatus]) -> StoreResult<Vec<PremiumSubject>> {
        if self.fail_subjects.load(Ordering::SeqCst) {
            return Err(StoreError::LockPoisoned);
        }
        self.inner.premium_subjects(statuses)
    }

    fn update_rates(&self, predicate: &RatePredicate, change: &RateChange) -> StoreResult<usize> {
        self.inner.update_rates(predicate, change)
    }

    fn rates_for_key(&self, key: &RateKey, as_of: NaiveDate) -> StoreResult<Vec<PremiumRate>> {
        self.rate_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.rates_for_key(key, as_of)
    }

    fn rates_for_product(&self, product_id: ProductId) -> StoreResult<Vec<PremiumRate>> {
        self.inner.rates_for_product(product_id)
    }

    fn query_requests(&self, predicate: &RequestPredicate) -> StoreResult<Vec<DocumentRequestRecord>> {
        self.inner.query_requests(predicate)
    }

    fn contract_stats(&self) -> StoreResult<ContractStats> {
        self.inner.contract_stats()
    }

    fn request_stats(&self, now: NaiveDateTime) -> StoreResult<RequestStats> {
        self.inner.request_stats(now)
    }

    fn monthly_contract_summary(&self, year: i32, month: u32) -> StoreResult<Vec<ProductMonthSummary>> {
        self.inner.monthly_contract_summary(year, month)
    }

    fn append_batch_log(&self, entry: &BatchLogEntry) -> StoreResult<()> {
        self.inner.append_batch_log(entry)
    }

    fn recent_batch_log(&self, limit: usize) -> StoreResult<Vec<BatchLogEntry>> {
        self.inner.recent_batch_log(limit)
    }
}
