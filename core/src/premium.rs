//! Premium calculation.
//!
//! Validation runs in a fixed order and the first failure wins. Rate
//! resolution is only attempted once every check has passed.
//!
//! Formula (no rounding at this layer):
//!   total_rate      = base_rate + loading_rate
//!   annual_premium  = insured_amount * total_rate
//!   monthly_premium = annual_premium / 12

use crate::{
    clock::Clock,
    error::{CalcError, CalcResult, ValidationError},
    rate_resolver::{ProductRanges, RateResolver},
    store::{PolicyStore, PremiumRate},
    types::{Gender, ProductId, RateKey},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

pub const MIN_ENTRY_AGE: i32 = 0;
pub const MAX_ENTRY_AGE: i32 = 100;
pub const MIN_PERIOD_YEARS: i32 = 1;
pub const MAX_PERIOD_YEARS: i32 = 50;

/// Raw quote input as received from the interactive layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteRequest {
    pub product_id:       ProductId,
    pub gender:           String,
    pub entry_age:        i32,
    pub insurance_period: i32,
    pub insured_amount:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiumQuote {
    pub key:             RateKey,
    pub insured_amount:  f64,
    pub total_rate:      f64,
    pub annual_premium:  f64,
    pub monthly_premium: f64,
    pub rate:            PremiumRate,
}

/// Input for a rate-table preview over several ages and periods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridRequest {
    pub product_id:     ProductId,
    pub genders:        Vec<String>,
    pub ages:           Vec<i32>,
    pub periods:        Vec<i32>,
    pub insured_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GridCell {
    Quoted { total_rate: f64, annual_premium: f64, monthly_premium: f64 },
    Rejected { error: String },
}

/// gender -> entry age -> period -> cell
pub type PremiumGrid = BTreeMap<String, BTreeMap<i32, BTreeMap<i32, GridCell>>>;

/// Every rate row of a product, grouped gender -> entry age -> period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateTable {
    pub product_id: ProductId,
    pub ranges:     ProductRanges,
    pub rates:      BTreeMap<Gender, BTreeMap<i32, BTreeMap<i32, Vec<PremiumRate>>>>,
}

pub struct PremiumCalculator {
    store:    Arc<dyn PolicyStore>,
    resolver: RateResolver,
    clock:    Arc<dyn Clock>,
}

impl PremiumCalculator {
    pub fn new(store: Arc<dyn PolicyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver: RateResolver::new(Arc::clone(&store)),
            store,
            clock,
        }
    }

    pub fn resolver(&self) -> &RateResolver {
        &self.resolver
    }

    /// Quote as of the clock's current date.
    pub fn calculate(&self, req: &QuoteRequest) -> CalcResult<PremiumQuote> {
        self.calculate_as_of(req, self.clock.today())
    }

    pub fn calculate_as_of(&self, req: &QuoteRequest, as_of: NaiveDate) -> CalcResult<PremiumQuote> {
        let gender = validate_input(req)?;
        let ranges = self
            .resolver
            .product_ranges(req.product_id)?
            .ok_or(CalcError::ProductNotFound { product_id: req.product_id })?;
        validate_against_product(req, &ranges)?;

        let key = RateKey {
            product_id:       req.product_id,
            gender,
            entry_age:        req.entry_age,
            insurance_period: req.insurance_period,
        };
        let rate = self.resolver.resolve(&key, as_of)?;
        Ok(quote_from_rate(key, req.insured_amount, rate))
    }

    /// Same formula over every gender x age x period combination.
    /// Client errors land in their cell; a persistence failure aborts.
    pub fn calculate_grid(&self, req: &GridRequest) -> CalcResult<PremiumGrid> {
        let as_of = self.clock.today();
        let mut grid = PremiumGrid::new();
        for gender in &req.genders {
            let by_age = grid.entry(gender.clone()).or_default();
            for &age in &req.ages {
                let by_period = by_age.entry(age).or_default();
                for &period in &req.periods {
                    let quote_req = QuoteRequest {
                        product_id:       req.product_id,
                        gender:           gender.clone(),
                        entry_age:        age,
                        insurance_period: period,
                        insured_amount:   req.insured_amount,
                    };
                    let cell = match self.calculate_as_of(&quote_req, as_of) {
                        Ok(q) => GridCell::Quoted {
                            total_rate:      q.total_rate,
                            annual_premium:  q.annual_premium,
                            monthly_premium: q.monthly_premium,
                        },
                        Err(e) if e.is_client_error() => GridCell::Rejected { error: e.to_string() },
                        Err(e) => return Err(e),
                    };
                    by_period.insert(period, cell);
                }
            }
        }
        Ok(grid)
    }

    pub fn rate_table(&self, product_id: ProductId) -> CalcResult<RateTable> {
        let rows = self.store.rates_for_product(product_id)?;
        let ranges = crate::rate_resolver::ranges_of(&rows)
            .ok_or(CalcError::ProductNotFound { product_id })?;

        let mut rates: BTreeMap<Gender, BTreeMap<i32, BTreeMap<i32, Vec<PremiumRate>>>> =
            BTreeMap::new();
        for row in rows {
            rates
                .entry(row.gender)
                .or_default()
                .entry(row.entry_age)
                .or_default()
                .entry(row.insurance_period)
                .or_default()
                .push(row);
        }
        Ok(RateTable { product_id, ranges, rates })
    }
}

/// Product-independent checks, in order. Returns the parsed gender.
pub fn validate_input(req: &QuoteRequest) -> Result<Gender, ValidationError> {
    if req.product_id <= 0 {
        return Err(ValidationError::InvalidProductId(req.product_id));
    }
    let gender = match Gender::parse(&req.gender) {
        Some(g @ (Gender::Male | Gender::Female)) => g,
        _ => return Err(ValidationError::InvalidGender(req.gender.clone())),
    };
    if !(MIN_ENTRY_AGE..=MAX_ENTRY_AGE).contains(&req.entry_age) {
        return Err(ValidationError::EntryAgeOutOfBounds(req.entry_age));
    }
    if !(MIN_PERIOD_YEARS..=MAX_PERIOD_YEARS).contains(&req.insurance_period) {
        return Err(ValidationError::PeriodOutOfBounds(req.insurance_period));
    }
    // Written as a negation so NaN is rejected too.
    if !(req.insured_amount > 0.0) {
        return Err(ValidationError::NonPositiveAmount(req.insured_amount));
    }
    Ok(gender)
}

pub fn validate_against_product(req: &QuoteRequest, ranges: &ProductRanges) -> Result<(), ValidationError> {
    if !ranges.age.contains(req.entry_age) {
        return Err(ValidationError::AgeOutsideProductRange {
            age: req.entry_age,
            min: ranges.age.min,
            max: ranges.age.max,
        });
    }
    if !ranges.period.contains(req.insurance_period) {
        return Err(ValidationError::PeriodOutsideProductRange {
            period: req.insurance_period,
            min:    ranges.period.min,
            max:    ranges.period.max,
        });
    }
    Ok(())
}

pub fn quote_from_rate(key: RateKey, insured_amount: f64, rate: PremiumRate) -> PremiumQuote {
    let total_rate = rate.total_rate();
    let annual_premium = insured_amount * total_rate;
    PremiumQuote {
        key,
        insured_amount,
        total_rate,
        annual_premium,
        monthly_premium: annual_premium / 12.0,
        rate,
    }
}
