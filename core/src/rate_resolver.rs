//! Rate resolution: picks the single applicable rate row for a key.
//!
//! Overlapping validity windows are allowed. When several rows are valid on
//! the as-of date the most recently effective one wins: largest
//! `valid_from`, then largest id.

use crate::{
    error::{CalcError, CalcResult},
    store::{PolicyStore, PremiumRate},
    types::{ProductId, RateKey},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inclusive min/max bounds over a product's rate rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueRange {
    pub min: i32,
    pub max: i32,
}

impl ValueRange {
    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Entry-age and period bounds for one product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductRanges {
    pub age:    ValueRange,
    pub period: ValueRange,
}

pub struct RateResolver {
    store: Arc<dyn PolicyStore>,
}

impl RateResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, key: &RateKey, as_of: NaiveDate) -> CalcResult<PremiumRate> {
        let rows = self.store.rates_for_key(key, as_of)?;
        if rows.len() > 1 {
            log::debug!("rates: {} overlapping rows for {key} on {as_of}", rows.len());
        }
        select_current(rows, as_of).ok_or(CalcError::RateNotFound { key: *key })
    }

    /// Age and period bounds across every row of the product, or `None`
    /// when the product has no rate rows at all.
    pub fn product_ranges(&self, product_id: ProductId) -> CalcResult<Option<ProductRanges>> {
        let rows = self.store.rates_for_product(product_id)?;
        Ok(ranges_of(&rows))
    }

    pub fn valid_age_range(&self, product_id: ProductId) -> CalcResult<ValueRange> {
        self.product_ranges(product_id)?
            .map(|r| r.age)
            .ok_or(CalcError::ProductNotFound { product_id })
    }

    pub fn valid_period_range(&self, product_id: ProductId) -> CalcResult<ValueRange> {
        self.product_ranges(product_id)?
            .map(|r| r.period)
            .ok_or(CalcError::ProductNotFound { product_id })
    }
}

/// Apply the validity window and tie-break to candidate rows.
pub fn select_current(rows: Vec<PremiumRate>, as_of: NaiveDate) -> Option<PremiumRate> {
    rows.into_iter()
        .filter(|r| r.is_valid_on(as_of))
        .max_by_key(|r| (r.valid_from, r.id))
}

pub(crate) fn ranges_of(rows: &[PremiumRate]) -> Option<ProductRanges> {
    let first = rows.first()?;
    let mut age = ValueRange { min: first.entry_age, max: first.entry_age };
    let mut period = ValueRange { min: first.insurance_period, max: first.insurance_period };
    for r in rows {
        age.min = age.min.min(r.entry_age);
        age.max = age.max.max(r.entry_age);
        period.min = period.min.min(r.insurance_period);
        period.max = period.max.max(r.insurance_period);
    }
    Some(ProductRanges { age, period })
}
