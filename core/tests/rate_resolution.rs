//! Rate resolution and premium calculation against the SQLite store.

mod common;

use common::{at, date, key, FlakyStore, Fixture};
use insurance_core::{
    error::{CalcError, ValidationError},
    premium::{GridCell, GridRequest, PremiumCalculator, QuoteRequest},
    rate_resolver::ValueRange,
    types::Gender,
};
use std::sync::Arc;

fn quote(product_id: i64, gender: &str, age: i32, period: i32, amount: f64) -> QuoteRequest {
    QuoteRequest {
        product_id,
        gender: gender.to_string(),
        entry_age: age,
        insurance_period: period,
        insured_amount: amount,
    }
}

/// A closed 2023 window and an open 2024 window: mid-2024 resolves to the
/// 2024 row.
#[test]
fn newer_window_wins() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    let k = key(1, Gender::Male, 30, 20);
    fx.rate(k, 0.010, 0.002, date(2023, 1, 1), Some(date(2023, 12, 31)));
    let current = fx.rate(k, 0.011, 0.002, date(2024, 1, 1), None);

    let calc = fx.calculator();
    let rate = calc.resolver().resolve(&k, date(2024, 6, 1)).unwrap();
    assert_eq!(rate.id, current);
}

/// Two open-ended windows overlap; the later valid_from is chosen no
/// matter the insertion order.
#[test]
fn overlapping_windows_pick_latest_valid_from() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    let k = key(1, Gender::Female, 40, 10);
    let newer = fx.rate(k, 0.020, 0.001, date(2024, 1, 1), None);
    fx.rate(k, 0.030, 0.001, date(2023, 1, 1), None);

    let rate = fx.calculator().resolver().resolve(&k, date(2024, 6, 1)).unwrap();
    assert_eq!(rate.id, newer);

    // Before the newer window opens only the older row applies.
    let rate = fx.calculator().resolver().resolve(&k, date(2023, 6, 1)).unwrap();
    assert_ne!(rate.id, newer);
}

/// A key with no valid row is a not-found error, not a validation error.
#[test]
fn missing_rate_is_not_found() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    fx.rate(key(1, Gender::Male, 30, 20), 0.01, 0.0, date(2024, 1, 1), None);
    fx.rate(key(1, Gender::Male, 50, 20), 0.02, 0.0, date(2024, 1, 1), None);

    let err = fx.calculator().calculate(&quote(1, "M", 40, 20, 1_000.0)).unwrap_err();
    assert!(matches!(err, CalcError::RateNotFound { .. }));
    assert!(err.is_not_found());
    assert!(err.is_client_error());
}

/// annual = amount * (base + loading), monthly = annual / 12, unrounded.
#[test]
fn premium_follows_formula_exactly() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    fx.rate(key(1, Gender::Male, 30, 20), 0.0123, 0.0017, date(2024, 1, 1), None);

    let q = fx.calculator().calculate(&quote(1, "M", 30, 20, 1_234_567.0)).unwrap();
    let expected_annual = 1_234_567.0 * (0.0123 + 0.0017);
    assert_eq!(q.total_rate, 0.0123 + 0.0017);
    assert_eq!(q.annual_premium, expected_annual);
    assert_eq!(q.monthly_premium, expected_annual / 12.0);
    assert_eq!(q.key.gender, Gender::Male);
}

/// Age 150 fails validation before any rate lookup happens.
#[test]
fn out_of_bounds_age_never_reaches_resolution() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    fx.rate(key(1, Gender::Male, 30, 20), 0.01, 0.0, date(2024, 1, 1), None);
    let flaky = Arc::new(FlakyStore::new(fx.store.clone(), None));
    let calc = PremiumCalculator::new(flaky.clone(), fx.dyn_clock());

    let err = calc.calculate(&quote(1, "M", 150, 20, 1_000_000.0)).unwrap_err();
    assert!(matches!(
        err,
        CalcError::Validation(ValidationError::EntryAgeOutOfBounds(150))
    ));
    assert_eq!(flaky.lookups(), 0);
}

/// Inputs inside the global bounds but outside the product's rows are
/// rejected against the product range.
#[test]
fn product_range_bounds_input() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    fx.rate(key(1, Gender::Male, 20, 10), 0.01, 0.0, date(2024, 1, 1), None);
    fx.rate(key(1, Gender::Female, 60, 30), 0.01, 0.0, date(2020, 1, 1), Some(date(2020, 12, 31)));
    let flaky = Arc::new(FlakyStore::new(fx.store.clone(), None));
    let calc = PremiumCalculator::new(flaky.clone(), fx.dyn_clock());

    let err = calc.calculate(&quote(1, "M", 70, 20, 1_000.0)).unwrap_err();
    assert!(matches!(
        err,
        CalcError::Validation(ValidationError::AgeOutsideProductRange { age: 70, min: 20, max: 60 })
    ));
    let err = calc.calculate(&quote(1, "M", 30, 40, 1_000.0)).unwrap_err();
    assert!(matches!(
        err,
        CalcError::Validation(ValidationError::PeriodOutsideProductRange { period: 40, .. })
    ));
    assert_eq!(flaky.lookups(), 0);

    assert_eq!(calc.resolver().valid_age_range(1).unwrap(), ValueRange { min: 20, max: 60 });
    assert_eq!(calc.resolver().valid_period_range(1).unwrap(), ValueRange { min: 10, max: 30 });
}

/// A product with no rate rows at all is reported as not found.
#[test]
fn unknown_product_is_not_found() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    let err = fx.calculator().calculate(&quote(9, "F", 30, 20, 1_000.0)).unwrap_err();
    assert!(matches!(err, CalcError::ProductNotFound { product_id: 9 }));
    assert!(fx.calculator().rate_table(9).is_err());
}

/// Rate table groups every row gender -> age -> period.
#[test]
fn rate_table_groups_rows() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    fx.rate(key(1, Gender::Male, 30, 20), 0.01, 0.0, date(2023, 1, 1), Some(date(2023, 12, 31)));
    fx.rate(key(1, Gender::Male, 30, 20), 0.02, 0.0, date(2024, 1, 1), None);
    fx.rate(key(1, Gender::Male, 40, 20), 0.03, 0.0, date(2024, 1, 1), None);
    fx.rate(key(1, Gender::Female, 30, 10), 0.04, 0.0, date(2024, 1, 1), None);
    fx.rate(key(2, Gender::Female, 30, 10), 0.05, 0.0, date(2024, 1, 1), None);

    let table = fx.calculator().rate_table(1).unwrap();
    assert_eq!(table.rates[&Gender::Male][&30][&20].len(), 2);
    assert_eq!(table.rates[&Gender::Male][&40][&20].len(), 1);
    assert_eq!(table.rates[&Gender::Female].len(), 1);
    assert_eq!(table.ranges.age, ValueRange { min: 30, max: 40 });
    assert_eq!(table.ranges.period, ValueRange { min: 10, max: 20 });
}

/// The preview grid quotes each combination and records per-cell errors.
#[test]
fn grid_reports_each_cell() {
    let fx = Fixture::new(at(2024, 6, 1, 9, 0));
    fx.rate(key(1, Gender::Male, 30, 20), 0.01, 0.002, date(2024, 1, 1), None);
    fx.rate(key(1, Gender::Male, 40, 20), 0.02, 0.002, date(2024, 1, 1), None);

    let grid = fx
        .calculator()
        .calculate_grid(&GridRequest {
            product_id: 1,
            genders: vec!["M".into(), "F".into()],
            ages: vec![30, 40],
            periods: vec![20],
            insured_amount: 100_000.0,
        })
        .unwrap();

    match &grid["M"][&30][&20] {
        GridCell::Quoted { annual_premium, .. } => assert_eq!(*annual_premium, 100_000.0 * (0.01 + 0.002)),
        other => panic!("expected a quote, got {other:?}"),
    }
    assert!(matches!(grid["M"][&40][&20], GridCell::Quoted { .. }));
    assert!(matches!(grid["F"][&30][&20], GridCell::Rejected { .. }));
}
