//! Contract lifecycle batch: review timeout, payment lapse, maturity and
//! the read-only delinquency scan.

mod common;

use common::{at, date, Fixture};
use insurance_core::{
    lifecycle_batch::REVIEW_EXPIRED_REASON,
    types::ContractStatus,
};

/// Running every step twice without moving the clock touches nothing the
/// second time.
#[test]
fn status_steps_are_idempotent() {
    let fx = Fixture::new(at(2024, 1, 1, 9, 0));
    fx.contract(ContractStatus::UnderReview, at(2024, 1, 1, 9, 0), None, None);
    fx.contract(ContractStatus::Approved, at(2023, 1, 1, 9, 0), Some(date(2024, 1, 1)), None);
    fx.contract(
        ContractStatus::Approved,
        at(2023, 1, 1, 9, 0),
        Some(date(2024, 3, 1)),
        Some(date(2024, 3, 10)),
    );
    fx.clock.set(at(2024, 3, 15, 3, 0));

    let batch = fx.lifecycle();
    assert_eq!(batch.cancel_expired_reviews().unwrap(), 1);
    assert_eq!(batch.lapse_overdue_payments().unwrap(), 1);
    assert_eq!(batch.complete_matured().unwrap(), 1);

    assert_eq!(batch.cancel_expired_reviews().unwrap(), 0);
    assert_eq!(batch.lapse_overdue_payments().unwrap(), 0);
    assert_eq!(batch.complete_matured().unwrap(), 0);

    let second = batch.run_status_update().unwrap();
    assert_eq!(second.total(), 0);
}

/// A contract left UNDER_REVIEW is cancelled on day 31 and stays put on
/// day 32.
#[test]
fn unreviewed_contract_is_cancelled_after_thirty_days() {
    let fx = Fixture::new(at(2024, 1, 1, 10, 0));
    let id = fx.contract(ContractStatus::UnderReview, at(2024, 1, 1, 10, 0), None, None);
    let batch = fx.lifecycle();

    fx.clock.set(at(2024, 1, 31, 3, 0)); // day 30
    assert_eq!(batch.run_status_update().unwrap().cancelled, 0);
    assert_eq!(fx.get(id).status, ContractStatus::UnderReview);

    fx.clock.set(at(2024, 2, 1, 3, 0)); // day 31
    assert_eq!(batch.run_status_update().unwrap().cancelled, 1);
    let c = fx.get(id);
    assert_eq!(c.status, ContractStatus::Cancelled);
    assert_eq!(c.cancellation_date, Some(date(2024, 2, 1)));
    assert_eq!(c.cancellation_reason.as_deref(), Some(REVIEW_EXPIRED_REASON));
    assert_eq!(c.updated_at, at(2024, 2, 1, 3, 0));

    fx.clock.set(at(2024, 2, 2, 3, 0)); // day 32
    assert_eq!(batch.run_status_update().unwrap().total(), 0);
    let again = fx.get(id);
    assert_eq!(again.status, ContractStatus::Cancelled);
    assert_eq!(again.cancellation_date, Some(date(2024, 2, 1)));
}

/// Approved contracts are never cancelled by the review timeout.
#[test]
fn review_timeout_ignores_approved_contracts() {
    let fx = Fixture::new(at(2024, 1, 1, 10, 0));
    let id = fx.contract(ContractStatus::Approved, at(2023, 6, 1, 10, 0), Some(date(2024, 1, 1)), None);
    fx.clock.set(at(2024, 1, 20, 3, 0));

    assert_eq!(fx.lifecycle().cancel_expired_reviews().unwrap(), 0);
    assert_eq!(fx.get(id).status, ContractStatus::Approved);
}

/// Last paid on day 0: still APPROVED on day 60, LAPSED on day 61.
#[test]
fn unpaid_contract_lapses_on_day_sixty_one() {
    let fx = Fixture::new(at(2024, 1, 1, 3, 0));
    let id = fx.contract(ContractStatus::Approved, at(2023, 1, 1, 9, 0), Some(date(2024, 1, 1)), None);
    let batch = fx.lifecycle();

    fx.clock.advance_days(60);
    assert_eq!(batch.lapse_overdue_payments().unwrap(), 0);

    let day_61 = fx.clock.advance_days(1);
    assert_eq!(batch.lapse_overdue_payments().unwrap(), 1);
    let c = fx.get(id);
    assert_eq!(c.status, ContractStatus::Lapsed);
    assert_eq!(c.lapse_date, Some(day_61.date()));
}

/// Maturity completes the contract and stamps the maturity date with the
/// run date.
#[test]
fn matured_contract_is_completed() {
    let fx = Fixture::new(at(2024, 3, 5, 3, 0));
    let id = fx.contract(
        ContractStatus::Approved,
        at(2014, 3, 1, 9, 0),
        Some(date(2024, 3, 1)),
        Some(date(2024, 3, 1)),
    );

    assert_eq!(fx.lifecycle().complete_matured().unwrap(), 1);
    let c = fx.get(id);
    assert_eq!(c.status, ContractStatus::Matured);
    assert_eq!(c.maturity_date, Some(date(2024, 3, 5)));
}

/// Lapse runs before maturity, so a contract due for both ends LAPSED.
#[test]
fn contract_due_for_lapse_and_maturity_lapses_first() {
    let fx = Fixture::new(at(2024, 6, 1, 3, 0));
    let id = fx.contract(
        ContractStatus::Approved,
        at(2014, 1, 1, 9, 0),
        Some(date(2024, 1, 1)),
        Some(date(2024, 5, 31)),
    );

    let report = fx.lifecycle().run_status_update().unwrap();
    assert_eq!((report.lapsed, report.matured), (1, 0));
    assert_eq!(fx.get(id).status, ContractStatus::Lapsed);
}

/// The payment check lists overdue and reminder-due contracts without
/// changing any of them.
#[test]
fn delinquency_scan_is_read_only() {
    let fx = Fixture::new(at(2024, 5, 1, 12, 30));
    let overdue = fx.contract(ContractStatus::Approved, at(2023, 1, 1, 9, 0), Some(date(2024, 3, 20)), None);
    let reminder = fx.contract(ContractStatus::Approved, at(2023, 1, 1, 9, 0), Some(date(2024, 4, 10)), None);
    fx.contract(ContractStatus::Approved, at(2023, 1, 1, 9, 0), Some(date(2024, 4, 28)), None);
    fx.contract(ContractStatus::UnderReview, at(2024, 4, 1, 9, 0), Some(date(2024, 1, 1)), None);

    let report = fx.lifecycle().delinquency_scan().unwrap();

    let overdue_ids: Vec<_> = report.overdue.iter().map(|c| c.contract_id).collect();
    assert_eq!(overdue_ids, vec![overdue]);
    assert_eq!(report.overdue[0].days_since_payment, 42);

    let reminder_ids: Vec<_> = report.reminders.iter().map(|c| c.contract_id).collect();
    assert_eq!(reminder_ids, vec![overdue, reminder]);

    assert_eq!(fx.get(overdue).status, ContractStatus::Approved);
    assert_eq!(fx.get(reminder).status, ContractStatus::Approved);
}
