//! Reporting batch: weekly statistics and the monthly product summary.

mod common;

use common::{at, date, Fixture};
use insurance_core::{
    report_batch::ReportBatch,
    store::NewDocumentRequest,
    types::{ContractStatus, RequestStatus},
};

fn request(number: &str, status: RequestStatus, created: (u32, u32), completed: Option<(u32, u32)>) -> NewDocumentRequest {
    NewDocumentRequest {
        request_number: number.to_string(),
        customer_id: 7,
        status,
        created_at: at(2024, created.0, created.1, 9, 0),
        follow_up_date: None,
        completed_date: completed.map(|(m, d)| date(2024, m, d)),
    }
}

/// Weekly report counts contracts and requests by status.
#[test]
fn weekly_report_aggregates() {
    let fx = Fixture::new(at(2024, 6, 10, 4, 0));
    fx.contract_for_product(1, 1_000_000.0, ContractStatus::Approved, at(2024, 1, 5, 9, 0), None, None);
    fx.contract_for_product(1, 3_000_000.0, ContractStatus::Approved, at(2024, 2, 5, 9, 0), None, None);
    fx.contract_for_product(2, 500_000.0, ContractStatus::Cancelled, at(2024, 3, 5, 9, 0), None, None);

    fx.store.insert_document_request(&request("R1", RequestStatus::Completed, (6, 1), Some((6, 4)))).unwrap();
    fx.store.insert_document_request(&request("R2", RequestStatus::Completed, (5, 1), Some((5, 2)))).unwrap();
    fx.store.insert_document_request(&request("R3", RequestStatus::New, (6, 8), None)).unwrap();

    let report = ReportBatch::new(fx.policy_store(), fx.dyn_clock()).weekly_report().unwrap();

    assert_eq!(report.contracts.total, 3);
    assert_eq!(report.contracts.by_status[&ContractStatus::Approved], 2);
    assert_eq!(report.contracts.by_status[&ContractStatus::Cancelled], 1);
    assert_eq!(report.contracts.total_insured_amount, 4_500_000.0);
    assert_eq!(report.contracts.average_monthly_premium, Some(0.0));

    assert_eq!(report.requests.total, 3);
    assert_eq!(report.requests.by_status[&RequestStatus::Completed], 2);
    assert_eq!(report.requests.opened_last_week, 1);
    assert_eq!(report.requests.average_processing_days, Some(2.0));
}

/// Monthly report only covers contracts created in the current month.
#[test]
fn monthly_report_groups_current_month_by_product() {
    let fx = Fixture::new(at(2024, 7, 1, 5, 0));
    fx.contract_for_product(1, 1_000_000.0, ContractStatus::UnderReview, at(2024, 7, 1, 0, 30), None, None);
    fx.contract_for_product(1, 2_000_000.0, ContractStatus::UnderReview, at(2024, 7, 1, 1, 0), None, None);
    fx.contract_for_product(4, 700_000.0, ContractStatus::UnderReview, at(2024, 7, 1, 2, 0), None, None);
    fx.contract_for_product(1, 9_000_000.0, ContractStatus::Approved, at(2024, 6, 30, 23, 0), None, None);

    let report = ReportBatch::new(fx.policy_store(), fx.dyn_clock()).monthly_report().unwrap();
    assert_eq!((report.year, report.month), (2024, 7));
    assert_eq!(report.products.len(), 2);
    assert_eq!(report.products[0].product_id, 1);
    assert_eq!(report.products[0].contracts, 2);
    assert_eq!(report.products[0].total_insured_amount, 3_000_000.0);
    assert_eq!(report.products[1].product_id, 4);
}
