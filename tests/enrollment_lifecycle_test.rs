mod common;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::task::JoinSet;
use uuid::Uuid;

use common::{harness, harness_with_qr, staged, FailingQr, SlowQr, SCHOOL};
use sportschool_api::error::AppError;
use sportschool_api::models::auth::AdminCapability;
use sportschool_api::models::enrollment::{EnrollmentDecision, EnrollmentStatus};
use sportschool_api::services::store::{LifecycleStore, RequestFilter};

#[tokio::test]
async fn create_persists_pending_request_with_qr() {
    let h = harness().await;
    let guardian = Uuid::new_v4();

    let request = h
        .service
        .create_enrollment_request(guardian, SCHOOL, vec![staged("Sofia")], Utc::now())
        .await
        .unwrap();

    assert_eq!(request.status, EnrollmentStatus::Pending);
    assert_eq!(
        request.qr_image_ref,
        format!("qr://https://escuela.test/admin/enrollment-requests/{}", request.id)
    );
    assert!(request.child_ids.is_empty());
    assert_eq!(h.store.qr_record_count().await, 1);

    let stored = h.service.get_enrollment_request(SCHOOL, request.id).await.unwrap();
    assert_eq!(stored.qr_code_id, request.qr_code_id);
}

#[tokio::test]
async fn qr_failure_persists_nothing() {
    let h = harness_with_qr(Arc::new(FailingQr)).await;

    let err = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![staged("Sofia")], Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DependencyFailure(_)));
    assert_eq!(h.store.qr_record_count().await, 0);
    let all = h
        .service
        .list_enrollment_requests(SCHOOL, RequestFilter::default())
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test(start_paused = true)]
async fn qr_timeout_persists_nothing() {
    let h = harness_with_qr(Arc::new(SlowQr)).await;

    let err = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![staged("Sofia")], Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DependencyFailure(ref m) if m.contains("timed out")));
    assert_eq!(h.store.qr_record_count().await, 0);
}

#[tokio::test]
async fn empty_or_invalid_children_are_rejected() {
    let h = harness().await;

    let err = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![], Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "children"));

    let mut bad = staged("Sofia");
    bad.postal_code = "4410".into();
    let err = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![staged("Ana"), bad], Utc::now())
        .await
        .unwrap_err();
    assert!(
        matches!(err, AppError::Validation { ref field, .. } if field == "children[1].postal_code")
    );
    assert_eq!(h.store.qr_record_count().await, 0);
}

#[tokio::test]
async fn unknown_and_inactive_schools() {
    let h = harness().await;
    h.store.add_school("cerrada", "Cerrada", false).await;

    let err = h
        .service
        .create_enrollment_request(Uuid::new_v4(), "nowhere", vec![staged("Sofia")], Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h
        .service
        .create_enrollment_request(Uuid::new_v4(), "cerrada", vec![staged("Sofia")], Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "school"));
}

#[tokio::test]
async fn approval_creates_children_in_staged_order() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);

    let request = h
        .service
        .create_enrollment_request(
            guardian,
            SCHOOL,
            vec![staged("Ana"), staged("Beto"), staged("Caro")],
            Utc::now(),
        )
        .await
        .unwrap();

    let resolved = h
        .service
        .resolve_enrollment(
            &admin,
            SCHOOL,
            request.id,
            EnrollmentDecision::Approved,
            vec![dec!(250), dec!(200), dec!(180)],
            Some("welcome".into()),
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(resolved.status, EnrollmentStatus::Approved);
    assert_eq!(resolved.total_price, Some(dec!(630)));
    assert_eq!(resolved.resolved_by, Some(admin.admin_id()));
    assert_eq!(resolved.child_ids.len(), 3);

    let expected = [("Ana", dec!(250)), ("Beto", dec!(200)), ("Caro", dec!(180))];
    for (child_id, (name, fee)) in resolved.child_ids.iter().zip(expected) {
        let child = h.store.get_child(SCHOOL, *child_id).await.unwrap().unwrap();
        assert_eq!(child.profile.first_name, name);
        assert_eq!(child.monthly_fee, fee);
        assert_eq!(child.guardian_id, guardian);
        assert_eq!(child.enrollment_request_id, request.id);
    }

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].guardian_id, guardian);
}

#[tokio::test]
async fn approval_price_checks() {
    let h = harness().await;
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let request = h
        .service
        .create_enrollment_request(
            Uuid::new_v4(),
            SCHOOL,
            vec![staged("Ana"), staged("Beto")],
            Utc::now(),
        )
        .await
        .unwrap();

    let err = h
        .service
        .resolve_enrollment(
            &admin,
            SCHOOL,
            request.id,
            EnrollmentDecision::Approved,
            vec![dec!(250)],
            None,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "prices"));

    let err = h
        .service
        .resolve_enrollment(
            &admin,
            SCHOOL,
            request.id,
            EnrollmentDecision::Approved,
            vec![dec!(250), Decimal::ZERO],
            None,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "prices[1]"));

    let still = h.service.get_enrollment_request(SCHOOL, request.id).await.unwrap();
    assert_eq!(still.status, EnrollmentStatus::Pending);
    assert!(h.store.list_children(SCHOOL).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejection_creates_no_children_and_is_final() {
    let h = harness().await;
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let request = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![staged("Ana")], Utc::now())
        .await
        .unwrap();

    let rejected = h
        .service
        .resolve_enrollment(
            &admin,
            SCHOOL,
            request.id,
            EnrollmentDecision::Rejected,
            vec![],
            Some("no space".into()),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, EnrollmentStatus::Rejected);
    assert_eq!(rejected.admin_notes.as_deref(), Some("no space"));
    assert!(rejected.price_assignments.is_none());

    let err = h
        .service
        .resolve_enrollment(
            &admin,
            SCHOOL,
            request.id,
            EnrollmentDecision::Approved,
            vec![dec!(250)],
            None,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(h.store.list_children(SCHOOL).await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_of_another_school_is_forbidden() {
    let h = harness().await;
    let request = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![staged("Ana")], Utc::now())
        .await
        .unwrap();

    let outsider = AdminCapability::new(Uuid::new_v4(), "pumas");
    let err = h
        .service
        .resolve_enrollment(
            &outsider,
            SCHOOL,
            request.id,
            EnrollmentDecision::Approved,
            vec![dec!(250)],
            None,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, AppError::Forbidden(ref message) if message.contains("'pumas'")),
        "got {err}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_resolve_exactly_once() {
    let h = harness().await;
    let request = h
        .service
        .create_enrollment_request(
            Uuid::new_v4(),
            SCHOOL,
            vec![staged("Ana"), staged("Beto")],
            Utc::now(),
        )
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let service = h.service.clone();
        let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
        tasks.spawn(async move {
            service
                .resolve_enrollment(
                    &admin,
                    SCHOOL,
                    request.id,
                    EnrollmentDecision::Approved,
                    vec![dec!(200), dec!(200)],
                    None,
                    Utc::now(),
                )
                .await
        });
    }

    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, AppError::InvalidState(_)), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.store.list_children(SCHOOL).await.unwrap().len(), 2);
}

#[tokio::test]
async fn quote_counts_existing_and_staged_siblings() {
    let h = harness().await;
    let guardian = Uuid::new_v4();

    let quote = h.service.quote_enrollment(SCHOOL, guardian, 1).await.unwrap();
    assert_eq!(quote.sibling_count, 1);
    assert_eq!(quote.monthly_fee_per_child, dec!(250));
    assert_eq!(quote.uniform_fee, dec!(650));

    common::seed_child(&h.store, guardian, "Ana", 250).await;
    let quote = h.service.quote_enrollment(SCHOOL, guardian, 1).await.unwrap();
    assert_eq!(quote.sibling_count, 2);
    assert_eq!(quote.monthly_fee_per_child, dec!(200));
}

#[tokio::test]
async fn approval_rejects_prices_finer_than_cents() {
    let h = harness().await;
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let request = h
        .service
        .create_enrollment_request(Uuid::new_v4(), SCHOOL, vec![staged("Ana")], Utc::now())
        .await
        .unwrap();

    let err = h
        .service
        .resolve_enrollment(
            &admin,
            SCHOOL,
            request.id,
            EnrollmentDecision::Approved,
            vec![dec!(199.999)],
            None,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "prices[0]"));

    let still = h.service.get_enrollment_request(SCHOOL, request.id).await.unwrap();
    assert_eq!(still.status, EnrollmentStatus::Pending);
    assert!(h.store.list_children(SCHOOL).await.unwrap().is_empty());
}
