mod common;

use chrono::{Datelike, Local, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{harness, seed_child, SCHOOL};
use sportschool_api::error::AppError;
use sportschool_api::models::auth::AdminCapability;
use sportschool_api::models::payment::{
    PaymentConcept, PaymentRequestStatus, PaymentWindow, SettlementItem,
};
use sportschool_api::services::reconciliation;
use sportschool_api::services::store::LifecycleStore;

fn window() -> PaymentWindow {
    PaymentWindow {
        start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
    }
}

fn item(child_id: Uuid, amount: rust_decimal::Decimal, concept: PaymentConcept) -> SettlementItem {
    SettlementItem {
        child_id,
        amount,
        concept,
    }
}

#[tokio::test]
async fn create_caches_names_and_outstanding_amounts() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let ana = seed_child(&h.store, guardian, "Ana", 200).await;
    let mut beto = seed_child(&h.store, guardian, "Beto", 200).await;
    beto.profile.wants_uniform = true;
    h.store.seed_child(beto.clone()).await;

    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id, beto.id], window(), Utc::now())
        .await
        .unwrap();

    assert_eq!(request.status, PaymentRequestStatus::Pending);
    assert_eq!(request.children[0].display_name, "Ana Hernandez Ruiz");
    assert_eq!(request.children[0].amount, dec!(200));
    assert_eq!(request.children[1].amount, dec!(850));
    assert_eq!(request.total_amount, dec!(1050));
    assert_eq!(h.store.qr_record_count().await, 1);
}

#[tokio::test]
async fn create_rejects_bad_child_lists() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let ana = seed_child(&h.store, guardian, "Ana", 250).await;
    let stranger = seed_child(&h.store, Uuid::new_v4(), "Zoe", 250).await;

    let err = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![], window(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "child_ids"));

    let err = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id, ana.id], window(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "child_ids[1]"));

    let err = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id, stranger.id], window(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "child_ids[1]"));

    let err = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![Uuid::new_v4()], window(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let inverted = PaymentWindow {
        start: window().end,
        end: window().start,
    };
    let err = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], inverted, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "window"));

    assert_eq!(h.store.qr_record_count().await, 0);
}

#[tokio::test]
async fn settlement_records_one_payment_per_item_for_current_period() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let ana = seed_child(&h.store, guardian, "Ana", 200).await;
    let beto = seed_child(&h.store, guardian, "Beto", 200).await;

    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id, beto.id], window(), Utc::now())
        .await
        .unwrap();

    let now = Local.with_ymd_and_hms(2025, 3, 3, 17, 0, 0).unwrap();
    let settled = h
        .service
        .resolve_payment(
            &admin,
            SCHOOL,
            request.id,
            vec![
                item(ana.id, dec!(200), PaymentConcept::Monthly),
                item(beto.id, dec!(200), PaymentConcept::Monthly),
                item(beto.id, dec!(50), PaymentConcept::Other),
            ],
            Some("cash".into()),
            dec!(450),
            now,
        )
        .await
        .unwrap();

    assert_eq!(settled.status, PaymentRequestStatus::Settled);
    assert_eq!(settled.total_amount, dec!(450));
    assert_eq!(settled.resolved_by, Some(admin.admin_id()));

    let payments = h.store.all_payments().await;
    assert_eq!(payments.len(), 3);
    for p in &payments {
        assert_eq!((p.period_month, p.period_year), (now.month() as i32, now.year()));
        assert_eq!(p.payment_request_id, Some(request.id));
        assert_eq!(p.guardian_id, guardian);
    }

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].link_hint, Some(format!("/payment-requests/{}", request.id)));
}

#[tokio::test]
async fn settlement_validation_leaves_request_pending() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let ana = seed_child(&h.store, guardian, "Ana", 250).await;
    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();

    let cases = [
        (vec![], dec!(0), "items"),
        (
            vec![item(Uuid::new_v4(), dec!(250), PaymentConcept::Monthly)],
            dec!(250),
            "items[0].child_id",
        ),
        (
            vec![item(ana.id, dec!(0), PaymentConcept::Monthly)],
            dec!(0),
            "items[0].amount",
        ),
        (
            vec![item(ana.id, dec!(650), PaymentConcept::Uniform)],
            dec!(650),
            "items[0].concept",
        ),
        (
            vec![item(ana.id, dec!(250), PaymentConcept::Monthly)],
            dec!(300),
            "declared_total",
        ),
    ];

    for (items, declared_total, expected_field) in cases {
        let err = h
            .service
            .resolve_payment(&admin, SCHOOL, request.id, items, None, declared_total, Local::now())
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::Validation { ref field, .. } if field == expected_field),
            "expected {expected_field}, got {err}"
        );
    }

    assert!(h.store.all_payments().await.is_empty());
    let still = h.service.get_payment_request(SCHOOL, request.id).await.unwrap();
    assert_eq!(still.status, PaymentRequestStatus::Pending);
}

#[tokio::test]
async fn uniform_is_charged_only_once() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let mut ana = seed_child(&h.store, guardian, "Ana", 250).await;
    ana.profile.wants_uniform = true;
    h.store.seed_child(ana.clone()).await;

    let first = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();
    h.service
        .resolve_payment(
            &admin,
            SCHOOL,
            first.id,
            vec![
                item(ana.id, dec!(250), PaymentConcept::Monthly),
                item(ana.id, dec!(650), PaymentConcept::Uniform),
            ],
            None,
            dec!(900),
            Local::now(),
        )
        .await
        .unwrap();

    let charged = h.store.get_child(SCHOOL, ana.id).await.unwrap().unwrap();
    assert!(charged.uniform_charged);

    let second = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();
    assert_eq!(second.total_amount, dec!(250));

    let err = h
        .service
        .resolve_payment(
            &admin,
            SCHOOL,
            second.id,
            vec![item(ana.id, dec!(650), PaymentConcept::Uniform)],
            None,
            dec!(650),
            Local::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(h.store.all_payments().await.len(), 2);
}

#[tokio::test]
async fn settled_request_cannot_be_settled_or_cancelled_again() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let ana = seed_child(&h.store, guardian, "Ana", 250).await;
    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();

    let items = || vec![item(ana.id, dec!(250), PaymentConcept::Monthly)];
    h.service
        .resolve_payment(&admin, SCHOOL, request.id, items(), None, dec!(250), Local::now())
        .await
        .unwrap();

    let err = h
        .service
        .resolve_payment(&admin, SCHOOL, request.id, items(), None, dec!(250), Local::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = h
        .service
        .cancel_payment_request(SCHOOL, request.id, guardian, None, None, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(h.store.all_payments().await.len(), 1);
}

#[tokio::test]
async fn cancellation_rules() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let ana = seed_child(&h.store, guardian, "Ana", 250).await;

    let own = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();

    let err = h
        .service
        .cancel_payment_request(SCHOOL, own.id, Uuid::new_v4(), None, None, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let cancelled = h
        .service
        .cancel_payment_request(SCHOOL, own.id, guardian, None, Some("typo".into()), Utc::now())
        .await
        .unwrap();
    assert_eq!(cancelled.status, PaymentRequestStatus::Cancelled);
    assert!(h.sink.sent().is_empty());

    let other = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    h.service
        .cancel_payment_request(SCHOOL, other.id, admin.admin_id(), Some(&admin), None, Utc::now())
        .await
        .unwrap();
    assert_eq!(h.sink.sent().len(), 1);
}

#[tokio::test]
async fn payments_for_unknown_child_is_not_found() {
    let h = harness().await;
    let err = h
        .service
        .payments_for_child(SCHOOL, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn settlement_must_cover_every_child_of_the_request() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let ana = seed_child(&h.store, guardian, "Ana", 200).await;
    let beto = seed_child(&h.store, guardian, "Beto", 200).await;
    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id, beto.id], window(), Utc::now())
        .await
        .unwrap();

    let err = h
        .service
        .resolve_payment(
            &admin,
            SCHOOL,
            request.id,
            vec![item(ana.id, dec!(200), PaymentConcept::Monthly)],
            None,
            dec!(200),
            Local::now(),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, AppError::Validation { ref field, ref message } if field == "items" && message.contains("Beto")),
        "got {err}"
    );

    let err = h
        .service
        .resolve_payment(
            &admin,
            SCHOOL,
            request.id,
            vec![
                item(ana.id, dec!(200), PaymentConcept::Monthly),
                item(ana.id, dec!(200), PaymentConcept::Monthly),
                item(beto.id, dec!(200), PaymentConcept::Monthly),
            ],
            None,
            dec!(600),
            Local::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "items[1].concept"));

    assert!(h.store.all_payments().await.is_empty());
    let still = h.service.get_payment_request(SCHOOL, request.id).await.unwrap();
    assert_eq!(still.status, PaymentRequestStatus::Pending);
}

#[tokio::test]
async fn settlement_rejects_sub_cent_amounts() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let ana = seed_child(&h.store, guardian, "Ana", 250).await;
    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();

    let cases = [
        (dec!(0.001), dec!(0.001), "items[0].amount"),
        (dec!(250), dec!(250.001), "declared_total"),
    ];
    for (amount, declared_total, expected_field) in cases {
        let err = h
            .service
            .resolve_payment(
                &admin,
                SCHOOL,
                request.id,
                vec![item(ana.id, amount, PaymentConcept::Monthly)],
                None,
                declared_total,
                Local::now(),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::Validation { ref field, .. } if field == expected_field),
            "expected {expected_field}, got {err}"
        );
    }

    // Trailing zeros are still two decimals.
    h.service
        .resolve_payment(
            &admin,
            SCHOOL,
            request.id,
            vec![item(ana.id, dec!(250.000), PaymentConcept::Monthly)],
            None,
            dec!(250.00),
            Local::now(),
        )
        .await
        .unwrap();
    assert_eq!(h.store.all_payments().await.len(), 1);
}

#[tokio::test]
async fn late_night_settlement_counts_for_the_local_month() {
    let h = harness().await;
    let guardian = Uuid::new_v4();
    let admin = AdminCapability::new(Uuid::new_v4(), SCHOOL);
    let ana = seed_child(&h.store, guardian, "Ana", 250).await;
    let request = h
        .service
        .create_payment_request(guardian, SCHOOL, vec![ana.id], window(), Utc::now())
        .await
        .unwrap();

    let now = Local.with_ymd_and_hms(2025, 1, 31, 23, 30, 0).unwrap();
    h.service
        .resolve_payment(
            &admin,
            SCHOOL,
            request.id,
            vec![item(ana.id, dec!(250), PaymentConcept::Monthly)],
            None,
            dec!(250),
            now,
        )
        .await
        .unwrap();

    let payments = h.store.all_payments().await;
    assert_eq!((payments[0].period_month, payments[0].period_year), (1, 2025));

    let unpaid = reconciliation::scan_pending_payments(&h.store, SCHOOL, now.date_naive())
        .await
        .unwrap();
    assert!(unpaid.iter().all(|u| u.child_id != ana.id));
}
