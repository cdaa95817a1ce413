#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use sportschool_api::db::memory::InMemoryStore;
use sportschool_api::models::child::{BloodType, Child, Sex, StagedChild, NO_MEDICAL_NOTES};
use sportschool_api::models::payment::{Payment, PaymentConcept};
use sportschool_api::services::lifecycle::{LifecycleService, LifecycleSettings};
use sportschool_api::services::notifications::NotificationSink;
use sportschool_api::services::qr::{QrImage, QrIssuer};
use sportschool_api::services::store::LifecycleStore;

pub const SCHOOL: &str = "tigres";

/// Issues a deterministic image and counts calls.
#[derive(Default)]
pub struct FakeQr {
    pub calls: AtomicUsize,
}

#[async_trait]
impl QrIssuer for FakeQr {
    async fn issue(&self, payload: &str, _owner_id: Uuid) -> anyhow::Result<QrImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(QrImage {
            image_ref: format!("qr://{payload}"),
            digest: "00".repeat(32),
        })
    }
}

pub struct FailingQr;

#[async_trait]
impl QrIssuer for FailingQr {
    async fn issue(&self, _payload: &str, _owner_id: Uuid) -> anyhow::Result<QrImage> {
        anyhow::bail!("renderer returned 503")
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowQr;

#[async_trait]
impl QrIssuer for SlowQr {
    async fn issue(&self, _payload: &str, _owner_id: Uuid) -> anyhow::Result<QrImage> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::bail!("unreachable")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub school: String,
    pub guardian_id: Uuid,
    pub message: String,
    pub link_hint: Option<String>,
}

/// Records every notification; optionally fails for one guardian.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_for: Option<Uuid>,
}

impl RecordingSink {
    pub fn failing_for(guardian_id: Uuid) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_for: Some(guardian_id),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        school: &str,
        guardian_id: Uuid,
        message: &str,
        link_hint: Option<&str>,
    ) -> anyhow::Result<()> {
        if self.fail_for == Some(guardian_id) {
            anyhow::bail!("no device registered");
        }
        self.sent.lock().unwrap().push(Sent {
            school: school.to_string(),
            guardian_id,
            message: message.to_string(),
            link_hint: link_hint.map(str::to_string),
        });
        Ok(())
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub sink: Arc<RecordingSink>,
    pub service: Arc<LifecycleService>,
}

/// A service over any store, with test settings.
pub fn service_over(
    store: Arc<dyn LifecycleStore>,
    qr: Arc<dyn QrIssuer>,
    sink: Arc<RecordingSink>,
) -> Arc<LifecycleService> {
    Arc::new(LifecycleService::new(
        store,
        qr,
        sink,
        LifecycleSettings {
            app_base_url: "https://escuela.test".into(),
            qr_timeout: Duration::from_secs(5),
        },
    ))
}

pub async fn harness_with_qr(qr: Arc<dyn QrIssuer>) -> Harness {
    let store = InMemoryStore::new();
    store.add_school(SCHOOL, "Tigres FC", true).await;
    let sink = Arc::new(RecordingSink::default());
    let service = service_over(Arc::new(store.clone()), qr, sink.clone());
    Harness {
        store,
        sink,
        service,
    }
}

pub async fn harness() -> Harness {
    harness_with_qr(Arc::new(FakeQr::default())).await
}

pub fn staged(first_name: &str) -> StagedChild {
    StagedChild {
        first_name: first_name.to_string(),
        paternal_surname: "Hernandez".into(),
        maternal_surname: "Ruiz".into(),
        national_id: "HERA140612HJCRZN03".into(),
        birth_date: NaiveDate::from_ymd_opt(2014, 6, 12).unwrap(),
        sex: Sex::Female,
        blood_type: BloodType::APositive,
        residence_state: "Jalisco".into(),
        municipality: "Guadalajara".into(),
        postal_code: "44100".into(),
        jersey_number: 7,
        allergies: NO_MEDICAL_NOTES.into(),
        surgeries: NO_MEDICAL_NOTES.into(),
        conditions: NO_MEDICAL_NOTES.into(),
        father_name: "Carlos Hernandez".into(),
        mother_name: "Ana Ruiz".into(),
        phone: "3398765432".into(),
        wants_uniform: false,
    }
}

/// A child already enrolled in [`SCHOOL`], inserted without going through approval.
pub async fn seed_child(store: &InMemoryStore, guardian_id: Uuid, name: &str, fee: i64) -> Child {
    let now = Utc::now();
    let child = Child {
        id: Uuid::new_v4(),
        guardian_id,
        school_slug: SCHOOL.to_string(),
        enrollment_request_id: Uuid::new_v4(),
        profile: staged(name),
        monthly_fee: Decimal::from(fee),
        uniform_charged: false,
        created_at: now,
        updated_at: now,
    };
    store.seed_child(child.clone()).await;
    child
}

pub async fn seed_monthly_payment(store: &InMemoryStore, child: &Child, month: i32, year: i32) {
    store
        .seed_payment(Payment {
            id: Uuid::new_v4(),
            guardian_id: child.guardian_id,
            school_slug: child.school_slug.clone(),
            child_id: child.id,
            amount: child.monthly_fee,
            concept: PaymentConcept::Monthly,
            period_month: month,
            period_year: year,
            paid_at: Utc::now(),
            payment_request_id: None,
            processed_by: Uuid::new_v4(),
        })
        .await;
}
