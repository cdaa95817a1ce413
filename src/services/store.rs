use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    child::Child,
    enrollment::{EnrollmentRequest, EnrollmentStatus},
    payment::{Payment, PaymentConcept, PaymentRequest, PaymentRequestStatus},
    qr::QrRecord,
    school::School,
};

/// Optional filters for request listings.
#[derive(Debug, Clone, Copy)]
pub struct RequestFilter<S> {
    pub status: Option<S>,
    pub guardian_id: Option<Uuid>,
}

impl<S> Default for RequestFilter<S> {
    fn default() -> Self {
        Self {
            status: None,
            guardian_id: None,
        }
    }
}

/// Everything written when an enrollment request leaves `pending`.
#[derive(Debug, Clone)]
pub struct EnrollmentResolution {
    pub request_id: Uuid,
    pub status: EnrollmentStatus,
    /// Index-aligned with the request's staged children; empty on rejection.
    pub children: Vec<Child>,
    pub price_assignments: Option<Vec<Decimal>>,
    pub total_price: Option<Decimal>,
    pub notes: Option<String>,
    pub resolved_by: Uuid,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub request_id: Uuid,
    pub payments: Vec<Payment>,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub resolved_by: Uuid,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentCancellation {
    pub request_id: Uuid,
    pub notes: Option<String>,
    pub resolved_by: Uuid,
    pub resolved_at: DateTime<Utc>,
}

/// Persistence port for requests, children and the payment ledger.
///
/// The `insert_*`, `resolve_*`, `settle_*` and `cancel_*` operations are each
/// all-or-nothing. The status check and transition of a request happen in the
/// same atomic step, so when two callers race to resolve one request exactly
/// one of them succeeds and the other gets `AppError::InvalidState`.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    async fn find_school(&self, slug: &str) -> AppResult<Option<School>>;
    async fn list_active_schools(&self) -> AppResult<Vec<School>>;

    /// Persists the QR record and the pending request together.
    async fn insert_enrollment_request(
        &self,
        request: &EnrollmentRequest,
        qr: &QrRecord,
    ) -> AppResult<()>;
    async fn get_enrollment_request(
        &self,
        school: &str,
        id: Uuid,
    ) -> AppResult<Option<EnrollmentRequest>>;
    async fn list_enrollment_requests(
        &self,
        school: &str,
        filter: RequestFilter<EnrollmentStatus>,
    ) -> AppResult<Vec<EnrollmentRequest>>;
    /// Transitions a pending request and materializes its children.
    async fn resolve_enrollment(
        &self,
        school: &str,
        resolution: EnrollmentResolution,
    ) -> AppResult<EnrollmentRequest>;

    async fn insert_payment_request(
        &self,
        request: &PaymentRequest,
        qr: &QrRecord,
    ) -> AppResult<()>;
    async fn get_payment_request(
        &self,
        school: &str,
        id: Uuid,
    ) -> AppResult<Option<PaymentRequest>>;
    async fn list_payment_requests(
        &self,
        school: &str,
        filter: RequestFilter<PaymentRequestStatus>,
    ) -> AppResult<Vec<PaymentRequest>>;
    /// Appends the ledger entries and marks the request settled. Uniform
    /// entries flip the child's `uniform_charged` flag; a child already
    /// charged fails the whole settlement with a validation error.
    async fn settle_payment_request(
        &self,
        school: &str,
        settlement: PaymentSettlement,
    ) -> AppResult<PaymentRequest>;
    async fn cancel_payment_request(
        &self,
        school: &str,
        cancellation: PaymentCancellation,
    ) -> AppResult<PaymentRequest>;

    async fn get_child(&self, school: &str, id: Uuid) -> AppResult<Option<Child>>;
    async fn list_children(&self, school: &str) -> AppResult<Vec<Child>>;
    async fn children_for_guardian(&self, school: &str, guardian_id: Uuid)
        -> AppResult<Vec<Child>>;
    async fn update_monthly_fee(&self, school: &str, child_id: Uuid, fee: Decimal)
        -> AppResult<()>;

    async fn payments_for_child(&self, school: &str, child_id: Uuid) -> AppResult<Vec<Payment>>;
    /// Ids of children holding at least one payment of `concept` for the period.
    async fn children_paid_for(
        &self,
        school: &str,
        concept: PaymentConcept,
        month: i32,
        year: i32,
    ) -> AppResult<HashSet<Uuid>>;
}
