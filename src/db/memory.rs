use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    child::Child,
    enrollment::{EnrollmentRequest, EnrollmentStatus},
    payment::{Payment, PaymentConcept, PaymentRequest, PaymentRequestStatus},
    qr::QrRecord,
    school::School,
};
use crate::services::store::{
    EnrollmentResolution, LifecycleStore, PaymentCancellation, PaymentSettlement, RequestFilter,
};

#[derive(Default)]
struct State {
    schools: HashMap<String, School>,
    qr_codes: HashMap<Uuid, QrRecord>,
    enrollments: HashMap<Uuid, EnrollmentRequest>,
    payment_requests: HashMap<Uuid, PaymentRequest>,
    children: HashMap<Uuid, Child>,
    payments: Vec<Payment>,
}

/// A process-local store.
///
/// Every operation takes the one mutex guarding all maps, validates, and only
/// then mutates, which gives each trait method the same all-or-nothing
/// behaviour as a database transaction. Used by tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a school and returns it.
    pub async fn add_school(&self, slug: &str, name: &str, is_active: bool) -> School {
        let now = Utc::now();
        let school = School {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            is_active,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        state.schools.insert(slug.to_string(), school.clone());
        school
    }

    pub async fn qr_record_count(&self) -> usize {
        self.state.lock().await.qr_codes.len()
    }

    pub async fn all_payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    /// Inserts a child directly, bypassing the approval path. Test seeding only.
    pub async fn seed_child(&self, child: Child) {
        self.state.lock().await.children.insert(child.id, child);
    }

    /// Appends a ledger entry directly. Test seeding only.
    pub async fn seed_payment(&self, payment: Payment) {
        self.state.lock().await.payments.push(payment);
    }
}

fn not_pending(status: impl std::fmt::Display) -> AppError {
    AppError::InvalidState(format!("request is already {status}"))
}

#[async_trait]
impl LifecycleStore for InMemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn find_school(&self, slug: &str) -> AppResult<Option<School>> {
        Ok(self.state.lock().await.schools.get(slug).cloned())
    }

    async fn list_active_schools(&self) -> AppResult<Vec<School>> {
        let state = self.state.lock().await;
        let mut schools: Vec<School> = state
            .schools
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        schools.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(schools)
    }

    async fn insert_enrollment_request(
        &self,
        request: &EnrollmentRequest,
        qr: &QrRecord,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.enrollments.contains_key(&request.id) || state.qr_codes.contains_key(&qr.id) {
            return Err(AppError::Conflict(format!("request {} already exists", request.id)));
        }
        state.qr_codes.insert(qr.id, qr.clone());
        state.enrollments.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_enrollment_request(
        &self,
        school: &str,
        id: Uuid,
    ) -> AppResult<Option<EnrollmentRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .get(&id)
            .filter(|r| r.school_slug == school)
            .cloned())
    }

    async fn list_enrollment_requests(
        &self,
        school: &str,
        filter: RequestFilter<EnrollmentStatus>,
    ) -> AppResult<Vec<EnrollmentRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<EnrollmentRequest> = state
            .enrollments
            .values()
            .filter(|r| r.school_slug == school)
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.guardian_id.map_or(true, |g| r.guardian_id == g))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(requests)
    }

    async fn resolve_enrollment(
        &self,
        school: &str,
        resolution: EnrollmentResolution,
    ) -> AppResult<EnrollmentRequest> {
        let mut state = self.state.lock().await;
        let request = state
            .enrollments
            .get(&resolution.request_id)
            .filter(|r| r.school_slug == school)
            .ok_or_else(|| AppError::not_found("enrollment request"))?;
        if request.status != EnrollmentStatus::Pending {
            return Err(not_pending(request.status));
        }

        let child_ids: Vec<Uuid> = resolution.children.iter().map(|c| c.id).collect();
        for child in resolution.children {
            state.children.insert(child.id, child);
        }

        let request = state
            .enrollments
            .get_mut(&resolution.request_id)
            .ok_or_else(|| AppError::not_found("enrollment request"))?;
        request.status = resolution.status;
        request.child_ids = child_ids;
        request.price_assignments = resolution.price_assignments;
        request.total_price = resolution.total_price;
        request.admin_notes = resolution.notes;
        request.resolved_by = Some(resolution.resolved_by);
        request.resolved_at = Some(resolution.resolved_at);
        Ok(request.clone())
    }

    async fn insert_payment_request(
        &self,
        request: &PaymentRequest,
        qr: &QrRecord,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.payment_requests.contains_key(&request.id) || state.qr_codes.contains_key(&qr.id)
        {
            return Err(AppError::Conflict(format!("request {} already exists", request.id)));
        }
        state.qr_codes.insert(qr.id, qr.clone());
        state.payment_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_payment_request(
        &self,
        school: &str,
        id: Uuid,
    ) -> AppResult<Option<PaymentRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .payment_requests
            .get(&id)
            .filter(|r| r.school_slug == school)
            .cloned())
    }

    async fn list_payment_requests(
        &self,
        school: &str,
        filter: RequestFilter<PaymentRequestStatus>,
    ) -> AppResult<Vec<PaymentRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<PaymentRequest> = state
            .payment_requests
            .values()
            .filter(|r| r.school_slug == school)
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.guardian_id.map_or(true, |g| r.guardian_id == g))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(requests)
    }

    async fn settle_payment_request(
        &self,
        school: &str,
        settlement: PaymentSettlement,
    ) -> AppResult<PaymentRequest> {
        let mut state = self.state.lock().await;
        let request = state
            .payment_requests
            .get(&settlement.request_id)
            .filter(|r| r.school_slug == school)
            .ok_or_else(|| AppError::not_found("payment request"))?;
        if request.status != PaymentRequestStatus::Pending {
            return Err(not_pending(request.status));
        }

        // Check every uniform charge before touching anything.
        let mut uniform_ids = HashSet::new();
        for payment in settlement
            .payments
            .iter()
            .filter(|p| p.concept == PaymentConcept::Uniform)
        {
            let due = state
                .children
                .get(&payment.child_id)
                .map_or(false, |c| c.uniform_due());
            if !due || !uniform_ids.insert(payment.child_id) {
                return Err(AppError::validation(
                    "items",
                    format!("uniform fee is not due for child {}", payment.child_id),
                ));
            }
        }

        for id in uniform_ids {
            if let Some(child) = state.children.get_mut(&id) {
                child.uniform_charged = true;
                child.updated_at = settlement.resolved_at;
            }
        }
        state.payments.extend(settlement.payments);

        let request = state
            .payment_requests
            .get_mut(&settlement.request_id)
            .ok_or_else(|| AppError::not_found("payment request"))?;
        request.status = PaymentRequestStatus::Settled;
        request.total_amount = settlement.total_amount;
        request.notes = settlement.notes;
        request.resolved_by = Some(settlement.resolved_by);
        request.resolved_at = Some(settlement.resolved_at);
        Ok(request.clone())
    }

    async fn cancel_payment_request(
        &self,
        school: &str,
        cancellation: PaymentCancellation,
    ) -> AppResult<PaymentRequest> {
        let mut state = self.state.lock().await;
        let request = state
            .payment_requests
            .get_mut(&cancellation.request_id)
            .filter(|r| r.school_slug == school)
            .ok_or_else(|| AppError::not_found("payment request"))?;
        if request.status != PaymentRequestStatus::Pending {
            return Err(not_pending(request.status));
        }
        request.status = PaymentRequestStatus::Cancelled;
        request.notes = cancellation.notes;
        request.resolved_by = Some(cancellation.resolved_by);
        request.resolved_at = Some(cancellation.resolved_at);
        Ok(request.clone())
    }

    async fn get_child(&self, school: &str, id: Uuid) -> AppResult<Option<Child>> {
        let state = self.state.lock().await;
        Ok(state
            .children
            .get(&id)
            .filter(|c| c.school_slug == school)
            .cloned())
    }

    async fn list_children(&self, school: &str) -> AppResult<Vec<Child>> {
        let state = self.state.lock().await;
        let mut children: Vec<Child> = state
            .children
            .values()
            .filter(|c| c.school_slug == school)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn children_for_guardian(
        &self,
        school: &str,
        guardian_id: Uuid,
    ) -> AppResult<Vec<Child>> {
        let mut children = self.list_children(school).await?;
        children.retain(|c| c.guardian_id == guardian_id);
        Ok(children)
    }

    async fn update_monthly_fee(&self, school: &str, child_id: Uuid, fee: Decimal) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let child = state
            .children
            .get_mut(&child_id)
            .filter(|c| c.school_slug == school)
            .ok_or_else(|| AppError::not_found("child"))?;
        child.monthly_fee = fee;
        child.updated_at = Utc::now();
        Ok(())
    }

    async fn payments_for_child(&self, school: &str, child_id: Uuid) -> AppResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .iter()
            .filter(|p| p.school_slug == school && p.child_id == child_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.paid_at.cmp(&b.paid_at));
        Ok(payments)
    }

    async fn children_paid_for(
        &self,
        school: &str,
        concept: PaymentConcept,
        month: i32,
        year: i32,
    ) -> AppResult<HashSet<Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| {
                p.school_slug == school
                    && p.concept == concept
                    && p.period_month == month
                    && p.period_year == year
            })
            .map(|p| p.child_id)
            .collect())
    }
}
