use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::db::school::schema_name;
use crate::error::{AppError, AppResult};
use crate::models::{
    child::{Child, StagedChild},
    enrollment::{EnrollmentRequest, EnrollmentStatus},
    payment::{
        ChildRef, Payment, PaymentConcept, PaymentRequest, PaymentRequestStatus, PaymentWindow,
    },
    qr::QrRecord,
    school::School,
};
use crate::services::store::{
    EnrollmentResolution, LifecycleStore, PaymentCancellation, PaymentSettlement, RequestFilter,
};

/// Explicit column list for enrollment requests, joined with their QR record.
const ENROLLMENT_COLS: &str = "r.id, r.guardian_id, r.school_slug, r.children, r.price_assignments,
     r.total_price, r.qr_code_id, q.image_ref AS qr_image_ref, r.status, r.child_ids,
     r.submitted_at, r.resolved_at, r.resolved_by, r.admin_notes";

const PAYMENT_REQUEST_COLS: &str = "r.id, r.guardian_id, r.school_slug, r.children, r.window_start,
     r.window_end, r.qr_code_id, q.image_ref AS qr_image_ref, r.status, r.total_amount,
     r.submitted_at, r.resolved_at, r.resolved_by, r.notes";

#[derive(FromRow)]
struct EnrollmentRow {
    id: Uuid,
    guardian_id: Uuid,
    school_slug: String,
    children: Json<Vec<StagedChild>>,
    price_assignments: Option<Json<Vec<Decimal>>>,
    total_price: Option<Decimal>,
    qr_code_id: Uuid,
    qr_image_ref: String,
    status: String,
    child_ids: Vec<Uuid>,
    submitted_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
    admin_notes: Option<String>,
}

impl TryFrom<EnrollmentRow> for EnrollmentRequest {
    type Error = anyhow::Error;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        Ok(EnrollmentRequest {
            id: row.id,
            guardian_id: row.guardian_id,
            school_slug: row.school_slug,
            children: row.children.0,
            price_assignments: row.price_assignments.map(|p| p.0),
            total_price: row.total_price,
            qr_code_id: row.qr_code_id,
            qr_image_ref: row.qr_image_ref,
            status: row.status.parse()?,
            child_ids: row.child_ids,
            submitted_at: row.submitted_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            admin_notes: row.admin_notes,
        })
    }
}

#[derive(FromRow)]
struct PaymentRequestRow {
    id: Uuid,
    guardian_id: Uuid,
    school_slug: String,
    children: Json<Vec<ChildRef>>,
    window_start: NaiveDate,
    window_end: NaiveDate,
    qr_code_id: Uuid,
    qr_image_ref: String,
    status: String,
    total_amount: Decimal,
    submitted_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
    notes: Option<String>,
}

impl TryFrom<PaymentRequestRow> for PaymentRequest {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRequestRow) -> Result<Self, Self::Error> {
        Ok(PaymentRequest {
            id: row.id,
            guardian_id: row.guardian_id,
            school_slug: row.school_slug,
            children: row.children.0,
            window: PaymentWindow {
                start: row.window_start,
                end: row.window_end,
            },
            qr_code_id: row.qr_code_id,
            qr_image_ref: row.qr_image_ref,
            status: row.status.parse()?,
            total_amount: row.total_amount,
            submitted_at: row.submitted_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            notes: row.notes,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    guardian_id: Uuid,
    school_slug: String,
    child_id: Uuid,
    amount: Decimal,
    concept: String,
    period_month: i32,
    period_year: i32,
    paid_at: DateTime<Utc>,
    payment_request_id: Option<Uuid>,
    processed_by: Uuid,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            guardian_id: row.guardian_id,
            school_slug: row.school_slug,
            child_id: row.child_id,
            amount: row.amount,
            concept: row.concept.parse()?,
            period_month: row.period_month,
            period_year: row.period_year,
            paid_at: row.paid_at,
            payment_request_id: row.payment_request_id,
            processed_by: row.processed_by,
        })
    }
}

/// Postgres-backed store. Each school lives in its own schema; every
/// multi-record write runs inside one transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional status update matched no row.
    async fn not_pending(&self, schema: &str, table: &str, what: &str, id: Uuid) -> AppError {
        let status: Result<Option<String>, sqlx::Error> = sqlx::query_scalar(&format!(
            "SELECT status FROM {schema}.{table} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match status {
            Ok(Some(status)) => AppError::InvalidState(format!("request is already {status}")),
            Ok(None) => AppError::not_found(what),
            Err(e) => AppError::Database(e),
        }
    }

    async fn insert_qr(
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        schema: &str,
        qr: &QrRecord,
    ) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {schema}.qr_codes (id, owner_id, payload, image_ref, digest, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(qr.id)
        .bind(qr.owner_id)
        .bind(&qr.payload)
        .bind(&qr.image_ref)
        .bind(&qr.digest)
        .bind(qr.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_school(&self, slug: &str) -> AppResult<Option<School>> {
        let school = sqlx::query_as::<_, School>("SELECT * FROM public.schools WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(school)
    }

    async fn list_active_schools(&self) -> AppResult<Vec<School>> {
        let schools = sqlx::query_as::<_, School>(
            "SELECT * FROM public.schools WHERE is_active = TRUE ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(schools)
    }

    async fn insert_enrollment_request(
        &self,
        request: &EnrollmentRequest,
        qr: &QrRecord,
    ) -> AppResult<()> {
        let schema = schema_name(&request.school_slug);
        let mut tx = self.pool.begin().await?;

        Self::insert_qr(&mut tx, &schema, qr).await?;

        sqlx::query(&format!(
            "INSERT INTO {schema}.enrollment_requests
                (id, guardian_id, school_slug, children, qr_code_id, status, submitted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(request.id)
        .bind(request.guardian_id)
        .bind(&request.school_slug)
        .bind(Json(&request.children))
        .bind(request.qr_code_id)
        .bind(request.status.to_string())
        .bind(request.submitted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_enrollment_request(
        &self,
        school: &str,
        id: Uuid,
    ) -> AppResult<Option<EnrollmentRequest>> {
        let schema = schema_name(school);
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {ENROLLMENT_COLS}
             FROM {schema}.enrollment_requests r
             JOIN {schema}.qr_codes q ON q.id = r.qr_code_id
             WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EnrollmentRequest::try_from).transpose()?)
    }

    async fn list_enrollment_requests(
        &self,
        school: &str,
        filter: RequestFilter<EnrollmentStatus>,
    ) -> AppResult<Vec<EnrollmentRequest>> {
        let schema = schema_name(school);
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {ENROLLMENT_COLS}
             FROM {schema}.enrollment_requests r
             JOIN {schema}.qr_codes q ON q.id = r.qr_code_id
             WHERE ($1::TEXT IS NULL OR r.status = $1)
               AND ($2::UUID IS NULL OR r.guardian_id = $2)
             ORDER BY r.submitted_at DESC"
        ))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.guardian_id)
        .fetch_all(&self.pool)
        .await?;

        let requests = rows
            .into_iter()
            .map(EnrollmentRequest::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(requests)
    }

    async fn resolve_enrollment(
        &self,
        school: &str,
        resolution: EnrollmentResolution,
    ) -> AppResult<EnrollmentRequest> {
        let schema = schema_name(school);
        let mut tx = self.pool.begin().await?;

        // Check-and-transition in one statement; a concurrent resolver waits on
        // the row lock and then no longer matches `status = 'pending'`.
        let claimed: Option<Uuid> = sqlx::query_scalar(&format!(
            "UPDATE {schema}.enrollment_requests
             SET status = $2, price_assignments = $3, total_price = $4,
                 admin_notes = $5, resolved_by = $6, resolved_at = $7
             WHERE id = $1 AND status = 'pending'
             RETURNING id"
        ))
        .bind(resolution.request_id)
        .bind(resolution.status.to_string())
        .bind(resolution.price_assignments.as_ref().map(Json))
        .bind(resolution.total_price)
        .bind(&resolution.notes)
        .bind(resolution.resolved_by)
        .bind(resolution.resolved_at)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Err(self
                .not_pending(&schema, "enrollment_requests", "enrollment request", resolution.request_id)
                .await);
        }

        let mut child_ids = Vec::with_capacity(resolution.children.len());
        for child in &resolution.children {
            sqlx::query(&format!(
                "INSERT INTO {schema}.children
                    (id, guardian_id, school_slug, enrollment_request_id, profile,
                     monthly_fee, uniform_charged, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(child.id)
            .bind(child.guardian_id)
            .bind(&child.school_slug)
            .bind(child.enrollment_request_id)
            .bind(Json(&child.profile))
            .bind(child.monthly_fee)
            .bind(child.uniform_charged)
            .bind(child.created_at)
            .bind(child.updated_at)
            .execute(&mut *tx)
            .await?;
            child_ids.push(child.id);
        }

        sqlx::query(&format!(
            "UPDATE {schema}.enrollment_requests SET child_ids = $2 WHERE id = $1"
        ))
        .bind(resolution.request_id)
        .bind(&child_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_enrollment_request(school, resolution.request_id)
            .await?
            .ok_or_else(|| AppError::not_found("enrollment request"))
    }

    async fn insert_payment_request(
        &self,
        request: &PaymentRequest,
        qr: &QrRecord,
    ) -> AppResult<()> {
        let schema = schema_name(&request.school_slug);
        let mut tx = self.pool.begin().await?;

        Self::insert_qr(&mut tx, &schema, qr).await?;

        sqlx::query(&format!(
            "INSERT INTO {schema}.payment_requests
                (id, guardian_id, school_slug, children, window_start, window_end,
                 qr_code_id, status, total_amount, submitted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(request.id)
        .bind(request.guardian_id)
        .bind(&request.school_slug)
        .bind(Json(&request.children))
        .bind(request.window.start)
        .bind(request.window.end)
        .bind(request.qr_code_id)
        .bind(request.status.to_string())
        .bind(request.total_amount)
        .bind(request.submitted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_payment_request(
        &self,
        school: &str,
        id: Uuid,
    ) -> AppResult<Option<PaymentRequest>> {
        let schema = schema_name(school);
        let row = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {PAYMENT_REQUEST_COLS}
             FROM {schema}.payment_requests r
             JOIN {schema}.qr_codes q ON q.id = r.qr_code_id
             WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentRequest::try_from).transpose()?)
    }

    async fn list_payment_requests(
        &self,
        school: &str,
        filter: RequestFilter<PaymentRequestStatus>,
    ) -> AppResult<Vec<PaymentRequest>> {
        let schema = schema_name(school);
        let rows = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "SELECT {PAYMENT_REQUEST_COLS}
             FROM {schema}.payment_requests r
             JOIN {schema}.qr_codes q ON q.id = r.qr_code_id
             WHERE ($1::TEXT IS NULL OR r.status = $1)
               AND ($2::UUID IS NULL OR r.guardian_id = $2)
             ORDER BY r.submitted_at DESC"
        ))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.guardian_id)
        .fetch_all(&self.pool)
        .await?;

        let requests = rows
            .into_iter()
            .map(PaymentRequest::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(requests)
    }

    async fn settle_payment_request(
        &self,
        school: &str,
        settlement: PaymentSettlement,
    ) -> AppResult<PaymentRequest> {
        let schema = schema_name(school);
        let mut tx = self.pool.begin().await?;

        let claimed: Option<Uuid> = sqlx::query_scalar(&format!(
            "UPDATE {schema}.payment_requests
             SET status = 'settled', total_amount = $2, notes = $3,
                 resolved_by = $4, resolved_at = $5
             WHERE id = $1 AND status = 'pending'
             RETURNING id"
        ))
        .bind(settlement.request_id)
        .bind(settlement.total_amount)
        .bind(&settlement.notes)
        .bind(settlement.resolved_by)
        .bind(settlement.resolved_at)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Err(self
                .not_pending(&schema, "payment_requests", "payment request", settlement.request_id)
                .await);
        }

        let uniform_ids: Vec<Uuid> = settlement
            .payments
            .iter()
            .filter(|p| p.concept == PaymentConcept::Uniform)
            .map(|p| p.child_id)
            .collect();
        if !uniform_ids.is_empty() {
            let charged = sqlx::query(&format!(
                "UPDATE {schema}.children
                 SET uniform_charged = TRUE
                 WHERE id = ANY($1)
                   AND uniform_charged = FALSE
                   AND (profile->>'wants_uniform')::BOOLEAN"
            ))
            .bind(&uniform_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if charged != uniform_ids.len() as u64 {
                tx.rollback().await?;
                return Err(AppError::validation(
                    "items",
                    "uniform fee is not due for every child it was charged to",
                ));
            }
        }

        for payment in &settlement.payments {
            sqlx::query(&format!(
                "INSERT INTO {schema}.payments
                    (id, guardian_id, school_slug, child_id, amount, concept,
                     period_month, period_year, paid_at, payment_request_id, processed_by)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ))
            .bind(payment.id)
            .bind(payment.guardian_id)
            .bind(&payment.school_slug)
            .bind(payment.child_id)
            .bind(payment.amount)
            .bind(payment.concept.to_string())
            .bind(payment.period_month)
            .bind(payment.period_year)
            .bind(payment.paid_at)
            .bind(payment.payment_request_id)
            .bind(payment.processed_by)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_payment_request(school, settlement.request_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment request"))
    }

    async fn cancel_payment_request(
        &self,
        school: &str,
        cancellation: PaymentCancellation,
    ) -> AppResult<PaymentRequest> {
        let schema = schema_name(school);
        let claimed: Option<Uuid> = sqlx::query_scalar(&format!(
            "UPDATE {schema}.payment_requests
             SET status = 'cancelled', notes = $2, resolved_by = $3, resolved_at = $4
             WHERE id = $1 AND status = 'pending'
             RETURNING id"
        ))
        .bind(cancellation.request_id)
        .bind(&cancellation.notes)
        .bind(cancellation.resolved_by)
        .bind(cancellation.resolved_at)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            return Err(self
                .not_pending(&schema, "payment_requests", "payment request", cancellation.request_id)
                .await);
        }

        self.get_payment_request(school, cancellation.request_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment request"))
    }

    async fn get_child(&self, school: &str, id: Uuid) -> AppResult<Option<Child>> {
        let schema = schema_name(school);
        let child = sqlx::query_as::<_, Child>(&format!(
            "SELECT * FROM {schema}.children WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(child)
    }

    async fn list_children(&self, school: &str) -> AppResult<Vec<Child>> {
        let schema = schema_name(school);
        let children = sqlx::query_as::<_, Child>(&format!(
            "SELECT * FROM {schema}.children ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(children)
    }

    async fn children_for_guardian(
        &self,
        school: &str,
        guardian_id: Uuid,
    ) -> AppResult<Vec<Child>> {
        let schema = schema_name(school);
        let children = sqlx::query_as::<_, Child>(&format!(
            "SELECT * FROM {schema}.children WHERE guardian_id = $1 ORDER BY created_at, id"
        ))
        .bind(guardian_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(children)
    }

    async fn update_monthly_fee(&self, school: &str, child_id: Uuid, fee: Decimal) -> AppResult<()> {
        let schema = schema_name(school);
        let updated = sqlx::query(&format!(
            "UPDATE {schema}.children SET monthly_fee = $2 WHERE id = $1"
        ))
        .bind(child_id)
        .bind(fee)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::not_found("child"));
        }
        Ok(())
    }

    async fn payments_for_child(&self, school: &str, child_id: Uuid) -> AppResult<Vec<Payment>> {
        let schema = schema_name(school);
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT * FROM {schema}.payments WHERE child_id = $1 ORDER BY paid_at"
        ))
        .bind(child_id)
        .fetch_all(&self.pool)
        .await?;

        let payments = rows
            .into_iter()
            .map(Payment::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(payments)
    }

    async fn children_paid_for(
        &self,
        school: &str,
        concept: PaymentConcept,
        month: i32,
        year: i32,
    ) -> AppResult<HashSet<Uuid>> {
        let schema = schema_name(school);
        let ids: Vec<Uuid> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT child_id FROM {schema}.payments
             WHERE concept = $1 AND period_month = $2 AND period_year = $3"
        ))
        .bind(concept.to_string())
        .bind(month)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }
}
