use std::collections::HashSet;

use chrono::{DateTime, Datelike, Local, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    auth::AdminCapability,
    child::Child,
    payment::{
        ChildRef, Payment, PaymentConcept, PaymentRequest, PaymentRequestStatus, PaymentWindow,
        SettlementItem,
    },
};
use crate::services::lifecycle::LifecycleService;
use crate::services::metrics::{REQUESTS_CREATED_COUNTER, REQUESTS_RESOLVED_COUNTER};
use crate::services::pricing;
use crate::services::store::{PaymentCancellation, PaymentSettlement, RequestFilter};

impl LifecycleService {
    /// Submits a payment request for some of the guardian's children.
    /// Each child reference caches the display name and the amount owed now.
    pub async fn create_payment_request(
        &self,
        guardian_id: Uuid,
        school: &str,
        child_ids: Vec<Uuid>,
        window: PaymentWindow,
        now: DateTime<Utc>,
    ) -> AppResult<PaymentRequest> {
        if child_ids.is_empty() {
            return Err(AppError::validation("child_ids", "at least one child is required"));
        }
        let mut seen = HashSet::new();
        if let Some(i) = child_ids.iter().position(|id| !seen.insert(*id)) {
            return Err(AppError::validation(format!("child_ids[{i}]"), "duplicate child"));
        }
        if window.start > window.end {
            return Err(AppError::validation("window", "start must not be after end"));
        }

        let school = self.require_school(school).await?;

        let mut children = Vec::with_capacity(child_ids.len());
        for (i, child_id) in child_ids.iter().enumerate() {
            let child = self
                .store
                .get_child(&school.slug, *child_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("child {child_id}")))?;
            if child.guardian_id != guardian_id {
                return Err(AppError::validation(
                    format!("child_ids[{i}]"),
                    "child does not belong to this guardian",
                ));
            }
            children.push(ChildRef {
                child_id: child.id,
                display_name: child.display_name(),
                amount: pricing::outstanding_amount(&child),
            });
        }

        let id = Uuid::new_v4();
        let qr = self
            .issue_qr(
                &school.slug,
                self.request_url("payment-requests", id),
                guardian_id,
                now,
            )
            .await?;

        let request = PaymentRequest {
            id,
            guardian_id,
            school_slug: school.slug.clone(),
            total_amount: children.iter().map(|c| c.amount).sum(),
            children,
            window,
            qr_code_id: qr.id,
            qr_image_ref: qr.image_ref.clone(),
            status: PaymentRequestStatus::Pending,
            submitted_at: now,
            resolved_at: None,
            resolved_by: None,
            notes: None,
        };
        self.store.insert_payment_request(&request, &qr).await?;

        REQUESTS_CREATED_COUNTER
            .with_label_values(&[&school.slug, "payment"])
            .inc();
        info!(
            "Payment request {} created in '{}' for {} child(ren), total {}",
            request.id,
            school.slug,
            request.children.len(),
            request.total_amount
        );
        Ok(request)
    }

    /// Settles a pending payment request: one ledger entry per item, stamped
    /// with the month and year of `now`, committed with the status change.
    ///
    /// `now` is on the school calendar (the process timezone), which is the
    /// calendar the pending payment scan reads. Every child of the request must
    /// be covered by at least one item; a child may carry several items only
    /// for distinct concepts (e.g. its monthly fee plus the uniform).
    pub async fn resolve_payment(
        &self,
        admin: &AdminCapability,
        school: &str,
        request_id: Uuid,
        items: Vec<SettlementItem>,
        notes: Option<String>,
        declared_total: Decimal,
        now: DateTime<Local>,
    ) -> AppResult<PaymentRequest> {
        if !admin.covers(school) {
            return Err(AppError::Forbidden(format!(
                "administrator of '{}' cannot settle requests of '{school}'",
                admin.school()
            )));
        }

        let request = self
            .store
            .get_payment_request(school, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment request"))?;
        if request.status != PaymentRequestStatus::Pending {
            return Err(AppError::InvalidState(format!("request is already {}", request.status)));
        }

        if items.is_empty() {
            return Err(AppError::validation("items", "at least one item is required"));
        }
        let mut seen = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            if !request.references(item.child_id) {
                return Err(AppError::validation(
                    format!("items[{i}].child_id"),
                    "child is not part of this payment request",
                ));
            }
            pricing::check_amount(format!("items[{i}].amount"), item.amount)?;
            if !seen.insert((item.child_id, item.concept)) {
                return Err(AppError::validation(
                    format!("items[{i}].concept"),
                    format!("child already has a {} item", item.concept),
                ));
            }
            if item.concept == PaymentConcept::Uniform {
                let due = self
                    .store
                    .get_child(school, item.child_id)
                    .await?
                    .as_ref()
                    .map_or(false, Child::uniform_due);
                if !due {
                    return Err(AppError::validation(
                        format!("items[{i}].concept"),
                        "uniform fee is not due for this child",
                    ));
                }
            }
        }

        let covered: HashSet<Uuid> = seen.iter().map(|(child_id, _)| *child_id).collect();
        let missing: Vec<&str> = request
            .children
            .iter()
            .filter(|c| !covered.contains(&c.child_id))
            .map(|c| c.display_name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::validation(
                "items",
                format!("no payment item for {}", missing.join(", ")),
            ));
        }

        pricing::check_amount("declared_total", declared_total)?;
        let total: Decimal = items.iter().map(|item| item.amount).sum();
        if total != declared_total {
            return Err(AppError::validation(
                "declared_total",
                format!("declared total {declared_total} does not match items total {total}"),
            ));
        }

        let paid_at = now.with_timezone(&Utc);
        let payments = items
            .into_iter()
            .map(|item| Payment {
                id: Uuid::new_v4(),
                guardian_id: request.guardian_id,
                school_slug: request.school_slug.clone(),
                child_id: item.child_id,
                amount: item.amount,
                concept: item.concept,
                period_month: now.month() as i32,
                period_year: now.year(),
                paid_at,
                payment_request_id: Some(request.id),
                processed_by: admin.admin_id(),
            })
            .collect();

        let settled = self
            .store
            .settle_payment_request(
                school,
                PaymentSettlement {
                    request_id,
                    payments,
                    total_amount: total,
                    notes,
                    resolved_by: admin.admin_id(),
                    resolved_at: paid_at,
                },
            )
            .await?;

        REQUESTS_RESOLVED_COUNTER
            .with_label_values(&[school, "payment", "settled"])
            .inc();
        info!(
            "Payment request {} settled by {} for {}",
            settled.id,
            admin.admin_id(),
            settled.total_amount
        );
        self.notify_after_commit(
            school,
            settled.guardian_id,
            "Your payment was received.",
            &format!("/payment-requests/{}", settled.id),
        )
        .await;

        Ok(settled)
    }

    /// Withdraws a pending payment request. Allowed for the guardian who
    /// submitted it and for administrators of the school.
    pub async fn cancel_payment_request(
        &self,
        school: &str,
        request_id: Uuid,
        cancelled_by: Uuid,
        admin: Option<&AdminCapability>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<PaymentRequest> {
        let request = self
            .store
            .get_payment_request(school, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment request"))?;

        let is_admin = admin.map_or(false, |a| a.covers(school));
        if !is_admin && request.guardian_id != cancelled_by {
            return Err(AppError::Forbidden("only the requesting guardian or an administrator may cancel".into()));
        }
        if request.status != PaymentRequestStatus::Pending {
            return Err(AppError::InvalidState(format!("request is already {}", request.status)));
        }

        let cancelled = self
            .store
            .cancel_payment_request(
                school,
                PaymentCancellation {
                    request_id,
                    notes,
                    resolved_by: cancelled_by,
                    resolved_at: now,
                },
            )
            .await?;

        REQUESTS_RESOLVED_COUNTER
            .with_label_values(&[school, "payment", "cancelled"])
            .inc();
        info!("Payment request {} cancelled by {}", cancelled.id, cancelled_by);

        if is_admin {
            self.notify_after_commit(
                school,
                cancelled.guardian_id,
                "Your payment request was cancelled by the school.",
                &format!("/payment-requests/{}", cancelled.id),
            )
            .await;
        }
        Ok(cancelled)
    }

    pub async fn get_payment_request(
        &self,
        school: &str,
        request_id: Uuid,
    ) -> AppResult<PaymentRequest> {
        self.store
            .get_payment_request(school, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("payment request"))
    }

    pub async fn list_payment_requests(
        &self,
        school: &str,
        filter: RequestFilter<PaymentRequestStatus>,
    ) -> AppResult<Vec<PaymentRequest>> {
        self.store.list_payment_requests(school, filter).await
    }

    pub async fn children_for_guardian(
        &self,
        school: &str,
        guardian_id: Uuid,
    ) -> AppResult<Vec<Child>> {
        self.store.children_for_guardian(school, guardian_id).await
    }

    pub async fn payments_for_child(&self, school: &str, child_id: Uuid) -> AppResult<Vec<Payment>> {
        self.store
            .get_child(school, child_id)
            .await?
            .ok_or_else(|| AppError::not_found("child"))?;
        self.store.payments_for_child(school, child_id).await
    }
}
