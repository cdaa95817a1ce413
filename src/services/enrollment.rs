use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    auth::AdminCapability,
    child::{Child, StagedChild},
    enrollment::{EnrollmentDecision, EnrollmentRequest, EnrollmentStatus, PriceQuote},
};
use crate::services::lifecycle::LifecycleService;
use crate::services::metrics::{REQUESTS_CREATED_COUNTER, REQUESTS_RESOLVED_COUNTER};
use crate::services::pricing;
use crate::services::store::{EnrollmentResolution, RequestFilter};

impl LifecycleService {
    /// Submits an enrollment request for one or more children.
    ///
    /// The request and its QR record become visible together or not at all:
    /// if QR issuance fails or times out nothing is persisted.
    pub async fn create_enrollment_request(
        &self,
        guardian_id: Uuid,
        school: &str,
        children: Vec<StagedChild>,
        now: DateTime<Utc>,
    ) -> AppResult<EnrollmentRequest> {
        if children.is_empty() {
            return Err(AppError::validation("children", "at least one child is required"));
        }
        for (i, child) in children.iter().enumerate() {
            child.validate(i)?;
        }

        let school = self.require_school(school).await?;
        if !school.is_active {
            return Err(AppError::validation("school", "school is not accepting enrollments"));
        }

        let id = Uuid::new_v4();
        let qr = self
            .issue_qr(
                &school.slug,
                self.request_url("enrollment-requests", id),
                guardian_id,
                now,
            )
            .await?;

        let request = EnrollmentRequest {
            id,
            guardian_id,
            school_slug: school.slug.clone(),
            children: children.into_iter().map(StagedChild::normalized).collect(),
            price_assignments: None,
            total_price: None,
            qr_code_id: qr.id,
            qr_image_ref: qr.image_ref.clone(),
            status: EnrollmentStatus::Pending,
            child_ids: Vec::new(),
            submitted_at: now,
            resolved_at: None,
            resolved_by: None,
            admin_notes: None,
        };
        self.store.insert_enrollment_request(&request, &qr).await?;

        REQUESTS_CREATED_COUNTER
            .with_label_values(&[&school.slug, "enrollment"])
            .inc();
        info!(
            "Enrollment request {} created in '{}' for {} child(ren)",
            request.id,
            school.slug,
            request.children.len()
        );
        Ok(request)
    }

    /// Applies an administrator's decision to a pending enrollment request.
    ///
    /// Approval needs one strictly positive price per staged child, in the
    /// same order. Children are materialized in that order and linked back to
    /// the request in the same atomic step as the status change.
    pub async fn resolve_enrollment(
        &self,
        admin: &AdminCapability,
        school: &str,
        request_id: Uuid,
        decision: EnrollmentDecision,
        prices: Vec<Decimal>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<EnrollmentRequest> {
        if !admin.covers(school) {
            return Err(AppError::Forbidden(format!(
                "administrator of '{}' cannot resolve requests of '{school}'",
                admin.school()
            )));
        }

        let request = self
            .store
            .get_enrollment_request(school, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("enrollment request"))?;
        if request.status.is_terminal() {
            return Err(AppError::InvalidState(format!("request is already {}", request.status)));
        }

        let status = EnrollmentStatus::from(decision);
        let resolution = match decision {
            EnrollmentDecision::Approved => {
                if prices.len() != request.children.len() {
                    return Err(AppError::validation(
                        "prices",
                        format!(
                            "expected {} prices, got {}",
                            request.children.len(),
                            prices.len()
                        ),
                    ));
                }
                for (i, price) in prices.iter().enumerate() {
                    pricing::check_amount(format!("prices[{i}]"), *price)?;
                }

                let children: Vec<Child> = request
                    .children
                    .iter()
                    .zip(&prices)
                    .map(|(staged, price)| Child {
                        id: Uuid::new_v4(),
                        guardian_id: request.guardian_id,
                        school_slug: request.school_slug.clone(),
                        enrollment_request_id: request.id,
                        profile: staged.clone(),
                        monthly_fee: *price,
                        uniform_charged: false,
                        created_at: now,
                        updated_at: now,
                    })
                    .collect();

                EnrollmentResolution {
                    request_id,
                    status,
                    children,
                    total_price: Some(prices.iter().copied().sum()),
                    price_assignments: Some(prices),
                    notes,
                    resolved_by: admin.admin_id(),
                    resolved_at: now,
                }
            }
            EnrollmentDecision::Rejected => EnrollmentResolution {
                request_id,
                status,
                children: Vec::new(),
                price_assignments: None,
                total_price: None,
                notes,
                resolved_by: admin.admin_id(),
                resolved_at: now,
            },
        };

        let resolved = self.store.resolve_enrollment(school, resolution).await?;

        REQUESTS_RESOLVED_COUNTER
            .with_label_values(&[school, "enrollment", &resolved.status.to_string()])
            .inc();
        info!(
            "Enrollment request {} {} by {} ({} child(ren) created)",
            resolved.id,
            resolved.status,
            admin.admin_id(),
            resolved.child_ids.len()
        );

        let message = match resolved.status {
            EnrollmentStatus::Approved => "Your enrollment request was approved.",
            _ => "Your enrollment request was rejected.",
        };
        self.notify_after_commit(
            school,
            resolved.guardian_id,
            message,
            &format!("/enrollment-requests/{}", resolved.id),
        )
        .await;

        Ok(resolved)
    }

    /// Suggested monthly fee per child if `staged_count` more children of this
    /// guardian were enrolled next to the ones already in the school.
    pub async fn quote_enrollment(
        &self,
        school: &str,
        guardian_id: Uuid,
        staged_count: usize,
    ) -> AppResult<PriceQuote> {
        self.require_school(school).await?;
        let existing = self.store.children_for_guardian(school, guardian_id).await?;
        let sibling_count = existing.len() + staged_count;
        Ok(PriceQuote {
            sibling_count,
            monthly_fee_per_child: pricing::monthly_fee(sibling_count),
            uniform_fee: pricing::uniform_fee(),
        })
    }

    pub async fn get_enrollment_request(
        &self,
        school: &str,
        request_id: Uuid,
    ) -> AppResult<EnrollmentRequest> {
        self.store
            .get_enrollment_request(school, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("enrollment request"))
    }

    pub async fn list_enrollment_requests(
        &self,
        school: &str,
        filter: RequestFilter<EnrollmentStatus>,
    ) -> AppResult<Vec<EnrollmentRequest>> {
        self.store.list_enrollment_requests(school, filter).await
    }
}
