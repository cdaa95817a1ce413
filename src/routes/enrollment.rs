use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::school::SchoolSlug,
    models::{
        auth::AuthenticatedUser,
        enrollment::{
            CreateEnrollmentRequest, EnrollmentListQuery, EnrollmentRequest, PriceQuote,
            QuoteQuery, ResolveEnrollmentRequest,
        },
    },
    routes::require_admin,
    services::store::RequestFilter,
    AppState,
};

pub async fn create_enrollment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Json(body): Json<CreateEnrollmentRequest>,
) -> Result<(StatusCode, Json<EnrollmentRequest>), AppError> {
    let request = state
        .lifecycle
        .create_enrollment_request(user.user_id, &school, body.children, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Admins see every request of the school; guardians only their own.
pub async fn list_enrollment_requests(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Query(query): Query<EnrollmentListQuery>,
) -> Result<Json<Vec<EnrollmentRequest>>, AppError> {
    let guardian_id = match require_admin(&user, &school) {
        Ok(_) => None,
        Err(_) => Some(user.user_id),
    };
    let requests = state
        .lifecycle
        .list_enrollment_requests(
            &school,
            RequestFilter {
                status: query.status,
                guardian_id,
            },
        )
        .await?;
    Ok(Json(requests))
}

pub async fn get_enrollment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EnrollmentRequest>, AppError> {
    let request = state.lifecycle.get_enrollment_request(&school, id).await?;
    if request.guardian_id != user.user_id {
        require_admin(&user, &school)?;
    }
    Ok(Json(request))
}

pub async fn resolve_enrollment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveEnrollmentRequest>,
) -> Result<Json<EnrollmentRequest>, AppError> {
    let admin = require_admin(&user, &school)?;
    let request = state
        .lifecycle
        .resolve_enrollment(
            &admin,
            &school,
            id,
            body.decision,
            body.prices,
            body.notes,
            Utc::now(),
        )
        .await?;
    Ok(Json(request))
}

pub async fn quote_enrollment(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<PriceQuote>, AppError> {
    require_admin(&user, &school)?;
    let quote = state
        .lifecycle
        .quote_enrollment(&school, query.guardian_id, query.staged_count)
        .await?;
    Ok(Json(quote))
}
