use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::school::SchoolSlug,
    models::{
        auth::{AdminCapability, AuthenticatedUser},
        payment::{
            CancelPaymentRequest, CreatePaymentRequest, PaymentListQuery, PaymentRequest,
            SettlePaymentRequest,
        },
    },
    routes::require_admin,
    services::{periods, store::RequestFilter},
    AppState,
};

/// Without an explicit window the request targets the current payment window
/// of the local calendar.
pub async fn create_payment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentRequest>), AppError> {
    let window = match body.window {
        Some(window) => window,
        None => {
            let today = Local::now().date_naive();
            periods::current_window(today)
                .map(|w| w.window())
                .ok_or_else(|| AppError::validation("window", format!("{today} has no payment window")))?
        }
    };
    let request = state
        .lifecycle
        .create_payment_request(user.user_id, &school, body.child_ids, window, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_payment_requests(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<Vec<PaymentRequest>>, AppError> {
    let guardian_id = match require_admin(&user, &school) {
        Ok(_) => None,
        Err(_) => Some(user.user_id),
    };
    let requests = state
        .lifecycle
        .list_payment_requests(
            &school,
            RequestFilter {
                status: query.status,
                guardian_id,
            },
        )
        .await?;
    Ok(Json(requests))
}

pub async fn get_payment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentRequest>, AppError> {
    let request = state.lifecycle.get_payment_request(&school, id).await?;
    if request.guardian_id != user.user_id {
        require_admin(&user, &school)?;
    }
    Ok(Json(request))
}

pub async fn settle_payment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SettlePaymentRequest>,
) -> Result<Json<PaymentRequest>, AppError> {
    let admin = require_admin(&user, &school)?;
    let request = state
        .lifecycle
        .resolve_payment(
            &admin,
            &school,
            id,
            body.items,
            body.notes,
            body.declared_total,
            Local::now(),
        )
        .await?;
    Ok(Json(request))
}

pub async fn cancel_payment_request(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelPaymentRequest>,
) -> Result<Json<PaymentRequest>, AppError> {
    let admin = AdminCapability::for_school(&user, &school);
    let request = state
        .lifecycle
        .cancel_payment_request(&school, id, user.user_id, admin.as_ref(), body.notes, Utc::now())
        .await?;
    Ok(Json(request))
}
