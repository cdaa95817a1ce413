use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::school::SchoolSlug,
    models::{auth::AuthenticatedUser, child::Child, payment::Payment},
    routes::require_admin,
    AppState,
};

/// Children of the calling guardian in this school.
pub async fn list_children(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Child>>, AppError> {
    let children = state
        .lifecycle
        .children_for_guardian(&school, user.user_id)
        .await?;
    Ok(Json(children))
}

pub async fn list_child_payments(
    State(state): State<AppState>,
    SchoolSlug(school): SchoolSlug,
    user: AuthenticatedUser,
    Path(child_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let owns_child = state
        .store
        .get_child(&school, child_id)
        .await?
        .map_or(false, |c| c.guardian_id == user.user_id);
    if !owns_child {
        require_admin(&user, &school)?;
    }

    let payments = state.lifecycle.payments_for_child(&school, child_id).await?;
    Ok(Json(payments))
}
