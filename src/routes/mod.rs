pub mod children;
pub mod enrollment;
pub mod health;
pub mod metrics;
pub mod payments;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::auth::JwtSecret;
use crate::models::auth::{AdminCapability, AuthenticatedUser};
use crate::AppState;

/// Resolves the administrator capability for `school`, or 403.
pub(crate) fn require_admin(
    user: &AuthenticatedUser,
    school: &str,
) -> Result<AdminCapability, AppError> {
    AdminCapability::for_school(user, school)
        .ok_or_else(|| AppError::Forbidden(format!("not an administrator of '{school}'")))
}

pub fn router(state: AppState, jwt_secret: JwtSecret) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        // Enrollment requests
        .route(
            "/enrollment-requests",
            get(enrollment::list_enrollment_requests).post(enrollment::create_enrollment_request),
        )
        .route("/enrollment-requests/quote", get(enrollment::quote_enrollment))
        .route("/enrollment-requests/{id}", get(enrollment::get_enrollment_request))
        .route("/enrollment-requests/{id}/resolve", post(enrollment::resolve_enrollment_request))
        // Payment requests
        .route(
            "/payment-requests",
            get(payments::list_payment_requests).post(payments::create_payment_request),
        )
        .route("/payment-requests/{id}", get(payments::get_payment_request))
        .route("/payment-requests/{id}/settle", post(payments::settle_payment_request))
        .route("/payment-requests/{id}/cancel", post(payments::cancel_payment_request))
        // Children
        .route("/children", get(children::list_children))
        .route("/children/{id}/payments", get(children::list_child_payments))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
