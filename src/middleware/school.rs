use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::models::school::is_valid_slug;
use crate::AppState;

/// Extracts the school slug from the `X-School` header or first subdomain
/// and checks that the school exists.
#[derive(Debug, Clone)]
pub struct SchoolSlug(pub String);

impl FromRequestParts<AppState> for SchoolSlug {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let slug = extract_slug(parts)?;

        let school = state
            .store
            .find_school(&slug)
            .await
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Database error" }))))?;

        match school {
            None => Err((StatusCode::NOT_FOUND, Json(json!({ "error": "School not found" })))),
            Some(_) => Ok(SchoolSlug(slug)),
        }
    }
}

/// The school a request targets: `X-School` header first, then the first
/// subdomain of `Host`.
pub(crate) fn extract_slug(parts: &Parts) -> Result<String, (StatusCode, Json<Value>)> {
    // 1. X-School header
    if let Some(school) = parts
        .headers
        .get("X-School")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
    {
        if !is_valid_slug(&school) {
            return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid school identifier" }))));
        }
        return Ok(school);
    }

    // 2. Subdomain from Host header
    if let Some(host) = parts.headers.get("Host").and_then(|v| v.to_str().ok()) {
        let domain = host.split(':').next().unwrap_or(host);
        let parts_vec: Vec<&str> = domain.split('.').collect();
        if parts_vec.len() >= 3 {
            let subdomain = parts_vec[0].to_lowercase();
            if subdomain != "www" && subdomain != "api" {
                if !is_valid_slug(&subdomain) {
                    return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid school identifier" }))));
                }
                return Ok(subdomain);
            }
        }
    }

    Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "Missing X-School header" }))))
}
