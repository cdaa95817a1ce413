use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::middleware::school::extract_slug;
use crate::models::auth::{AuthenticatedUser, Claims};

type Rejection = (StatusCode, &'static str);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "JWT secret not configured"))?;

        let user = decode_access_token(token, &secret.0)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

        // Whatever source names the school (header or subdomain), the token
        // must belong to it. Requests naming no school are left to the
        // school extractor to reject.
        if let Ok(slug) = extract_slug(parts) {
            if !user.may_act_in(&slug) {
                return Err((StatusCode::FORBIDDEN, "School mismatch"));
            }
        }

        Ok(user)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, Rejection> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?
        .strip_prefix("Bearer ")
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization header format"))
}

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

pub fn decode_access_token(token: &str, secret: &str) -> Result<AuthenticatedUser, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let claims = decode::<Claims>(token, &key, &validation)?.claims;
    Ok(AuthenticatedUser {
        user_id: claims.sub.parse()?,
        school: claims.school.to_lowercase(),
        role: claims.role,
    })
}
