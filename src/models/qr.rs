use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ownership record for an issued QR image. Exactly one per request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QrRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// The URL encoded in the image.
    pub payload: String,
    pub image_ref: String,
    /// SHA-256 of the rendered image, hex encoded.
    pub digest: String,
    pub created_at: DateTime<Utc>,
}
