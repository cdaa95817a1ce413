use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::child::StagedChild;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
}

impl EnrollmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EnrollmentStatus::Pending)
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrollmentStatus::Pending),
            "approved" => Ok(EnrollmentStatus::Approved),
            "rejected" => Ok(EnrollmentStatus::Rejected),
            _ => Err(anyhow::anyhow!("Unknown enrollment status: {s}")),
        }
    }
}

/// Administrative outcome of an enrollment request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentDecision {
    Approved,
    Rejected,
}

impl From<EnrollmentDecision> for EnrollmentStatus {
    fn from(decision: EnrollmentDecision) -> Self {
        match decision {
            EnrollmentDecision::Approved => EnrollmentStatus::Approved,
            EnrollmentDecision::Rejected => EnrollmentStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub id: Uuid,
    pub guardian_id: Uuid,
    pub school_slug: String,
    pub children: Vec<StagedChild>,
    /// Per-child monthly price, index-aligned with `children`.
    pub price_assignments: Option<Vec<Decimal>>,
    pub total_price: Option<Decimal>,
    pub qr_code_id: Uuid,
    pub qr_image_ref: String,
    pub status: EnrollmentStatus,
    /// Children materialized on approval, index-aligned with `children`.
    pub child_ids: Vec<Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub admin_notes: Option<String>,
}

/// Body for POST /enrollment-requests.
#[derive(Debug, Deserialize)]
pub struct CreateEnrollmentRequest {
    pub children: Vec<StagedChild>,
}

/// Body for POST /enrollment-requests/{id}/resolve.
#[derive(Debug, Deserialize)]
pub struct ResolveEnrollmentRequest {
    pub decision: EnrollmentDecision,
    #[serde(default)]
    pub prices: Vec<Decimal>,
    pub notes: Option<String>,
}

/// Query params for GET /enrollment-requests.
#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentListQuery {
    pub status: Option<EnrollmentStatus>,
}

/// Query params for GET /enrollment-requests/quote.
#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub guardian_id: Uuid,
    pub staged_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceQuote {
    pub sibling_count: usize,
    pub monthly_fee_per_child: Decimal,
    pub uniform_fee: Decimal,
}
