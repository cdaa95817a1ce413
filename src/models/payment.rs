use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Pending,
    Settled,
    Cancelled,
}

impl std::fmt::Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentRequestStatus::Pending => "pending",
            PaymentRequestStatus::Settled => "settled",
            PaymentRequestStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PaymentRequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRequestStatus::Pending),
            "settled" => Ok(PaymentRequestStatus::Settled),
            "cancelled" => Ok(PaymentRequestStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Unknown payment request status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentConcept {
    Monthly,
    Enrollment,
    Uniform,
    Other,
}

impl std::fmt::Display for PaymentConcept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentConcept::Monthly => "monthly",
            PaymentConcept::Enrollment => "enrollment",
            PaymentConcept::Uniform => "uniform",
            PaymentConcept::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PaymentConcept {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PaymentConcept::Monthly),
            "enrollment" => Ok(PaymentConcept::Enrollment),
            "uniform" => Ok(PaymentConcept::Uniform),
            "other" => Ok(PaymentConcept::Other),
            _ => Err(anyhow::anyhow!("Unknown payment concept: {s}")),
        }
    }
}

/// A fixed date range during which payments for a period are expected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Child reference cached on a payment request at submission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChildRef {
    pub child_id: Uuid,
    pub display_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub guardian_id: Uuid,
    pub school_slug: String,
    pub children: Vec<ChildRef>,
    pub window: PaymentWindow,
    pub qr_code_id: Uuid,
    pub qr_image_ref: String,
    pub status: PaymentRequestStatus,
    pub total_amount: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub notes: Option<String>,
}

impl PaymentRequest {
    pub fn references(&self, child_id: Uuid) -> bool {
        self.children.iter().any(|c| c.child_id == child_id)
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub guardian_id: Uuid,
    pub school_slug: String,
    pub child_id: Uuid,
    pub amount: Decimal,
    pub concept: PaymentConcept,
    pub period_month: i32,
    pub period_year: i32,
    pub paid_at: DateTime<Utc>,
    pub payment_request_id: Option<Uuid>,
    pub processed_by: Uuid,
}

/// One line of a settlement: what was collected for which child.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementItem {
    pub child_id: Uuid,
    pub amount: Decimal,
    pub concept: PaymentConcept,
}

/// Body for POST /payment-requests.
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub child_ids: Vec<Uuid>,
    pub window: Option<PaymentWindow>,
}

/// Body for POST /payment-requests/{id}/settle.
#[derive(Debug, Deserialize)]
pub struct SettlePaymentRequest {
    pub items: Vec<SettlementItem>,
    pub notes: Option<String>,
    pub declared_total: Decimal,
}

/// Body for POST /payment-requests/{id}/cancel.
#[derive(Debug, Default, Deserialize)]
pub struct CancelPaymentRequest {
    pub notes: Option<String>,
}

/// Query params for GET /payment-requests.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<PaymentRequestStatus>,
}
