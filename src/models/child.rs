use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Placeholder stored when a medical field is left empty.
pub const NO_MEDICAL_NOTES: &str = "NONE";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

fn no_medical_notes() -> String {
    NO_MEDICAL_NOTES.to_string()
}

/// Provisional child data embedded in an enrollment request.
/// Never stored on its own: it becomes a [`Child`] only through approval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedChild {
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    /// 18-character national population registry key.
    pub national_id: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub blood_type: BloodType,
    pub residence_state: String,
    pub municipality: String,
    pub postal_code: String,
    pub jersey_number: u8,
    #[serde(default = "no_medical_notes")]
    pub allergies: String,
    #[serde(default = "no_medical_notes")]
    pub surgeries: String,
    #[serde(default = "no_medical_notes")]
    pub conditions: String,
    pub father_name: String,
    pub mother_name: String,
    pub phone: String,
    /// Whether the family ordered a uniform for this child.
    #[serde(default)]
    pub wants_uniform: bool,
}

impl StagedChild {
    pub fn display_name(&self) -> String {
        format!(
            "{} {} {}",
            self.first_name, self.paternal_surname, self.maternal_surname
        )
        .trim_end()
        .to_string()
    }

    /// Field-level validation. `index` is the position inside the request
    /// and is reported back in the offending field path.
    pub fn validate(&self, index: usize) -> AppResult<()> {
        let field = |name: &str| format!("children[{index}].{name}");

        for (name, value) in [
            ("first_name", &self.first_name),
            ("paternal_surname", &self.paternal_surname),
            ("residence_state", &self.residence_state),
            ("municipality", &self.municipality),
            ("father_name", &self.father_name),
            ("mother_name", &self.mother_name),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::validation(field(name), "must not be empty"));
            }
        }

        if self.national_id.len() != 18 || !self.national_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::validation(
                field("national_id"),
                "must be exactly 18 alphanumeric characters",
            ));
        }
        if !is_digits(&self.postal_code, 5) {
            return Err(AppError::validation(field("postal_code"), "must be exactly 5 digits"));
        }
        if !is_digits(&self.phone, 10) {
            return Err(AppError::validation(field("phone"), "must be exactly 10 digits"));
        }
        if self.jersey_number > 99 {
            return Err(AppError::validation(field("jersey_number"), "must be between 0 and 99"));
        }
        Ok(())
    }

    /// Replaces blank medical notes with the "NONE" placeholder.
    pub fn normalized(mut self) -> Self {
        for notes in [&mut self.allergies, &mut self.surgeries, &mut self.conditions] {
            if notes.trim().is_empty() {
                *notes = no_medical_notes();
            }
        }
        self
    }
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

/// Permanent child record, created only by approving an enrollment request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Child {
    pub id: Uuid,
    pub guardian_id: Uuid,
    pub school_slug: String,
    pub enrollment_request_id: Uuid,
    #[sqlx(json)]
    pub profile: StagedChild,
    pub monthly_fee: Decimal,
    /// Set once the one-time uniform fee has been settled.
    pub uniform_charged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Child {
    pub fn display_name(&self) -> String {
        self.profile.display_name()
    }

    pub fn uniform_due(&self) -> bool {
        self.profile.wants_uniform && !self.uniform_charged
    }
}
