//! Sibling-based fee rules.
//!
//! A guardian with a single child in a school pays the full monthly fee.
//! As soon as two or more siblings are enrolled in the same school, every
//! one of them pays the reduced sibling fee. The uniform is a separate
//! one-time charge.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::child::Child;

pub const SINGLE_CHILD_MONTHLY_FEE: i64 = 250;
pub const SIBLING_MONTHLY_FEE: i64 = 200;
pub const UNIFORM_FEE: i64 = 650;

/// Monthly fee owed by each child of a family with `sibling_count` children.
pub fn monthly_fee(sibling_count: usize) -> Decimal {
    if sibling_count <= 1 {
        Decimal::from(SINGLE_CHILD_MONTHLY_FEE)
    } else {
        Decimal::from(SIBLING_MONTHLY_FEE)
    }
}

pub fn uniform_fee() -> Decimal {
    Decimal::from(UNIFORM_FEE)
}

/// Money columns are NUMERIC(12,2): two decimals, ten integer digits.
const MONEY_SCALE: u32 = 2;
const MONEY_LIMIT: i64 = 10_000_000_000;

/// Checks that a charged amount is positive and fits the stored precision
/// exactly, so what is persisted is what was entered.
pub fn check_amount(field: impl Into<String>, amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::validation(field, "must be greater than zero"));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(AppError::validation(field, "must have at most two decimal places"));
    }
    if amount >= Decimal::from(MONEY_LIMIT) {
        return Err(AppError::validation(field, "is too large"));
    }
    Ok(())
}

/// What a child currently owes: the monthly fee, plus the uniform while it
/// is ordered and not yet charged.
pub fn outstanding_amount(child: &Child) -> Decimal {
    if child.uniform_due() {
        child.monthly_fee + uniform_fee()
    } else {
        child.monthly_fee
    }
}

/// Fee changes for one family (all children of one guardian in one school).
/// Children already at the right fee are left out, so applying the result
/// twice writes nothing the second time.
pub fn recompute_family(children: &[Child]) -> Vec<(Uuid, Decimal)> {
    let fee = monthly_fee(children.len());
    children
        .iter()
        .filter(|c| c.monthly_fee != fee)
        .map(|c| (c.id, fee))
        .collect()
}
