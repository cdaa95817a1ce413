//! Background reconciliation jobs.
//!
//! Each job takes the date it runs for as an argument and never reads the
//! clock. A failure on one family, child or guardian is logged and skipped;
//! only a failure to read the school's data aborts a run.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{child::Child, payment::PaymentConcept};
use crate::services::metrics::REMINDERS_COUNTER;
use crate::services::notifications::NotificationSink;
use crate::services::periods;
use crate::services::pricing;
use crate::services::store::LifecycleStore;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRecomputeReport {
    pub families: usize,
    pub updated: usize,
    pub failed: usize,
}

/// A child with no monthly payment recorded for the scanned period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnpaidChild {
    pub child_id: Uuid,
    pub child_name: String,
    pub guardian_id: Uuid,
    pub school_slug: String,
    pub monthly_fee: Decimal,
    pub period_month: i32,
    pub period_year: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub guardians_notified: usize,
    pub failed: usize,
    /// The day was outside both payment windows, so nothing was sent.
    pub outside_window: bool,
}

/// Re-applies sibling pricing to every (guardian, school) family.
/// Only children whose fee actually changes are written.
pub async fn recompute_prices(
    store: &dyn LifecycleStore,
    school: &str,
) -> AppResult<PriceRecomputeReport> {
    let mut families: BTreeMap<Uuid, Vec<Child>> = BTreeMap::new();
    for child in store.list_children(school).await? {
        families.entry(child.guardian_id).or_default().push(child);
    }

    let mut report = PriceRecomputeReport {
        families: families.len(),
        ..Default::default()
    };

    for (guardian_id, children) in &families {
        for (child_id, fee) in pricing::recompute_family(children) {
            match store.update_monthly_fee(school, child_id, fee).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "Price recompute: failed to update child {child_id} of guardian {guardian_id} in '{school}': {e}"
                    );
                }
            }
        }
    }

    info!(
        "Price recompute for '{school}': {} families, {} fee(s) updated, {} failure(s)",
        report.families, report.updated, report.failed
    );
    Ok(report)
}

/// Lists every child without a monthly payment for the month of `today`.
/// Read-only.
pub async fn scan_pending_payments(
    store: &dyn LifecycleStore,
    school: &str,
    today: NaiveDate,
) -> AppResult<Vec<UnpaidChild>> {
    let month = today.month() as i32;
    let year = today.year();

    let paid = store
        .children_paid_for(school, PaymentConcept::Monthly, month, year)
        .await?;

    let unpaid: Vec<UnpaidChild> = store
        .list_children(school)
        .await?
        .into_iter()
        .filter(|c| !paid.contains(&c.id))
        .map(|c| UnpaidChild {
            child_id: c.id,
            child_name: c.display_name(),
            guardian_id: c.guardian_id,
            school_slug: c.school_slug,
            monthly_fee: c.monthly_fee,
            period_month: month,
            period_year: year,
        })
        .collect();

    info!(
        "Pending payment scan for '{school}' {month:02}/{year}: {} unpaid child(ren)",
        unpaid.len()
    );
    Ok(unpaid)
}

/// Sends one reminder per guardian listing all of their unpaid children.
/// Does nothing outside the payment windows.
pub async fn emit_reminders(
    store: &dyn LifecycleStore,
    sink: &dyn NotificationSink,
    school: &str,
    today: NaiveDate,
) -> AppResult<ReminderReport> {
    if !periods::is_active_window_day(today) {
        debug!("Reminders for '{school}' skipped: {today} is outside the payment windows");
        return Ok(ReminderReport {
            outside_window: true,
            ..Default::default()
        });
    }

    let window = periods::current_window(today)
        .ok_or_else(|| AppError::validation("date", format!("{today} has no payment window")))?;
    let unpaid = scan_pending_payments(store, school, today).await?;

    let mut by_guardian: BTreeMap<Uuid, Vec<UnpaidChild>> = BTreeMap::new();
    for child in unpaid {
        by_guardian.entry(child.guardian_id).or_default().push(child);
    }

    let mut report = ReminderReport::default();
    for (guardian_id, children) in &by_guardian {
        let message = reminder_message(&window.label, children);
        match sink
            .notify(school, *guardian_id, &message, Some("/payment-requests/new"))
            .await
        {
            Ok(()) => {
                report.guardians_notified += 1;
                REMINDERS_COUNTER.with_label_values(&[school, "sent"]).inc();
            }
            Err(e) => {
                report.failed += 1;
                REMINDERS_COUNTER.with_label_values(&[school, "failed"]).inc();
                warn!("Reminder to guardian {guardian_id} in '{school}' failed: {e:#}");
            }
        }
    }

    info!(
        "Reminders for '{school}' ({}): {} sent, {} failed",
        window.label, report.guardians_notified, report.failed
    );
    Ok(report)
}

fn reminder_message(window_label: &str, children: &[UnpaidChild]) -> String {
    let names: Vec<&str> = children.iter().map(|c| c.child_name.as_str()).collect();
    let total: Decimal = children.iter().map(|c| c.monthly_fee).sum();
    format!(
        "Payment reminder ({window_label}): no monthly payment registered yet for {}. Amount due: {total}.",
        names.join(", ")
    )
}

/// Runs the price recompute for every active school.
pub async fn recompute_all_schools(store: &dyn LifecycleStore) -> AppResult<()> {
    for school in store.list_active_schools().await? {
        if let Err(e) = recompute_prices(store, &school.slug).await {
            warn!("Price recompute failed for '{}': {e}", school.slug);
        }
    }
    Ok(())
}

/// Emits reminders for every active school.
pub async fn remind_all_schools(
    store: &dyn LifecycleStore,
    sink: &dyn NotificationSink,
    today: NaiveDate,
) -> AppResult<()> {
    for school in store.list_active_schools().await? {
        if let Err(e) = emit_reminders(store, sink, &school.slug, today).await {
            warn!("Reminder run failed for '{}': {e}", school.slug);
        }
    }
    Ok(())
}
