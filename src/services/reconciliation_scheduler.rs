use std::sync::Arc;

use chrono::{Local, Timelike};
use tracing::{info, warn};

use crate::services::notifications::NotificationSink;
use crate::services::reconciliation;
use crate::services::store::LifecycleStore;

/// Seconds from now until the next `hour:00` local time.
fn secs_until(hour: u32) -> u64 {
    let now = Local::now();
    let secs_today = now.hour() * 3600 + now.minute() * 60 + now.second();
    let target_secs = hour * 3600;
    if secs_today < target_secs {
        (target_secs - secs_today) as u64
    } else {
        // Already past today → wait until tomorrow
        (86400 - secs_today + target_secs) as u64
    }
}

/// Spawn the two reconciliation loops.
///
/// Each loop awaits its run before sleeping again, so a job never overlaps a
/// previous run of itself. The loops share no state besides the store.
pub fn start(
    store: Arc<dyn LifecycleStore>,
    sink: Arc<dyn NotificationSink>,
    price_recompute_hour: u32,
    reminder_hour: u32,
) {
    let price_store = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(secs_until(price_recompute_hour))).await;

            info!("Price recompute: starting daily run");
            if let Err(e) = reconciliation::recompute_all_schools(price_store.as_ref()).await {
                warn!("Price recompute: failed to list schools: {e}");
            }
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(secs_until(reminder_hour))).await;

            let today = Local::now().date_naive();
            info!("Payment reminders: starting run for {today}");
            if let Err(e) =
                reconciliation::remind_all_schools(store.as_ref(), sink.as_ref(), today).await
            {
                warn!("Payment reminders: failed to list schools: {e}");
            }
        }
    });
}
