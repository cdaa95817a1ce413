use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    pub static ref REQUESTS_CREATED_COUNTER: CounterVec = register_counter_vec!(
        "requests_created_total",
        "Requests created per school and kind",
        &["school", "kind"]
    ).unwrap();

    pub static ref REQUESTS_RESOLVED_COUNTER: CounterVec = register_counter_vec!(
        "requests_resolved_total",
        "Requests resolved per school, kind and outcome",
        &["school", "kind", "outcome"]
    ).unwrap();

    pub static ref QR_FAILURES_COUNTER: CounterVec = register_counter_vec!(
        "qr_issuance_failures_total",
        "QR issuance failures or timeouts per school",
        &["school"]
    ).unwrap();

    pub static ref REMINDERS_COUNTER: CounterVec = register_counter_vec!(
        "payment_reminders_total",
        "Payment reminders emitted per school and status",
        &["school", "status"]
    ).unwrap();
}

/// Registers every counter with the default registry up front.
pub fn register_all() {
    lazy_static::initialize(&REQUESTS_CREATED_COUNTER);
    lazy_static::initialize(&REQUESTS_RESOLVED_COUNTER);
    lazy_static::initialize(&QR_FAILURES_COUNTER);
    lazy_static::initialize(&REMINDERS_COUNTER);
}
