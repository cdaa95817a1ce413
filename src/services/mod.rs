pub mod enrollment;
pub mod lifecycle;
pub mod metrics;
pub mod notifications;
pub mod payments;
pub mod periods;
pub mod pricing;
pub mod qr;
pub mod reconciliation;
pub mod reconciliation_scheduler;
pub mod store;
