use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{qr::QrRecord, school::School};
use crate::services::metrics::QR_FAILURES_COUNTER;
use crate::services::notifications::NotificationSink;
use crate::services::qr::QrIssuer;
use crate::services::store::LifecycleStore;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Prefix for the URLs encoded in QR images, without trailing slash.
    pub app_base_url: String,
    /// Upper bound on one QR issuance call.
    pub qr_timeout: Duration,
}

/// Coordinates request creation and resolution. Creation and resolution
/// operations live in `services::enrollment` and `services::payments`.
pub struct LifecycleService {
    pub(crate) store: Arc<dyn LifecycleStore>,
    qr: Arc<dyn QrIssuer>,
    notifier: Arc<dyn NotificationSink>,
    settings: LifecycleSettings,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        qr: Arc<dyn QrIssuer>,
        notifier: Arc<dyn NotificationSink>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            qr,
            notifier,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn LifecycleStore> {
        &self.store
    }

    pub(crate) async fn require_school(&self, slug: &str) -> AppResult<School> {
        self.store
            .find_school(slug)
            .await?
            .ok_or_else(|| AppError::not_found(format!("school '{slug}'")))
    }

    /// Stable URL an administrator lands on when scanning a request's QR.
    pub fn request_url(&self, kind: &str, id: Uuid) -> String {
        format!("{}/admin/{kind}/{id}", self.settings.app_base_url)
    }

    /// Issues the QR image for a request that is about to be persisted.
    /// Failure or timeout aborts the creation before anything is written.
    pub(crate) async fn issue_qr(
        &self,
        school: &str,
        payload: String,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<QrRecord> {
        let issued = tokio::time::timeout(self.settings.qr_timeout, self.qr.issue(&payload, owner_id)).await;

        let image = match issued {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                QR_FAILURES_COUNTER.with_label_values(&[school]).inc();
                warn!("QR issuance failed for {payload}: {e:#}");
                return Err(AppError::DependencyFailure(format!("QR issuance failed: {e}")));
            }
            Err(_) => {
                QR_FAILURES_COUNTER.with_label_values(&[school]).inc();
                warn!("QR issuance timed out after {:?} for {payload}", self.settings.qr_timeout);
                return Err(AppError::DependencyFailure("QR issuance timed out".into()));
            }
        };

        Ok(QrRecord {
            id: Uuid::new_v4(),
            owner_id,
            payload,
            image_ref: image.image_ref,
            digest: image.digest,
            created_at: now,
        })
    }

    /// Tells a guardian about a transition that is already committed.
    /// A delivery failure cannot undo the commit, so it is only logged.
    pub(crate) async fn notify_after_commit(
        &self,
        school: &str,
        guardian_id: Uuid,
        message: &str,
        link_hint: &str,
    ) {
        if let Err(e) = self
            .notifier
            .notify(school, guardian_id, message, Some(link_hint))
            .await
        {
            warn!("Notification to guardian {guardian_id} in '{school}' failed: {e:#}");
        }
    }
}
