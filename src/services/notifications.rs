use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::school::schema_name;

/// Where guardian-facing messages go. Delivery guarantees are the sink's business.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        school: &str,
        guardian_id: Uuid,
        message: &str,
        link_hint: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Stores each notification in the school's inbox table and pushes it to the
/// guardian's registered devices through FCM.
pub struct PushNotifier {
    pool: PgPool,
    client: Client,
    fcm_api_key: Option<String>,
}

impl PushNotifier {
    pub fn new(pool: PgPool, fcm_api_key: Option<String>) -> Self {
        Self {
            pool,
            client: Client::new(),
            fcm_api_key,
        }
    }

    async fn send_fcm(
        &self,
        token: &str,
        body: &str,
        link_hint: Option<&str>,
    ) -> anyhow::Result<()> {
        let api_key = match &self.fcm_api_key {
            Some(k) => k,
            None => {
                tracing::debug!("FCM not configured, skipping push notification");
                return Ok(());
            }
        };

        let mut payload = json!({
            "to": token,
            "notification": {
                "title": "Escuela",
                "body": body,
            }
        });

        if let Some(link) = link_hint {
            payload["data"] = json!({ "link": link });
        }

        let response = self
            .client
            .post("https://fcm.googleapis.com/fcm/send")
            .header("Authorization", format!("key={}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("FCM error {}: {}", status, text);
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationSink for PushNotifier {
    async fn notify(
        &self,
        school: &str,
        guardian_id: Uuid,
        message: &str,
        link_hint: Option<&str>,
    ) -> anyhow::Result<()> {
        let schema = schema_name(school);
        sqlx::query(&format!(
            "INSERT INTO {schema}.notifications (guardian_id, message, link_hint)
             VALUES ($1, $2, $3)"
        ))
        .bind(guardian_id)
        .bind(message)
        .bind(link_hint)
        .execute(&self.pool)
        .await?;

        let tokens: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT platform, token FROM {schema}.push_tokens WHERE user_id = $1"
        ))
        .bind(guardian_id)
        .fetch_all(&self.pool)
        .await?;

        for (platform, token) in tokens {
            match platform.as_str() {
                "android" | "ios" => {
                    // Push is best effort once the inbox row exists.
                    if let Err(e) = self.send_fcm(&token, message, link_hint).await {
                        tracing::warn!("Push to {platform} device failed: {e}");
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
