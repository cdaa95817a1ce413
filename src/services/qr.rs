use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A rendered, scannable image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    pub image_ref: String,
    /// SHA-256 of the image bytes, hex encoded.
    pub digest: String,
}

/// Renders a scannable image for an opaque payload. Any error is fatal to
/// the request creation that asked for it.
#[async_trait]
pub trait QrIssuer: Send + Sync {
    async fn issue(&self, payload: &str, owner_id: Uuid) -> anyhow::Result<QrImage>;
}

/// Issues QR images through an HTTP rendering service
/// (`GET {service_url}?size=300x300&data=<payload>` returning a PNG).
pub struct HttpQrIssuer {
    client: Client,
    service_url: String,
}

impl HttpQrIssuer {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            service_url: service_url.into(),
        }
    }
}

#[async_trait]
impl QrIssuer for HttpQrIssuer {
    async fn issue(&self, payload: &str, owner_id: Uuid) -> anyhow::Result<QrImage> {
        let request = self
            .client
            .get(&self.service_url)
            .query(&[("size", "300x300"), ("data", payload)])
            .build()?;
        let image_ref = request.url().to_string();

        let response = self.client.execute(request).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("QR service error {status}: {text}");
        }

        let bytes = response.bytes().await?;
        anyhow::ensure!(!bytes.is_empty(), "QR service returned an empty image");

        tracing::debug!("Issued QR image ({} bytes) for owner {owner_id}", bytes.len());
        Ok(QrImage {
            image_ref,
            digest: hex::encode(Sha256::digest(&bytes)),
        })
    }
}
