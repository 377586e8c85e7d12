use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::kpi::KpiReference;

/// Aggregate answer of the verification host for one frame.
///
/// `success` is authoritative; per-verification details are carried along
/// for logging only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<serde_json::Value>,
}

/// Runs every verification against a single image. Implementations are
/// called once per candidate frame and need not be reentrant.
pub trait VerificationCapability: Send + Sync {
    fn execute<'a>(
        &'a self,
        verifications: &'a [KpiReference],
        image_path: &'a Path,
        team_id: &'a str,
    ) -> BoxFuture<'a, Result<VerificationReport, VerificationError>>;
}

/// Client for a device host's batch verification endpoint.
pub struct HttpVerificationClient {
    http: Client,
    base_url: String,
    device_id: String,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    device_id: &'a str,
    team_id: &'a str,
    image_path: &'a Path,
    verifications: &'a [KpiReference],
}

impl HttpVerificationClient {
    pub fn new(base_url: &str, device_id: &str) -> Result<Self, VerificationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(VerificationError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
        })
    }
}

impl VerificationCapability for HttpVerificationClient {
    fn execute<'a>(
        &'a self,
        verifications: &'a [KpiReference],
        image_path: &'a Path,
        team_id: &'a str,
    ) -> BoxFuture<'a, Result<VerificationReport, VerificationError>> {
        async move {
            let url = format!("{}/verification/execute", self.base_url);
            let body = ExecuteRequest {
                device_id: &self.device_id,
                team_id,
                image_path,
                verifications,
            };

            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(VerificationError::Http)?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(VerificationError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }

            response.json().await.map_err(VerificationError::Http)
        }
        .boxed()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("verification host returned {status}: {body}")]
    Status { status: u16, body: String },
}
