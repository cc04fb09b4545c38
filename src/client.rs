use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::error::Error as StdError;
use thiserror::Error;
use tracing::debug;

use crate::config::PanelConfig;
use crate::models::{ApiError, JobReport, OperationKind, ProvisionRequest};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Server returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
}

impl ClientError {
    /// Display text of the error followed by every underlying cause.
    pub fn reason(&self) -> String {
        let mut reason = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !reason.ends_with(&text) {
                reason.push_str(": ");
                reason.push_str(&text);
            }
            source = cause.source();
        }
        reason
    }
}

/// Status line and raw body of a provisioning reply, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The provisioning service as seen by the request controller.
#[async_trait]
pub trait ProvisionerApi: Send + Sync + 'static {
    async fn submit(
        &self,
        kind: OperationKind,
        request: &ProvisionRequest,
    ) -> Result<RawReply, ClientError>;
}

pub struct HttpProvisioner {
    client: Client,
    config: PanelConfig,
}

impl HttpProvisioner {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobReport, ClientError> {
        let resp = self
            .client
            .get(self.config.endpoint(&format!("job/{}", job_id)))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if status.is_success() {
            Ok(serde_json::from_slice(&body)?)
        } else {
            let detail = serde_json::from_slice::<ApiError>(&body)
                .ok()
                .and_then(|error| error.detail)
                .map(|detail| match detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            Err(ClientError::Status { status, detail })
        }
    }
}

#[async_trait]
impl ProvisionerApi for HttpProvisioner {
    async fn submit(
        &self,
        kind: OperationKind,
        request: &ProvisionRequest,
    ) -> Result<RawReply, ClientError> {
        let url = self.config.endpoint(kind.endpoint());
        debug!(%url, instance = %request.instance_name, "posting provisioning request");

        // .json() also sets Content-Type: application/json
        let resp = self.client.post(&url).json(request).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        debug!(%url, %status, bytes = body.len(), "provisioning reply received");
        Ok(RawReply::new(status, body.to_vec()))
    }
}
