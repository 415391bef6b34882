use anyhow::{Context, Result};
use reqwest::Client;
use std::{future::Future, pin::Pin};
use thiserror::Error;

use crate::settings::UploaderConfig;

use super::types::{BatchBody, TelemetryEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server rejected telemetry: HTTP {code}")]
    Status { code: u16 },
    #[error("failed to encode telemetry: {0}")]
    Encode(String),
}

impl DeliveryError {
    /// Network failures and 5xx responses. The uploader does not act on this
    /// yet: permanent rejections are retried like everything else.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Network(_) => true,
            DeliveryError::Status { code } => *code >= 500 || *code == 429 || *code == 408,
            DeliveryError::Encode(_) => false,
        }
    }
}

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Where telemetry goes. The uploader only ever talks to this seam.
pub trait TelemetryTransport: Send + Sync {
    /// POST one event to its per-kind endpoint.
    fn send_single<'a>(&'a self, token: &'a str, event: &'a TelemetryEvent) -> DeliveryFuture<'a>;

    /// POST a whole retry queue to the batch endpoint.
    fn send_batch<'a>(&'a self, token: &'a str, events: &'a [TelemetryEvent]) -> DeliveryFuture<'a>;
}

pub const BATCH_ENDPOINT: &str = "/ai/track/batch";

/// reqwest-backed transport against the platform REST API.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &UploaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build telemetry HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_builder() {
                    DeliveryError::Encode(err.to_string())
                } else {
                    DeliveryError::Network(err.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                code: response.status().as_u16(),
            })
        }
    }
}

impl TelemetryTransport for HttpTransport {
    fn send_single<'a>(&'a self, token: &'a str, event: &'a TelemetryEvent) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let path = event.kind().endpoint();
            self.post(&path, token, &event.single_body()).await
        })
    }

    fn send_batch<'a>(&'a self, token: &'a str, events: &'a [TelemetryEvent]) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.post(BATCH_ENDPOINT, token, &BatchBody::from_events(events))
                .await
        })
    }
}
