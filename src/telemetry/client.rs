use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::telemetry::types::{SubscriptionResponse, SUBSCRIBED_PATHS};

pub const KEY_HEADER: &str = "DTGCommKey";
pub const DEFAULT_SUBSCRIPTION_ID: u32 = 1;
pub const KEY_POLL_INTERVAL: Duration = Duration::from_secs(5);

const HTTP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telemetry source answered {0}")]
    Status(StatusCode),

    #[error("Failed to parse response: {0}")]
    Json(#[source] serde_json::Error),

    #[error("Failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Key file {0} is empty")]
    EmptyKey(PathBuf),
}

/// Something that yields one subscription snapshot per call.
pub trait TelemetrySource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<SubscriptionResponse, TelemetryError>> + Send;
}

pub struct HttpTelemetryClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
    subscription_id: u32,
}

impl HttpTelemetryClient {
    pub fn new(
        base_url: impl Into<String>,
        key: impl Into<String>,
        subscription_id: u32,
    ) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            key: key.into(),
            subscription_id,
        })
    }

    fn subscription_url(&self) -> String {
        format!("{}/subscription", self.base_url)
    }

    /// Subscribe to every path the HUD reads. Failures are logged and skipped;
    /// the simulator may not expose all of them for every train.
    pub async fn register(&self) -> usize {
        let mut registered = 0;
        for path in SUBSCRIBED_PATHS {
            let url = format!("{}/{}", self.subscription_url(), path);
            let result = self
                .http
                .post(&url)
                .header(KEY_HEADER, &self.key)
                .query(&[("Subscription", self.subscription_id)])
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(path, "Subscribed");
                    registered += 1;
                }
                Ok(response) => {
                    warn!(path, status = %response.status(), "Subscription rejected")
                }
                Err(e) => warn!(path, error = %e, "Subscription request failed"),
            }
        }

        info!(
            registered,
            total = SUBSCRIBED_PATHS.len(),
            subscription = self.subscription_id,
            "Telemetry subscriptions registered"
        );
        registered
    }
}

impl TelemetrySource for HttpTelemetryClient {
    async fn fetch(&self) -> Result<SubscriptionResponse, TelemetryError> {
        let response = self
            .http
            .get(self.subscription_url())
            .header(KEY_HEADER, &self.key)
            .query(&[("Subscription", self.subscription_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(TelemetryError::Json)
    }
}

pub fn read_key(path: &Path) -> Result<String, TelemetryError> {
    let key = std::fs::read_to_string(path).map_err(|source| TelemetryError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(TelemetryError::EmptyKey(path.to_path_buf()));
    }
    Ok(key.to_string())
}

/// Block until the key file exists and has content.
pub async fn wait_for_key(path: &Path, poll: Duration) -> String {
    let mut announced = false;
    loop {
        match read_key(path) {
            Ok(key) => return key,
            Err(e) => {
                if !announced {
                    warn!(error = %e, "Waiting for telemetry key file");
                    announced = true;
                } else {
                    debug!(error = %e, "Key file still unavailable");
                }
            }
        }
        tokio::time::sleep(poll).await;
    }
}
