use crate::domain::models::LoggedInterval;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use url::Url;

const FOCUS_SESSIONS_PATH: &str = "focus-sessions";

#[async_trait]
pub trait SessionLogClient: Send + Sync {
    async fn log_interval(&self, interval: &LoggedInterval) -> Result<(), InfraError>;
}

/// At-most-once recorder: no retry and no idempotency key.
#[derive(Debug, Clone)]
pub struct ReqwestSessionLogClient {
    client: Client,
    endpoint: Url,
}

impl ReqwestSessionLogClient {
    pub fn new(api_base: &Url) -> Result<Self, InfraError> {
        let endpoint = api_base.join(FOCUS_SESSIONS_PATH).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid focus sessions endpoint: {error}"))
        })?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn cache_busted_endpoint(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("t", &Utc::now().timestamp_millis().to_string());
        url
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        InfraError::Http {
            status: status.as_u16(),
            body: body.trim().to_string(),
        }
    }
}

#[async_trait]
impl SessionLogClient for ReqwestSessionLogClient {
    async fn log_interval(&self, interval: &LoggedInterval) -> Result<(), InfraError> {
        interval.validate().map_err(InfraError::InvalidConfig)?;

        let response = self
            .client
            .post(self.cache_busted_endpoint())
            .json(interval)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("failed to log focus session: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::http_error(status, &body))
    }
}
