use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const PIP_DOCUMENT: &str = "pip.html";

/// Static page injected verbatim into the detached timer window.
#[async_trait]
pub trait PipDocumentSource: Send + Sync {
    async fn fetch_document(&self) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestPipDocumentSource {
    client: Client,
    url: Url,
}

impl ReqwestPipDocumentSource {
    pub fn new(document_base: &Url) -> Result<Self, InfraError> {
        let url = document_base
            .join(PIP_DOCUMENT)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid pip document url: {error}")))?;
        Ok(Self {
            client: Client::new(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PipDocumentSource for ReqwestPipDocumentSource {
    async fn fetch_document(&self) -> Result<String, InfraError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("failed to fetch {PIP_DOCUMENT}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading {PIP_DOCUMENT}: {error}")))?;
        if !status.is_success() {
            return Err(InfraError::Http {
                status: status.as_u16(),
                body: format!("failed to fetch {PIP_DOCUMENT}"),
            });
        }
        Ok(body)
    }
}

/// Serves a document that is already in memory, e.g. one bundled with the shell.
#[derive(Debug, Clone)]
pub struct StaticPipDocument {
    html: String,
}

impl StaticPipDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait]
impl PipDocumentSource for StaticPipDocument {
    async fn fetch_document(&self) -> Result<String, InfraError> {
        Ok(self.html.clone())
    }
}
