//! Credential retrieval for the chat demo.
//!
//! Credentials are short-lived, so they are fetched again on every renewal
//! rather than cached.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use cp_protocol::Credential;

/// Where fresh credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// `GET` a credential document from the credential service.
    Http { url: String, client: reqwest::Client },
    /// Read a credential document from disk.
    File(PathBuf),
}

impl CredentialSource {
    pub fn http(url: impl Into<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::Http {
            url: url.into(),
            client,
        })
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Fetch a fresh credential.
    pub async fn fetch(&self) -> anyhow::Result<Credential> {
        let credential: Credential = match self {
            Self::Http { url, client } => client
                .get(url)
                .send()
                .await
                .with_context(|| format!("credential request to {url} failed"))?
                .error_for_status()
                .context("credential service returned an error")?
                .json()
                .await
                .context("credential service returned an unreadable document")?,
            Self::File(path) => {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("{} is not a credential document", path.display()))?
            }
        };

        tracing::info!(
            endpoint = %credential.broker_endpoint,
            expiration = ?credential.expiration,
            "credentials fetched"
        );
        Ok(credential)
    }
}
