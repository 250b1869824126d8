use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::{CollaboratorError, TextCollaborator};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// Text collaborator reached over HTTP: `POST {url}` with `{"prompt": ..}`,
/// answering `{"text": ..}`.
#[derive(Clone)]
pub struct HttpTextCollaborator {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpTextCollaborator {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, url, timeout }
    }
}

#[async_trait]
impl TextCollaborator for HttpTextCollaborator {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&CompletionRequest { prompt })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout(self.timeout)
                } else {
                    CollaboratorError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Failed(format!("HTTP {}", response.status())));
        }

        let body = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        let text = body.text.trim();
        if text.is_empty() {
            return Err(CollaboratorError::Failed("empty completion".to_string()));
        }
        Ok(text.to_string())
    }
}

/// Stand-in used when no collaborator URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCollaborator;

#[async_trait]
impl TextCollaborator for DisabledCollaborator {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unavailable("not configured".to_string()))
    }
}
