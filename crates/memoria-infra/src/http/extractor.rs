//! Remote topic extractor over HTTP.
//!
//! POSTs the camelCase `TopicExtractionParams` body to the configured
//! endpoint. The response body is ignored; only the status matters.

use memoria_core::extraction::collaborator::{ExtractorError, TopicExtractionParams, TopicExtractor};
use memoria_types::config::ExtractorConfig;
use memoria_types::memory::join_layers;
use tracing::debug;

use super::{client_with_timeout, is_transient_send_error, is_transient_status};

pub struct HttpTopicExtractor {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl HttpTopicExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            http: client_with_timeout(config.timeout_secs),
        }
    }
}

impl TopicExtractor for HttpTopicExtractor {
    #[tracing::instrument(
        skip(self, params),
        fields(
            memory_extraction.user_id = %params.user_id,
            memory_extraction.topic_id = %params.topic_id,
        )
    )]
    async fn extract_topic(&self, params: &TopicExtractionParams) -> Result<(), ExtractorError> {
        if params.layers.is_empty() {
            debug!("no layers requested, skipping extractor call");
            return Ok(());
        }

        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(ExtractorError::Rejected(
                "no extractor endpoint configured".to_string(),
            ));
        };

        debug!(layers = %join_layers(&params.layers), endpoint, "calling extractor");
        let response = self
            .http
            .post(endpoint)
            .json(params)
            .send()
            .await
            .map_err(|e| {
                if is_transient_send_error(&e) {
                    ExtractorError::Transient(e.to_string())
                } else {
                    ExtractorError::Rejected(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("extractor returned {status}: {body}");
        if is_transient_status(status) {
            Err(ExtractorError::Transient(message))
        } else {
            Err(ExtractorError::Rejected(message))
        }
    }
}
