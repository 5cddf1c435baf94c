use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::app::classifier::{
    ChatRequest, ChatTransport, ClassifierClient, ClassifierError, TransportResponse,
    VisionClassifier,
};
use crate::config::ClassifierConfig;

/// OpenAI-compatible `/chat/completions` transport.
#[derive(Clone)]
pub struct HttpChatTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpChatTransport {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ClassifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| ClassifierError::Request(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| ClassifierError::Request(err.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

pub fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn VisionClassifier>> {
    let transport = HttpChatTransport::new(config)?;
    Ok(Arc::new(ClassifierClient::new(transport, config.model.clone())))
}
