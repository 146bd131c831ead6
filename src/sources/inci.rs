use crate::config::EndpointConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{Source, UserSafetyProfile};
use crate::sources::SourceClient;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

/// INCI/Biodizionario hazard client
///
/// Biodizionario grades ingredients 0-4 (0 green, 4 red) on health and,
/// separately, on environmental impact. The dataset is served as JSON keyed
/// by INCI name.
pub struct InciClient {
    client: Client,
    base_url: String,
}

impl InciClient {
    /// Creates a client against the configured dataset endpoint
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AnalysisError::Http)?;
        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SourceClient for InciClient {
    fn source(&self) -> Source {
        Source::Inci
    }

    async fn fetch_payload(
        &self,
        name: &str,
        _profile: Option<&UserSafetyProfile>,
    ) -> Result<Map<String, Value>> {
        let url = format!("{}/ingredient", self.base_url);
        let response = self.client.get(&url).query(&[("name", name)]).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::UpstreamStatus {
                source: self.source().to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let hazard = body["hazard_class"]
            .as_u64()
            .ok_or_else(|| AnalysisError::Parse("INCI entry missing hazard_class".into()))?;
        if hazard > 4 {
            return Err(AnalysisError::Parse(format!(
                "INCI hazard_class {} outside 0-4",
                hazard
            )));
        }

        let mut payload = Map::new();
        payload.insert("hazard_class".into(), Value::from(hazard));
        payload.insert(
            "eco_class".into(),
            Value::from(body["eco_class"].as_u64().unwrap_or(hazard).min(4)),
        );
        payload.insert(
            "description".into(),
            Value::from(body["description"].as_str().unwrap_or("")),
        );
        Ok(payload)
    }
}
