use crate::config::EndpointConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{Source, UserSafetyProfile};
use crate::sources::SourceClient;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const REACTION_LIMIT: usize = 10;

/// openFDA adverse-event client
///
/// Queries `/drug/event.json` for reports mentioning the ingredient as a
/// substance and summarizes report counts plus the most frequent reactions.
/// A 404 means openFDA holds no reports for the substance, which is clean
/// data, not a failure.
pub struct FdaClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FdaClient {
    /// Creates a client against the configured openFDA endpoint
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AnalysisError::Http)?;
        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn empty_payload() -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("adverse_event_reports".into(), Value::from(0));
        payload.insert("serious_reports".into(), Value::from(0));
        payload.insert("top_reactions".into(), Value::Array(Vec::new()));
        payload
    }
}

#[async_trait]
impl SourceClient for FdaClient {
    fn source(&self) -> Source {
        Source::Fda
    }

    async fn fetch_payload(
        &self,
        name: &str,
        _profile: Option<&UserSafetyProfile>,
    ) -> Result<Map<String, Value>> {
        let url = format!("{}/drug/event.json", self.base_url);
        let search = format!("patient.drug.openfda.substance_name:\"{}\"", name);
        let mut request = self.client.get(&url).query(&[
            ("search", search.as_str()),
            ("count", "patient.reaction.reactionmeddrapt.exact"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Ok(Self::empty_payload());
        }
        if !status.is_success() {
            return Err(AnalysisError::UpstreamStatus {
                source: self.source().to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let results = body["results"]
            .as_array()
            .ok_or_else(|| AnalysisError::Parse("openFDA response missing results".into()))?;

        let mut total: u64 = 0;
        let mut serious: u64 = 0;
        let mut top_reactions = Vec::new();
        for (i, bucket) in results.iter().enumerate() {
            let count = bucket["count"].as_u64().unwrap_or(0);
            total += count;
            if let Some(term) = bucket["term"].as_str() {
                if i < REACTION_LIMIT {
                    top_reactions.push(Value::from(term));
                }
                // MedDRA preferred terms for the severe end of the scale
                if matches!(term, "DEATH" | "ANAPHYLACTIC REACTION" | "HOSPITALISATION") {
                    serious += count;
                }
            }
        }

        let mut payload = Map::new();
        payload.insert("adverse_event_reports".into(), Value::from(total));
        payload.insert("serious_reports".into(), Value::from(serious));
        payload.insert("top_reactions".into(), Value::Array(top_reactions));
        Ok(payload)
    }
}
