use crate::config::EndpointConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{Source, UserSafetyProfile};
use crate::sources::SourceClient;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

/// EU CosIng regulatory client
///
/// CosIng lists cosmetic ingredients against the annexes of Regulation (EC)
/// 1223/2009: Annex II is banned outright, Annex III is restricted. An
/// ingredient absent from the dataset is unregulated, which is itself data.
pub struct CosingClient {
    client: Client,
    base_url: String,
}

impl CosingClient {
    /// Creates a client against the configured CosIng endpoint
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

    fn unregulated_payload() -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("annex".into(), Value::Null);
        payload.insert("restricted".into(), Value::from(false));
        payload.insert("banned".into(), Value::from(false));
        payload.insert("restriction_text".into(), Value::from(""));
        payload.insert("functions".into(), Value::Array(Vec::new()));
        payload
    }
}

#[async_trait]
impl SourceClient for CosingClient {
    fn source(&self) -> Source {
        Source::Cosing
    }

    async fn fetch_payload(
        &self,
        name: &str,
        _profile: Option<&UserSafetyProfile>,
    ) -> Result<Map<String, Value>> {
        let url = format!("{}/api/ingredients", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("search", name)])
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Self::unregulated_payload());
        }
        if !status.is_success() {
            return Err(AnalysisError::UpstreamStatus {
                source: self.source().to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let entries = body["results"]
            .as_array()
            .ok_or_else(|| AnalysisError::Parse("CosIng response missing results".into()))?;
        let Some(entry) = entries.first() else {
            return Ok(Self::unregulated_payload());
        };

        let annex = entry["annex"].as_str().unwrap_or("").trim().to_uppercase();
        // Annex references come as "II", "III/1" and similar; only the
        // leading numeral matters. II bans, III restricts; IV, V and VI are
        // positive allowed-lists (colorants, preservatives, UV filters) and
        // carry no penalty.
        let annex_number = annex
            .split(|c: char| c == '/' || c.is_whitespace())
            .next()
            .unwrap_or("");
        let banned = annex_number == "II";
        let restricted = annex_number == "III";

        let mut payload = Map::new();
        payload.insert(
            "annex".into(),
            if annex.is_empty() {
                Value::Null
            } else {
                Value::from(annex)
            },
        );
        payload.insert("restricted".into(), Value::from(restricted));
        payload.insert("banned".into(), Value::from(banned));
        payload.insert(
            "restriction_text".into(),
            Value::from(entry["restriction"].as_str().unwrap_or("")),
        );
        payload.insert(
            "functions".into(),
            entry["functions"].as_array().cloned().map(Value::Array).unwrap_or_else(|| Value::Array(Vec::new())),
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> EndpointConfig {
        EndpointConfig {
            base_url: url.to_string(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn test_annex_iii_is_restricted_not_banned() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/ingredients")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results": [{"annex": "III", "restriction": "max 0.2%",
                    "functions": ["preservative"]}]}"#,
            )
            .create_async()
            .await;

        let client = CosingClient::new(&endpoint(&server.url())).unwrap();
        let payload = client.fetch_payload("formaldehyde", None).await.unwrap();

        assert_eq!(payload["restricted"], Value::from(true));
        assert_eq!(payload["banned"], Value::from(false));
        assert_eq!(payload["restriction_text"], Value::from("max 0.2%"));
    }

    #[tokio::test]
    async fn test_annex_ii_is_banned() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/ingredients")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results": [{"annex": "II", "restriction": "prohibited"}]}"#)
            .create_async()
            .await;

        let client = CosingClient::new(&endpoint(&server.url())).unwrap();
        let payload = client.fetch_payload("hydroquinone", None).await.unwrap();

        assert_eq!(payload["banned"], Value::from(true));
        assert_eq!(payload["restricted"], Value::from(false));
    }

    #[tokio::test]
    async fn test_allowed_list_annexes_carry_no_penalty() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/ingredients")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results": [{"annex": "V/12", "restriction": "",
                    "functions": ["preservative"]}]}"#,
            )
            .create_async()
            .await;

        let client = CosingClient::new(&endpoint(&server.url())).unwrap();
        let payload = client.fetch_payload("phenoxyethanol", None).await.unwrap();

        // Annex V is the allowed preservative list, not a restriction
        assert_eq!(payload["restricted"], Value::from(false));
        assert_eq!(payload["banned"], Value::from(false));
        assert_eq!(payload["annex"], Value::from("V/12"));
    }

    #[tokio::test]
    async fn test_absent_ingredient_is_unregulated() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/ingredients")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let client = CosingClient::new(&endpoint(&server.url())).unwrap();
        let payload = client.fetch_payload("aqua", None).await.unwrap();

        assert_eq!(payload["restricted"], Value::from(false));
        assert_eq!(payload["banned"], Value::from(false));
        assert_eq!(payload["annex"], Value::Null);
    }
}
