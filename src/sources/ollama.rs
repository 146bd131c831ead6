use crate::config::LlmEndpointConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{RiskAnalysis, Source, UserSafetyProfile};
use crate::sources::SourceClient;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// Models love wrapping JSON in markdown fences
static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid regex"));

/// A substitute candidate as reported by the model, before scoring
#[derive(Debug, Clone, Deserialize)]
pub struct SubstituteSuggestion {
    /// Candidate ingredient name
    pub name: String,
    /// Claimed benefits of the swap
    #[serde(default)]
    pub benefits: Vec<String>,
    /// Free-text justification
    #[serde(default)]
    pub reasoning: String,
    /// 0-100 model confidence in the suggestion
    #[serde(default)]
    pub confidence: f64,
    /// Model's own safety estimate, used as fallback when scoring fails
    #[serde(default)]
    pub safety_score: Option<f64>,
    /// Model's own eco estimate, same fallback role
    #[serde(default)]
    pub eco_score: Option<f64>,
}

/// Ollama-compatible LLM client
///
/// Produces a structured per-ingredient risk analysis and, separately,
/// substitute suggestions for problematic ingredients. Model output is
/// loosely structured text; parsing is isolated behind
/// [`parse_risk_analysis`] so prompt or model changes stay contained here.
/// Unparseable output is an ordinary failed fetch, never a crash.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Creates a client against the configured Ollama endpoint
    pub fn new(endpoint: &LlmEndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(AnalysisError::Http)?;
        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
        })
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "format": "json",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::UpstreamStatus {
                source: Source::OnlineAi.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        body["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::Llm("generate response missing 'response' field".into()))
    }

    fn profile_context(profile: Option<&UserSafetyProfile>) -> String {
        match profile {
            Some(p) => {
                let mut parts = Vec::new();
                if let Some(skin) = &p.skin_type {
                    parts.push(format!("skin type: {}", skin));
                }
                if !p.concerns.is_empty() {
                    parts.push(format!("concerns: {}", p.concerns.join(", ")));
                }
                if !p.allergies.is_empty() {
                    parts.push(format!("allergies: {}", p.allergies.join(", ")));
                }
                if parts.is_empty() {
                    String::new()
                } else {
                    format!(" The user has {}.", parts.join("; "))
                }
            }
            None => String::new(),
        }
    }

    /// Runs the risk-analysis prompt for one ingredient
    pub async fn analyze(
        &self,
        name: &str,
        profile: Option<&UserSafetyProfile>,
    ) -> Result<RiskAnalysis> {
        let prompt = format!(
            "Assess the cosmetic ingredient \"{}\" for human safety and \
             environmental impact.{} Respond with one JSON object with keys \
             safety_score (0-100, higher is safer), eco_score (0-100), \
             risk_tags (array of short lowercase hazard tags, empty if none) \
             and reasoning (one paragraph).",
            name,
            Self::profile_context(profile),
        );
        let raw = self.generate(prompt).await?;
        parse_risk_analysis(&raw)
    }

    /// Asks the model for up to `limit` substitute candidates
    pub async fn suggest_substitutes(
        &self,
        name: &str,
        profile: Option<&UserSafetyProfile>,
        limit: usize,
    ) -> Result<Vec<SubstituteSuggestion>> {
        let prompt = format!(
            "Suggest up to {} safer cosmetic substitutes for the ingredient \
             \"{}\".{} Respond with a JSON array; each element has keys name, \
             benefits (array of strings), reasoning, confidence (0-100), \
             safety_score (0-100) and eco_score (0-100).",
            limit,
            name,
            Self::profile_context(profile),
        );
        let raw = self.generate(prompt).await?;
        let suggestions = parse_substitutes(&raw)?;
        debug!(
            "model suggested {} substitutes for '{}'",
            suggestions.len(),
            name
        );
        Ok(suggestions.into_iter().take(limit).collect())
    }
}

#[async_trait]
impl SourceClient for OllamaClient {
    fn source(&self) -> Source {
        Source::OnlineAi
    }

    async fn fetch_payload(
        &self,
        name: &str,
        profile: Option<&UserSafetyProfile>,
    ) -> Result<Map<String, Value>> {
        let analysis = self.analyze(name, profile).await?;
        match serde_json::to_value(&analysis)? {
            Value::Object(payload) => Ok(payload),
            _ => Err(AnalysisError::Llm("risk analysis did not serialize to an object".into())),
        }
    }
}

/// Turns raw model output into a typed risk analysis
///
/// Tries the whole body as JSON first, then a fenced code block, then the
/// outermost brace-delimited span. Scores are clamped to 0-100.
pub fn parse_risk_analysis(raw: &str) -> Result<RiskAnalysis> {
    let mut analysis: RiskAnalysis = parse_salvaging(raw, '{', '}')?;
    analysis.safety_score = analysis.safety_score.clamp(0.0, 100.0);
    analysis.eco_score = analysis.eco_score.clamp(0.0, 100.0);
    Ok(analysis)
}

fn parse_substitutes(raw: &str) -> Result<Vec<SubstituteSuggestion>> {
    let mut suggestions: Vec<SubstituteSuggestion> = parse_salvaging(raw, '[', ']')?;
    for s in &mut suggestions {
        s.confidence = s.confidence.clamp(0.0, 100.0);
    }
    Ok(suggestions)
}

fn parse_salvaging<T: serde::de::DeserializeOwned>(raw: &str, open: char, close: char) -> Result<T> {
    if let Ok(parsed) = serde_json::from_str::<T>(raw.trim()) {
        return Ok(parsed);
    }

    if let Some(caps) = FENCED_JSON.captures(raw) {
        if let Ok(parsed) = serde_json::from_str::<T>(caps[1].trim()) {
            return Ok(parsed);
        }
    }

    let start = raw.find(open);
    let end = raw.rfind(close);
    if let (Some(start), Some(end)) = (start, end) {
        if end > start {
            if let Ok(parsed) = serde_json::from_str::<T>(&raw[start..=end]) {
                return Ok(parsed);
            }
        }
    }

    Err(AnalysisError::Llm(format!(
        "model output is not parseable JSON: {:.80}",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_json() {
        let raw = r#"{"safety_score": 25, "eco_score": 30,
                      "risk_tags": ["carcinogen"], "reasoning": "bad news"}"#;
        let analysis = parse_risk_analysis(raw).unwrap();
        assert_eq!(analysis.safety_score, 25.0);
        assert_eq!(analysis.risk_tags, vec!["carcinogen"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Here is my assessment:\n```json\n{\"safety_score\": 90, \"eco_score\": 85, \"risk_tags\": [], \"reasoning\": \"benign\"}\n```\nHope that helps!";
        let analysis = parse_risk_analysis(raw).unwrap();
        assert_eq!(analysis.safety_score, 90.0);
        assert!(analysis.risk_tags.is_empty());
    }

    #[test]
    fn test_parse_embedded_json_with_chatter() {
        let raw = "Sure! {\"safety_score\": 60, \"eco_score\": 55, \"risk_tags\": [\"irritant\"], \"reasoning\": \"mild\"} Let me know if you need more.";
        let analysis = parse_risk_analysis(raw).unwrap();
        assert_eq!(analysis.eco_score, 55.0);
    }

    #[test]
    fn test_scores_clamped() {
        let raw = r#"{"safety_score": 250, "eco_score": -10, "risk_tags": [], "reasoning": ""}"#;
        let analysis = parse_risk_analysis(raw).unwrap();
        assert_eq!(analysis.safety_score, 100.0);
        assert_eq!(analysis.eco_score, 0.0);
    }

    #[test]
    fn test_unparseable_output_is_llm_error() {
        let err = parse_risk_analysis("I cannot answer that.").unwrap_err();
        assert!(matches!(err, AnalysisError::Llm(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_analyze_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"response": "{\"safety_score\": 15, \"eco_score\": 20, \"risk_tags\": [\"carcinogen\", \"irritant\"], \"reasoning\": \"known hazard\"}"}"#,
            )
            .create_async()
            .await;

        let client = OllamaClient::new(&LlmEndpointConfig {
            base_url: server.url(),
            model: "llama3".into(),
        })
        .unwrap();

        let analysis = client.analyze("formaldehyde", None).await.unwrap();
        assert_eq!(analysis.safety_score, 15.0);
        assert_eq!(analysis.risk_tags.len(), 2);
    }

    #[tokio::test]
    async fn test_suggest_substitutes_parses_array() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"response": "[{\"name\": \"phenoxyethanol\", \"benefits\": [\"gentler\"], \"reasoning\": \"widely tolerated\", \"confidence\": 80, \"safety_score\": 70, \"eco_score\": 65}]"}"#,
            )
            .create_async()
            .await;

        let client = OllamaClient::new(&LlmEndpointConfig {
            base_url: server.url(),
            model: "llama3".into(),
        })
        .unwrap();

        let suggestions = client
            .suggest_substitutes("parabens", None, 3)
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].name, "phenoxyethanol");
    }

    #[tokio::test]
    async fn test_profile_reaches_prompt() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Regex("sensitive".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"response": "{\"safety_score\": 50, \"eco_score\": 50, \"risk_tags\": [], \"reasoning\": \"ok\"}"}"#,
            )
            .create_async()
            .await;

        let client = OllamaClient::new(&LlmEndpointConfig {
            base_url: server.url(),
            model: "llama3".into(),
        })
        .unwrap();

        let profile = UserSafetyProfile {
            skin_type: Some("sensitive".into()),
            ..UserSafetyProfile::default()
        };
        let analysis = client.analyze("aqua", Some(&profile)).await.unwrap();
        assert_eq!(analysis.safety_score, 50.0);
    }
}
