use crate::config::EndpointConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{Source, UserSafetyProfile};
use crate::sources::SourceClient;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// Hazard square image alt text, e.g. "Score: 7"
static SCORE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Ss]core:?\s*(\d{1,2})").expect("valid regex"));

/// EWG Skin Deep client
///
/// Skin Deep serves HTML; some mirrors expose a JSON search endpoint. The
/// client accepts either: a JSON body is read directly, anything else goes
/// through the HTML scrape path. Hazard scores are on EWG's 1-10 scale
/// (1 safest).
pub struct EwgClient {
    client: Client,
    base_url: String,
}

impl EwgClient {
    /// Creates a client against the configured Skin Deep endpoint
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

    fn payload_from_json(body: &Value) -> Result<Map<String, Value>> {
        let hazard = body["hazard_score"]
            .as_u64()
            .ok_or_else(|| AnalysisError::Parse("EWG JSON missing hazard_score".into()))?;
        let concerns = body["concerns"].as_array().cloned().unwrap_or_default();
        let availability = body["data_availability"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        Ok(Self::build_payload(hazard, concerns, availability))
    }

    fn payload_from_html(html: &str) -> Result<Map<String, Value>> {
        let document = Html::parse_document(html);

        // The hazard square carries the score in its class or alt text
        let score_selector =
            Selector::parse(".chemical-score, .squircle-score, img.score-image")
                .map_err(|_| AnalysisError::Parse("bad selector".into()))?;

        let mut hazard = None;
        for element in document.select(&score_selector) {
            let text: String = element
                .value()
                .attr("alt")
                .map(str::to_string)
                .unwrap_or_else(|| element.text().collect());
            if let Some(caps) = SCORE_TEXT.captures(&text) {
                hazard = caps[1].parse::<u64>().ok();
                break;
            }
            for class in element.value().classes() {
                if let Some(digits) = class.strip_prefix("score-") {
                    hazard = digits.parse::<u64>().ok();
                }
            }
            if hazard.is_some() {
                break;
            }
        }

        let hazard = hazard
            .ok_or_else(|| AnalysisError::Parse("no hazard score found in EWG page".into()))?;

        let concern_selector = Selector::parse(".chemical-concerns li, .concerns li")
            .map_err(|_| AnalysisError::Parse("bad selector".into()))?;
        let concerns: Vec<Value> = document
            .select(&concern_selector)
            .map(|li| {
                let text: String = li.text().collect();
                Value::from(text.trim().to_lowercase())
            })
            .collect();

        Ok(Self::build_payload(hazard, concerns, "scraped".into()))
    }

    fn build_payload(
        hazard: u64,
        concerns: Vec<Value>,
        availability: String,
    ) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("hazard_score".into(), Value::from(hazard.clamp(1, 10)));
        payload.insert("concerns".into(), Value::Array(concerns));
        payload.insert("data_availability".into(), Value::from(availability));
        payload
    }
}

#[async_trait]
impl SourceClient for EwgClient {
    fn source(&self) -> Source {
        Source::Ewg
    }

    async fn fetch_payload(
        &self,
        name: &str,
        _profile: Option<&UserSafetyProfile>,
    ) -> Result<Map<String, Value>> {
        let url = format!("{}/search", self.base_url);
        let response = self.client.get(&url).query(&[("q", name)]).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::UpstreamStatus {
                source: self.source().to_string(),
                status: status.as_u16(),
            });
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);

        let body = response.text().await?;
        if is_json {
            let json: Value = serde_json::from_str(&body)?;
            Self::payload_from_json(&json)
        } else {
            Self::payload_from_html(&body)
        }
    }
}
