use inciscope::aggregator::Aggregator;
use inciscope::config::LlmEndpointConfig;
use inciscope::metrics::Metrics;
use inciscope::model::{RecommendationTier, Source, UserSafetyProfile};
use inciscope::scoring::AnalysisEngine;
use inciscope::sources::{OllamaClient, SourceClient, UpstreamClient};
use inciscope::AnalysisError;
use async_trait::async_trait;
use mockito::Matcher;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;

mod common;
use common::{fast_tuning, setup_test_logger};

struct StubSource {
    source: Source,
    payload: Value,
}

#[async_trait]
impl SourceClient for StubSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_payload(
        &self,
        _name: &str,
        _profile: Option<&UserSafetyProfile>,
    ) -> inciscope::Result<Map<String, Value>> {
        match self.payload.clone() {
            Value::Object(map) => Ok(map),
            _ => unreachable!("stub payloads are objects"),
        }
    }
}

fn stub_client(source: Source, payload: Value) -> Arc<UpstreamClient> {
    Arc::new(UpstreamClient::new(
        Arc::new(StubSource { source, payload }),
        &fast_tuning(),
        Arc::new(Metrics::new()),
    ))
}

fn engine_over(clients: Vec<Arc<UpstreamClient>>, ollama_url: &str) -> AnalysisEngine {
    let metrics = Arc::new(Metrics::new());
    let aggregator = Arc::new(
        Aggregator::new(clients, Duration::from_secs(10), metrics.clone()).unwrap(),
    );
    let ai = Arc::new(
        OllamaClient::new(&LlmEndpointConfig {
            base_url: ollama_url.to_string(),
            model: "llama3".into(),
        })
        .unwrap(),
    );
    AnalysisEngine::new(aggregator, ai, metrics, 3)
}

#[test_case(95.0, RecommendationTier::Recommended; "clean score")]
#[test_case(80.0, RecommendationTier::Recommended; "recommended lower boundary")]
#[test_case(79.9, RecommendationTier::Safe; "just under recommended")]
#[test_case(70.0, RecommendationTier::Safe; "mid safe")]
#[test_case(60.0, RecommendationTier::Safe; "safe lower boundary")]
#[test_case(59.9, RecommendationTier::Caution; "just under safe")]
#[test_case(50.0, RecommendationTier::Caution; "mid caution")]
#[test_case(40.0, RecommendationTier::Caution; "caution lower boundary")]
#[test_case(39.9, RecommendationTier::Avoid; "just under caution")]
#[test_case(20.0, RecommendationTier::Avoid; "deep avoid")]
#[test_case(0.0, RecommendationTier::Avoid; "floor")]
fn test_tier_boundaries(score: f64, expected: RecommendationTier) {
    assert_eq!(RecommendationTier::from_score(score), expected);
}

#[tokio::test]
async fn test_empty_ingredient_list_is_rejected() {
    let server = mockito::Server::new_async().await;
    let engine = engine_over(
        vec![stub_client(
            Source::Ewg,
            json!({ "hazard_score": 1, "concerns": [] }),
        )],
        &server.url(),
    );

    let result = engine.analyze_product(&[], None).await;
    assert!(matches!(result, Err(AnalysisError::Validation(_))));
}

#[tokio::test]
async fn test_clean_product_gets_no_substitutes() {
    setup_test_logger();
    // No Ollama mock at all: a clean ingredient must never reach the AI
    let server = mockito::Server::new_async().await;
    let engine = engine_over(
        vec![stub_client(
            Source::Ewg,
            json!({ "hazard_score": 1, "concerns": [] }),
        )],
        &server.url(),
    );

    let summary = engine
        .analyze_product(&["aqua".to_string(), "glycerin".to_string()], None)
        .await
        .unwrap();

    assert_eq!(summary.tier, RecommendationTier::Recommended);
    assert!(summary.substitutes.is_empty());
    assert!(summary.risk_flags.is_empty());
    assert_eq!(summary.ingredients.len(), 2);
    assert_eq!(summary.confidence, 100.0);
}

#[tokio::test]
async fn test_risky_ingredient_yields_sorted_substitutes() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;

    let suggest_mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("Suggest up to".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"response": "[{\"name\": \"phenoxyethanol\", \"benefits\": [\"gentler\"], \"reasoning\": \"broadly tolerated\", \"confidence\": 60, \"safety_score\": 70, \"eco_score\": 65}, {\"name\": \"sodium benzoate\", \"benefits\": [\"food grade\"], \"reasoning\": \"well studied\", \"confidence\": 90, \"safety_score\": 68, \"eco_score\": 60}]"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    // Both candidates score identically here, so the model's confidence
    // decides the order
    let analyze_mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("Assess the cosmetic".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"response": "{\"safety_score\": 80, \"eco_score\": 75, \"risk_tags\": [], \"reasoning\": \"acceptable preservative\"}"}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let engine = engine_over(
        vec![stub_client(
            Source::Ewg,
            json!({ "hazard_score": 9, "concerns": ["irritant"] }),
        )],
        &server.url(),
    );

    let summary = engine
        .analyze_product(&["methylparaben".to_string()], None)
        .await
        .unwrap();

    assert_eq!(summary.tier, RecommendationTier::Avoid);
    assert!(summary.risk_flags.iter().any(|f| f == "high-hazard"));
    assert!(summary.risk_flags.iter().any(|f| f == "irritant"));

    let names: Vec<&str> = summary
        .substitutes
        .iter()
        .map(|s| s.candidate_name.as_str())
        .collect();
    assert_eq!(names, vec!["sodium benzoate", "phenoxyethanol"]);
    for substitute in &summary.substitutes {
        assert_eq!(substitute.original_ingredient, "methylparaben");
        assert_eq!(substitute.safety_score, 80.0);
    }

    suggest_mock.assert_async().await;
    analyze_mock.assert_async().await;
}

#[tokio::test]
async fn test_substitutes_fall_back_to_suggested_scores() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;

    let _suggest = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("Suggest up to".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"response": "[{\"name\": \"squalane\", \"benefits\": [], \"reasoning\": \"inert emollient\", \"confidence\": 70, \"safety_score\": 88, \"eco_score\": 82}, {\"name\": \"unknown blend\", \"benefits\": [], \"reasoning\": \"no data\", \"confidence\": 20}]"}"#,
        )
        .create_async()
        .await;
    // Candidate scoring is down; suggestions must survive on their own scores
    let _analyze = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("Assess the cosmetic".into()))
        .with_status(500)
        .create_async()
        .await;

    let engine = engine_over(
        vec![stub_client(
            Source::Ewg,
            json!({ "hazard_score": 8, "concerns": [] }),
        )],
        &server.url(),
    );

    let summary = engine
        .analyze_product(&["mineral oil".to_string()], None)
        .await
        .unwrap();

    // The unscorable second candidate is dropped entirely
    assert_eq!(summary.substitutes.len(), 1);
    assert_eq!(summary.substitutes[0].candidate_name, "squalane");
    assert_eq!(summary.substitutes[0].safety_score, 88.0);
    assert_eq!(summary.substitutes[0].eco_score, 82.0);
}
