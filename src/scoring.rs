use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::error::{AnalysisError, Result};
use crate::metrics::Metrics;
use crate::model::{
    ComprehensiveIngredientRecord, IngredientVerdict, ProductAnalysisSummary, RecommendationTier,
    RiskAnalysis, Source, SubstituteRecommendation, UserSafetyProfile,
};
use crate::sources::{
    CosingClient, EwgClient, FdaClient, InciClient, OllamaClient, PubChemClient, SourceClient,
    UpstreamClient,
};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Product-level scoring and recommendation engine
///
/// Owns the aggregator and the AI client it uses for substitute generation.
/// The whole-product score is the unweighted arithmetic mean over the
/// ingredient list: free-text ingredient lists carry no reliable
/// concentration information to weight by.
pub struct AnalysisEngine {
    aggregator: Arc<Aggregator>,
    ai: Arc<OllamaClient>,
    metrics: Arc<Metrics>,
    max_substitutes: usize,
}

impl AnalysisEngine {
    /// Wires the full engine from configuration: six upstream clients, each
    /// with its own injected resilience state, plus the aggregator on top
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(Metrics::new());

        let ai = Arc::new(OllamaClient::new(&config.endpoints.online_ai)?);
        let sources: Vec<Arc<dyn SourceClient>> = vec![
            Arc::new(FdaClient::new(&config.endpoints.fda)?),
            Arc::new(PubChemClient::new(&config.endpoints.pubchem)?),
            Arc::new(EwgClient::new(&config.endpoints.ewg)?),
            Arc::new(InciClient::new(&config.endpoints.inci)?),
            Arc::new(CosingClient::new(&config.endpoints.cosing)?),
            ai.clone() as Arc<dyn SourceClient>,
        ];

        let clients = sources
            .into_iter()
            .map(|source| {
                let tuning = config.upstreams.for_source(source.source());
                Arc::new(UpstreamClient::new(source, tuning, metrics.clone()))
            })
            .collect();

        let aggregator = Arc::new(Aggregator::new(
            clients,
            config.overall_timeout(),
            metrics.clone(),
        )?);

        Ok(Self {
            aggregator,
            ai,
            metrics,
            max_substitutes: config.max_substitutes,
        })
    }

    /// Builds an engine over pre-constructed parts, for tests and embedding
    pub fn new(
        aggregator: Arc<Aggregator>,
        ai: Arc<OllamaClient>,
        metrics: Arc<Metrics>,
        max_substitutes: usize,
    ) -> Self {
        Self {
            aggregator,
            ai,
            metrics,
            max_substitutes,
        }
    }

    /// Metrics collector shared with the clients, for reporting
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Analyzes a whole product from its ingredient list
    ///
    /// The calling layer always gets a complete, well-formed summary;
    /// degraded upstream coverage shows up in `confidence` and the
    /// `insufficient-data` flag, never as an error. The only errors are
    /// configuration-class mistakes, an empty ingredient list included.
    pub async fn analyze_product(
        &self,
        names: &[String],
        profile: Option<&UserSafetyProfile>,
    ) -> Result<ProductAnalysisSummary> {
        if names.is_empty() {
            return Err(AnalysisError::Validation(
                "ingredient list is empty".into(),
            ));
        }

        info!("analyzing product with {} ingredients", names.len());
        let mut verdicts = Vec::with_capacity(names.len());
        for name in names {
            let record = self.aggregator.comprehensive_data(name, profile).await?;
            verdicts.push(self.verdict_for(&record));
        }

        let overall_safety_score = mean(verdicts.iter().map(|v| v.safety_score));
        let overall_eco_score = mean(verdicts.iter().map(|v| v.eco_score));
        let confidence = mean(verdicts.iter().map(|v| v.confidence));
        let tier = RecommendationTier::from_score(overall_safety_score);

        let mut risk_flags: Vec<String> = Vec::new();
        for verdict in &verdicts {
            for flag in &verdict.risk_flags {
                if !risk_flags.iter().any(|f| f == flag) {
                    risk_flags.push(flag.clone());
                }
            }
        }

        let substitutes = self.substitutes_for(&verdicts, profile).await;

        Ok(ProductAnalysisSummary {
            overall_safety_score,
            overall_eco_score,
            risk_flags,
            tier,
            confidence,
            ingredients: verdicts,
            substitutes,
        })
    }

    /// Folds one merged record into an ingredient-level verdict
    ///
    /// The AI analysis already participates in the record's merged scores as
    /// the online-ai source; here it only contributes its reasoning text.
    pub fn verdict_for(&self, record: &ComprehensiveIngredientRecord) -> IngredientVerdict {
        let reasoning = record
            .result_for(Source::OnlineAi)
            .and_then(|r| r.payload.as_ref())
            .and_then(|p| serde_json::from_value::<RiskAnalysis>(p.clone().into()).ok())
            .map(|a| a.reasoning);

        let confidence = if self.aggregator.source_count() == 0 {
            0.0
        } else {
            record.successful_sources() as f64 / self.aggregator.source_count() as f64 * 100.0
        };

        IngredientVerdict {
            name: record.query.name.clone(),
            safety_score: record.overall_safety_score,
            eco_score: record.overall_eco_score,
            tier: RecommendationTier::from_score(record.overall_safety_score),
            risk_flags: record.risk_flags.clone(),
            reasoning,
            confidence,
        }
    }

    /// Generates scored substitutes for every problematic ingredient
    ///
    /// Candidates go through the AI client alone, not the full aggregator,
    /// to keep this path bounded. Sorted by safety, then eco, then the
    /// model's confidence, all descending.
    async fn substitutes_for(
        &self,
        verdicts: &[IngredientVerdict],
        profile: Option<&UserSafetyProfile>,
    ) -> Vec<SubstituteRecommendation> {
        let mut substitutes = Vec::new();
        for verdict in verdicts {
            if !needs_substitute(verdict) {
                continue;
            }
            debug!("requesting substitutes for '{}'", verdict.name);
            let suggestions = match self
                .ai
                .suggest_substitutes(&verdict.name, profile, self.max_substitutes)
                .await
            {
                Ok(suggestions) => suggestions,
                Err(e) => {
                    warn!("substitute generation for '{}' failed: {}", verdict.name, e);
                    continue;
                }
            };

            for suggestion in suggestions {
                let (safety_score, eco_score) =
                    match self.ai.analyze(&suggestion.name, profile).await {
                        Ok(analysis) => (analysis.safety_score, analysis.eco_score),
                        Err(e) => {
                            debug!("scoring candidate '{}' failed: {}", suggestion.name, e);
                            match (suggestion.safety_score, suggestion.eco_score) {
                                (Some(safety), Some(eco)) => (safety, eco),
                                // Unscorable candidates are dropped
                                _ => continue,
                            }
                        }
                    };
                substitutes.push(SubstituteRecommendation {
                    original_ingredient: verdict.name.clone(),
                    candidate_name: suggestion.name,
                    safety_score,
                    eco_score,
                    benefits: suggestion.benefits,
                    reasoning: suggestion.reasoning,
                    confidence: suggestion.confidence,
                });
            }
        }

        sort_substitutes(&mut substitutes);
        substitutes
    }
}

fn needs_substitute(verdict: &IngredientVerdict) -> bool {
    verdict.tier <= RecommendationTier::Caution || !verdict.risk_flags.is_empty()
}

/// Orders by safety desc, eco desc, then confidence desc
pub fn sort_substitutes(substitutes: &mut [SubstituteRecommendation]) {
    substitutes.sort_by(|a, b| {
        desc(a.safety_score, b.safety_score)
            .then_with(|| desc(a.eco_score, b.eco_score))
            .then_with(|| desc(a.confidence, b.confidence))
    });
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        0.0
    } else {
        collected.iter().sum::<f64>() / collected.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substitute(name: &str, safety: f64, eco: f64, confidence: f64) -> SubstituteRecommendation {
        SubstituteRecommendation {
            original_ingredient: "paraben".into(),
            candidate_name: name.into(),
            safety_score: safety,
            eco_score: eco,
            benefits: vec![],
            reasoning: String::new(),
            confidence,
        }
    }

    #[test]
    fn test_sort_by_safety_then_eco_then_confidence() {
        let mut subs = vec![
            substitute("c", 70.0, 60.0, 90.0),
            substitute("a", 90.0, 50.0, 10.0),
            substitute("b", 70.0, 80.0, 20.0),
            substitute("d", 70.0, 60.0, 95.0),
        ];
        sort_substitutes(&mut subs);

        let names: Vec<&str> = subs.iter().map(|s| s.candidate_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_needs_substitute_on_tier_or_flags() {
        let clean = IngredientVerdict {
            name: "aqua".into(),
            safety_score: 95.0,
            eco_score: 95.0,
            tier: RecommendationTier::Recommended,
            risk_flags: vec![],
            reasoning: None,
            confidence: 100.0,
        };
        assert!(!needs_substitute(&clean));

        let risky_tier = IngredientVerdict {
            tier: RecommendationTier::Caution,
            safety_score: 45.0,
            ..clean.clone()
        };
        assert!(needs_substitute(&risky_tier));

        let flagged = IngredientVerdict {
            risk_flags: vec!["allergies".into()],
            ..clean
        };
        assert!(needs_substitute(&flagged));
    }
}
