use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One external ingredient-data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// openFDA adverse-event reports
    Fda,
    /// PubChem chemical properties and GHS hazards
    PubChem,
    /// EWG Skin Deep hazard scores (1-10 scale)
    Ewg,
    /// INCI/Biodizionario hazard classes (0-4 scale)
    Inci,
    /// EU CosIng regulatory annexes and restrictions
    Cosing,
    /// LLM risk analysis endpoint
    OnlineAi,
}

impl Source {
    /// All sources in dispatch order
    pub const ALL: [Source; 6] = [
        Source::Fda,
        Source::PubChem,
        Source::Ewg,
        Source::Inci,
        Source::Cosing,
        Source::OnlineAi,
    ];

    /// Short lowercase name used in logs, metrics and cache keys
    pub fn name(&self) -> &'static str {
        match self {
            Source::Fda => "fda",
            Source::PubChem => "pubchem",
            Source::Ewg => "ewg",
            Source::Inci => "inci",
            Source::Cosing => "cosing",
            Source::OnlineAi => "online-ai",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one upstream fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    /// Payload retrieved (possibly from cache)
    Success,
    /// Network/parse failure after the retry budget was spent
    Failed,
    /// Circuit breaker was open, no network call attempted
    SkippedCircuitOpen,
    /// Per-call or aggregation deadline elapsed first
    TimedOut,
    /// Local rate limiter had no token, no network call attempted
    RateLimited,
}

/// User context that biases scoring and the LLM prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSafetyProfile {
    /// e.g. "dry", "oily", "sensitive"
    pub skin_type: Option<String>,
    /// e.g. "acne", "eczema", "fragrance sensitivity"
    #[serde(default)]
    pub concerns: Vec<String>,
    /// Known ingredient allergies
    #[serde(default)]
    pub allergies: Vec<String>,
}

/// Immutable per-request input: the ingredient under analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientQuery {
    /// INCI ingredient name, used as the lookup key across sources
    pub name: String,
    /// Optional user context
    pub profile: Option<UserSafetyProfile>,
}

impl IngredientQuery {
    /// Creates a query for the given ingredient name
    pub fn new(name: impl Into<String>, profile: Option<UserSafetyProfile>) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }

    /// Normalized form of the name used as a cache key
    pub fn cache_key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// Per-source fetch outcome. Replaced, never mutated, on retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamResult {
    /// Which provider produced this result
    pub source: Source,
    /// How the fetch ended
    pub status: FetchStatus,
    /// Source-specific payload, present iff status is Success
    pub payload: Option<Map<String, Value>>,
    /// When the result was produced
    pub fetched_at: DateTime<Utc>,
}

impl UpstreamResult {
    /// Builds a successful result carrying a payload
    pub fn success(source: Source, payload: Map<String, Value>) -> Self {
        Self {
            source,
            status: FetchStatus::Success,
            payload: Some(payload),
            fetched_at: Utc::now(),
        }
    }

    /// Builds a non-success result for the given status
    pub fn unavailable(source: Source, status: FetchStatus) -> Self {
        debug_assert!(status != FetchStatus::Success);
        Self {
            source,
            status,
            payload: None,
            fetched_at: Utc::now(),
        }
    }

    /// True when the fetch produced usable data
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

/// The aggregator's merged view of one ingredient across all sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveIngredientRecord {
    /// The query this record answers
    pub query: IngredientQuery,
    /// One slot per configured source, present regardless of outcome
    pub results: Vec<UpstreamResult>,
    /// 0-100, mean of available per-source safety contributions
    pub overall_safety_score: f64,
    /// 0-100, mean of available per-source eco contributions
    pub overall_eco_score: f64,
    /// De-duplicated hazard tags, insertion order preserved
    pub risk_flags: Vec<String>,
}

impl ComprehensiveIngredientRecord {
    /// Number of sources that returned usable data
    pub fn successful_sources(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// The result slot for one source, if that source was configured
    pub fn result_for(&self, source: Source) -> Option<&UpstreamResult> {
        self.results.iter().find(|r| r.source == source)
    }
}

/// Structured per-ingredient risk analysis parsed from the LLM response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    /// 0-100, higher is safer
    pub safety_score: f64,
    /// 0-100, higher is greener
    pub eco_score: f64,
    /// Short machine-readable health-risk tags
    #[serde(default)]
    pub risk_tags: Vec<String>,
    /// Free-text model reasoning
    #[serde(default)]
    pub reasoning: String,
}

/// A candidate replacement for a problematic ingredient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteRecommendation {
    /// The ingredient being replaced
    pub original_ingredient: String,
    /// Suggested replacement name
    pub candidate_name: String,
    /// 0-100 safety score of the candidate
    pub safety_score: f64,
    /// 0-100 eco score of the candidate
    pub eco_score: f64,
    /// Claimed benefits of the swap
    #[serde(default)]
    pub benefits: Vec<String>,
    /// Free-text justification
    #[serde(default)]
    pub reasoning: String,
    /// 0-100 model-reported confidence
    pub confidence: f64,
}

/// Ordinal product recommendation derived from the overall safety score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationTier {
    /// Score below 40
    Avoid,
    /// Score in [40, 60)
    Caution,
    /// Score in [60, 80)
    Safe,
    /// Score of 80 or above
    Recommended,
}

impl RecommendationTier {
    /// Classifies a 0-100 score. Boundaries are inclusive on the lower end.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RecommendationTier::Recommended
        } else if score >= 60.0 {
            RecommendationTier::Safe
        } else if score >= 40.0 {
            RecommendationTier::Caution
        } else {
            RecommendationTier::Avoid
        }
    }
}

impl fmt::Display for RecommendationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecommendationTier::Recommended => "recommended",
            RecommendationTier::Safe => "safe",
            RecommendationTier::Caution => "caution",
            RecommendationTier::Avoid => "avoid",
        };
        f.write_str(label)
    }
}

/// Per-ingredient detail row in the product summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientVerdict {
    /// Ingredient name as analyzed
    pub name: String,
    /// 0-100 merged safety score
    pub safety_score: f64,
    /// 0-100 merged eco score
    pub eco_score: f64,
    /// Tier for this single ingredient
    pub tier: RecommendationTier,
    /// Flags raised for this ingredient
    pub risk_flags: Vec<String>,
    /// LLM reasoning, when the AI source answered
    pub reasoning: Option<String>,
    /// 0-100, fraction of sources that produced data
    pub confidence: f64,
}

/// Complete product-level analysis returned to the calling layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAnalysisSummary {
    /// 0-100, unweighted mean over ingredients
    pub overall_safety_score: f64,
    /// 0-100, unweighted mean over ingredients
    pub overall_eco_score: f64,
    /// Union of ingredient flags, deduped, insertion order preserved
    pub risk_flags: Vec<String>,
    /// Ordinal recommendation for the product
    pub tier: RecommendationTier,
    /// 0-100, mean per-ingredient confidence
    pub confidence: f64,
    /// One verdict per analyzed ingredient, input order preserved
    pub ingredients: Vec<IngredientVerdict>,
    /// Substitute suggestions for problematic ingredients
    pub substitutes: Vec<SubstituteRecommendation>,
}
