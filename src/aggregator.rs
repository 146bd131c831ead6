use crate::error::{AnalysisError, Result};
use crate::metrics::Metrics;
use crate::model::{
    ComprehensiveIngredientRecord, FetchStatus, IngredientQuery, Source, UpstreamResult,
    UserSafetyProfile,
};
use crate::sources::UpstreamClient;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// Neutral score used when no source produced data
pub const NEUTRAL_SCORE: f64 = 50.0;
/// Flag appended when the record rests on zero successful sources
pub const INSUFFICIENT_DATA_FLAG: &str = "insufficient-data";
/// Flag appended when the merged safety score crosses the danger line
pub const HIGH_RISK_FLAG: &str = "high-risk";
const HIGH_RISK_BELOW: f64 = 40.0;

/// Fans one ingredient out to every configured upstream concurrently and
/// merges whatever answered before the deadline
///
/// Partial data is the normal case: a failed, skipped or slow source
/// contributes its status slot and nothing else. The only error this type
/// ever returns is a configuration mistake.
pub struct Aggregator {
    clients: Vec<Arc<UpstreamClient>>,
    overall_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Aggregator {
    /// Builds an aggregator over the given clients
    ///
    /// An empty client list is a deployment mistake and fails loudly.
    pub fn new(
        clients: Vec<Arc<UpstreamClient>>,
        overall_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        if clients.is_empty() {
            return Err(AnalysisError::Config(
                "no upstream clients configured".into(),
            ));
        }
        Ok(Self {
            clients,
            overall_timeout,
            metrics,
        })
    }

    /// Number of configured upstream sources
    pub fn source_count(&self) -> usize {
        self.clients.len()
    }

    /// Fetches and merges all sources for one ingredient
    ///
    /// Every configured source gets exactly one result slot. Tasks still
    /// running at the overall deadline are recorded as timed out and left
    /// running detached, so their own cache and breaker state still update
    /// when they eventually finish.
    pub async fn comprehensive_data(
        &self,
        name: &str,
        profile: Option<&UserSafetyProfile>,
    ) -> Result<ComprehensiveIngredientRecord> {
        let query = IngredientQuery::new(name, profile.cloned());
        let started = Instant::now();
        let deadline = started + self.overall_timeout;

        let handles: Vec<_> = self
            .clients
            .iter()
            .map(|client| {
                let client = Arc::clone(client);
                let query = query.clone();
                (
                    client.source(),
                    tokio::spawn(async move { client.fetch(&query).await }),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            match timeout_at(deadline, handle).await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    warn!("{}: fetch task panicked: {}", source, e);
                    results.push(UpstreamResult::unavailable(source, FetchStatus::Failed));
                }
                Err(_) => {
                    warn!("{}: still pending at aggregation deadline", source);
                    results.push(UpstreamResult::unavailable(source, FetchStatus::TimedOut));
                }
            }
        }

        self.metrics
            .record_time("aggregate.latency", started.elapsed())
            .await;

        let record = merge(query, results);
        info!(
            "merged '{}': {}/{} sources, safety {:.1}, eco {:.1}",
            name,
            record.successful_sources(),
            self.source_count(),
            record.overall_safety_score,
            record.overall_eco_score,
        );
        Ok(record)
    }
}

/// Folds per-source results into one record with derived scores and flags
///
/// Pure function of the results present at merge time.
pub fn merge(
    query: IngredientQuery,
    results: Vec<UpstreamResult>,
) -> ComprehensiveIngredientRecord {
    let mut safety_contributions = Vec::new();
    let mut eco_contributions = Vec::new();
    let mut flags: Vec<String> = Vec::new();

    for result in &results {
        let Some(payload) = result.payload.as_ref().filter(|_| result.is_success()) else {
            continue;
        };
        if let Some(score) = safety_contribution(result.source, payload) {
            safety_contributions.push(score);
        }
        if let Some(score) = eco_contribution(result.source, payload) {
            eco_contributions.push(score);
        }
        for flag in source_flags(result.source, payload) {
            push_unique(&mut flags, flag);
        }
    }

    let (overall_safety_score, overall_eco_score) = if safety_contributions.is_empty() {
        push_unique(&mut flags, INSUFFICIENT_DATA_FLAG.to_string());
        (NEUTRAL_SCORE, NEUTRAL_SCORE)
    } else {
        let safety = mean(&safety_contributions);
        let eco = if eco_contributions.is_empty() {
            safety
        } else {
            mean(&eco_contributions)
        };
        (safety, eco)
    };

    if overall_safety_score < HIGH_RISK_BELOW && !safety_contributions.is_empty() {
        push_unique(&mut flags, HIGH_RISK_FLAG.to_string());
    }

    ComprehensiveIngredientRecord {
        query,
        results,
        overall_safety_score,
        overall_eco_score,
        risk_flags: flags,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn push_unique(flags: &mut Vec<String>, flag: String) {
    if !flags.iter().any(|f| *f == flag) {
        flags.push(flag);
    }
}

/// Normalized 0-100 safety contribution of one source's payload
///
/// One documented monotone mapping per source, kept stable regardless of
/// upstream format drift.
fn safety_contribution(source: Source, payload: &Map<String, Value>) -> Option<f64> {
    match source {
        Source::Fda => {
            let reports = payload.get("adverse_event_reports")?.as_u64()?;
            Some(match reports {
                0 => 95.0,
                1..=9 => 75.0,
                10..=99 => 55.0,
                100..=999 => 30.0,
                _ => 10.0,
            })
        }
        Source::PubChem => {
            let hazards = payload.get("ghs_hazard_count")?.as_u64()?;
            Some((90.0 - 15.0 * hazards as f64).max(5.0))
        }
        Source::Ewg => {
            let hazard = payload.get("hazard_score")?.as_u64()?.clamp(1, 10);
            Some((10 - hazard) as f64 / 9.0 * 100.0)
        }
        Source::Inci => {
            let hazard = payload.get("hazard_class")?.as_u64()?.min(4);
            Some((4 - hazard) as f64 / 4.0 * 100.0)
        }
        Source::Cosing => {
            if payload.get("banned")?.as_bool()? {
                Some(5.0)
            } else if payload.get("restricted")?.as_bool()? {
                Some(40.0)
            } else {
                Some(85.0)
            }
        }
        Source::OnlineAi => Some(payload.get("safety_score")?.as_f64()?.clamp(0.0, 100.0)),
    }
}

/// Normalized 0-100 eco contribution, for sources that carry one
fn eco_contribution(source: Source, payload: &Map<String, Value>) -> Option<f64> {
    match source {
        // Skin Deep hazard blends health and environmental concern
        Source::Ewg => safety_contribution(source, payload),
        Source::Inci => {
            let eco = payload.get("eco_class")?.as_u64()?.min(4);
            Some((4 - eco) as f64 / 4.0 * 100.0)
        }
        Source::OnlineAi => Some(payload.get("eco_score")?.as_f64()?.clamp(0.0, 100.0)),
        Source::Fda | Source::PubChem | Source::Cosing => None,
    }
}

/// Hazard tags a source's payload carries into the merged flag set
fn source_flags(source: Source, payload: &Map<String, Value>) -> Vec<String> {
    let mut flags = Vec::new();
    match source {
        Source::Fda => {
            let reports = payload
                .get("adverse_event_reports")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if reports > 0 {
                flags.push("adverse-events-reported".to_string());
            }
            let serious = payload
                .get("serious_reports")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if serious > 0 {
                flags.push("serious-adverse-events".to_string());
            }
        }
        Source::PubChem => {
            if let Some(codes) = payload.get("hazard_codes").and_then(Value::as_array) {
                for code in codes.iter().filter_map(Value::as_str) {
                    flags.push(format!("ghs-{}", code.to_lowercase()));
                }
            }
        }
        Source::Ewg => {
            if let Some(concerns) = payload.get("concerns").and_then(Value::as_array) {
                for concern in concerns.iter().filter_map(Value::as_str) {
                    flags.push(concern.to_lowercase());
                }
            }
            let hazard = payload
                .get("hazard_score")
                .and_then(Value::as_u64)
                .unwrap_or(1);
            if hazard >= 7 {
                flags.push("high-hazard".to_string());
            }
        }
        Source::Inci => {
            let hazard = payload
                .get("hazard_class")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if hazard >= 3 {
                flags.push("inci-red".to_string());
            }
        }
        Source::Cosing => {
            if payload.get("banned").and_then(Value::as_bool).unwrap_or(false) {
                flags.push("eu-banned".to_string());
            } else if payload
                .get("restricted")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                flags.push("eu-restricted".to_string());
            }
        }
        Source::OnlineAi => {
            if let Some(tags) = payload.get("risk_tags").and_then(Value::as_array) {
                for tag in tags.iter().filter_map(Value::as_str) {
                    flags.push(tag.to_lowercase());
                }
            }
        }
    }
    flags
}
