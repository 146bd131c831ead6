use crate::config::EndpointConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{Source, UserSafetyProfile};
use crate::sources::SourceClient;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// GHS hazard statement codes, e.g. H317 (skin sensitizer)
static H_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bH\d{3}\b").expect("valid regex"));

/// PubChem PUG REST client
///
/// Resolves the ingredient name to a CID, reads basic molecular properties,
/// then scans the compound classification tree for GHS hazard statement
/// codes. An unknown compound (PubChem answers 404) is a permanent failure:
/// the name simply isn't chemical data.
pub struct PubChemClient {
    client: Client,
    base_url: String,
}

impl PubChemClient {
    /// Creates a client against the configured PUG REST endpoint
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

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::UpstreamStatus {
                source: self.source().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn resolve_cid(&self, name: &str) -> Result<u64> {
        // Percent-encodes multi-word names in the path segment
        let url = url::Url::parse(&format!(
            "{}/compound/name/{}/cids/JSON",
            self.base_url, name
        ))?;
        let body = self.get_json(url.as_str()).await?;
        body["IdentifierList"]["CID"][0]
            .as_u64()
            .ok_or_else(|| AnalysisError::Parse(format!("no CID for '{}'", name)))
    }
}

#[async_trait]
impl SourceClient for PubChemClient {
    fn source(&self) -> Source {
        Source::PubChem
    }

    async fn fetch_payload(
        &self,
        name: &str,
        _profile: Option<&UserSafetyProfile>,
    ) -> Result<Map<String, Value>> {
        let cid = self.resolve_cid(name).await?;

        let props_url = format!(
            "{}/compound/cid/{}/property/MolecularFormula,MolecularWeight/JSON",
            self.base_url, cid
        );
        let props = self.get_json(&props_url).await?;
        let prop = &props["PropertyTable"]["Properties"][0];

        // GHS codes live in free-text classification nodes; a flat scan of
        // the serialized tree is resilient to layout changes
        let class_url = format!("{}/compound/cid/{}/classification/JSON", self.base_url, cid);
        let hazard_codes: BTreeSet<String> = match self.get_json(&class_url).await {
            Ok(tree) => H_CODE
                .find_iter(&tree.to_string())
                .map(|m| m.as_str().to_string())
                .collect(),
            // Compounds without a classification tree are common
            Err(AnalysisError::UpstreamStatus { status: 404, .. }) => BTreeSet::new(),
            Err(e) => return Err(e),
        };

        let mut payload = Map::new();
        payload.insert("cid".into(), Value::from(cid));
        payload.insert(
            "molecular_formula".into(),
            prop["MolecularFormula"].clone(),
        );
        payload.insert("molecular_weight".into(), prop["MolecularWeight"].clone());
        payload.insert(
            "ghs_hazard_count".into(),
            Value::from(hazard_codes.len() as u64),
        );
        payload.insert(
            "hazard_codes".into(),
            Value::Array(hazard_codes.into_iter().map(Value::from).collect()),
        );
        Ok(payload)
    }
}
