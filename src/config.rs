use crate::error::{AnalysisError, Result};
use crate::model::Source;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Main configuration struct for the analysis engine
///
/// Holds per-upstream endpoints and resilience tuning, plus the
/// aggregation-wide limits. Everything has a working default so the engine
/// can start with no config file present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URLs and credentials for the upstream sources
    pub endpoints: Endpoints,
    /// Per-upstream resilience tuning
    pub upstreams: UpstreamSettings,
    /// Wall-clock bound on one full aggregation, in seconds
    pub overall_timeout_secs: u64,
    /// Maximum substitute candidates returned per problematic ingredient
    pub max_substitutes: usize,
    /// Log level used when the CLI flag is absent; RUST_LOG overrides both
    pub log_level: String,
}

/// Base URLs and API keys for the upstream sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// openFDA API
    pub fda: EndpointConfig,
    /// PubChem PUG REST API
    pub pubchem: EndpointConfig,
    /// EWG Skin Deep
    pub ewg: EndpointConfig,
    /// INCI/Biodizionario hazard dataset
    pub inci: EndpointConfig,
    /// EU CosIng dataset
    pub cosing: EndpointConfig,
    /// Ollama-compatible LLM endpoint
    pub online_ai: LlmEndpointConfig,
}

/// One upstream HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    /// Optional API key sent with each request
    pub api_key: Option<String>,
}

impl EndpointConfig {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
        }
    }
}

/// The LLM endpoint plus the model it should run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpointConfig {
    /// Base URL of the Ollama-compatible server
    pub base_url: String,
    /// Model name passed in each generate request
    pub model: String,
}

/// Resilience tuning for each upstream source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// openFDA tuning
    pub fda: UpstreamTuning,
    /// PubChem tuning
    pub pubchem: UpstreamTuning,
    /// EWG tuning
    pub ewg: UpstreamTuning,
    /// INCI tuning
    pub inci: UpstreamTuning,
    /// CosIng tuning
    pub cosing: UpstreamTuning,
    /// LLM tuning
    pub online_ai: UpstreamTuning,
}

impl UpstreamSettings {
    /// Tuning block for the given source
    pub fn for_source(&self, source: Source) -> &UpstreamTuning {
        match source {
            Source::Fda => &self.fda,
            Source::PubChem => &self.pubchem,
            Source::Ewg => &self.ewg,
            Source::Inci => &self.inci,
            Source::Cosing => &self.cosing,
            Source::OnlineAi => &self.online_ai,
        }
    }
}

/// Rate-limit, circuit-breaker, bulkhead, cache and retry settings for one
/// upstream source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamTuning {
    /// Token bucket size and refill budget per minute
    pub permits_per_minute: u32,
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Failure percentage over the window that trips the breaker
    pub failure_rate_threshold: f64,
    /// Minimum window samples before the rate check applies
    pub min_samples: u32,
    /// Sliding window for the failure-rate check, in seconds
    pub window_secs: u64,
    /// OPEN to HALF_OPEN cool-down, in seconds
    pub cooldown_secs: u64,
    /// Trial calls admitted while HALF_OPEN
    pub half_open_trials: u32,
    /// Cache entry lifetime, in seconds
    pub cache_ttl_secs: u64,
    /// Maximum cached entries; oldest-inserted evicted beyond this
    pub cache_capacity: usize,
    /// Per-call network timeout, in seconds
    pub call_timeout_secs: u64,
    /// Total attempts per fetch (first call plus retries)
    pub max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum concurrent in-flight calls
    pub bulkhead_permits: usize,
    /// How long to wait for a bulkhead permit, in milliseconds
    pub bulkhead_wait_ms: u64,
}

impl UpstreamTuning {
    /// Per-call network timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Cache TTL as a Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Breaker cool-down as a Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Failure-rate window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for UpstreamTuning {
    fn default() -> Self {
        Self {
            permits_per_minute: 60,
            failure_threshold: 5,
            failure_rate_threshold: 50.0,
            min_samples: 10,
            window_secs: 60,
            cooldown_secs: 45,
            half_open_trials: 3,
            cache_ttl_secs: 3600,
            cache_capacity: 1024,
            call_timeout_secs: 8,
            max_attempts: 3,
            retry_base_delay_ms: 200,
            bulkhead_permits: 8,
            bulkhead_wait_ms: 500,
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        // Regulatory datasets change slowly, AI output goes stale fast
        let regulatory = UpstreamTuning {
            cache_ttl_secs: 24 * 3600,
            ..UpstreamTuning::default()
        };
        let ai = UpstreamTuning {
            cache_ttl_secs: 1800,
            call_timeout_secs: 30,
            max_attempts: 2,
            permits_per_minute: 30,
            ..UpstreamTuning::default()
        };
        Self {
            fda: UpstreamTuning::default(),
            pubchem: UpstreamTuning::default(),
            ewg: UpstreamTuning::default(),
            inci: regulatory.clone(),
            cosing: regulatory,
            online_ai: ai,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fda: EndpointConfig::new("https://api.fda.gov"),
            pubchem: EndpointConfig::new("https://pubchem.ncbi.nlm.nih.gov/rest/pug"),
            ewg: EndpointConfig::new("https://www.ewg.org/skindeep"),
            inci: EndpointConfig::new("https://www.biodizionario.it/api"),
            cosing: EndpointConfig::new("https://ec.europa.eu/growth/tools-databases/cosing"),
            online_ai: LlmEndpointConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            upstreams: UpstreamSettings::default(),
            overall_timeout_secs: 30,
            max_substitutes: 3,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config file location
    ///
    /// If the config file doesn't exist, returns the default configuration.
    /// The config file is expected to be in TOML format.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AnalysisError::Config("Could not find config directory".into()))?;
        let config_path = config_dir.join("inciscope").join("config.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::from_file(&config_path)
    }

    /// Loads configuration from an explicit TOML file path
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AnalysisError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| AnalysisError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    ///
    /// Misconfiguration is a deployment mistake and fails loudly rather than
    /// degrading at runtime.
    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("fda", &self.endpoints.fda.base_url),
            ("pubchem", &self.endpoints.pubchem.base_url),
            ("ewg", &self.endpoints.ewg.base_url),
            ("inci", &self.endpoints.inci.base_url),
            ("cosing", &self.endpoints.cosing.base_url),
            ("online_ai", &self.endpoints.online_ai.base_url),
        ];
        for (name, url) in urls {
            if url.trim().is_empty() {
                return Err(AnalysisError::Config(format!(
                    "Empty base URL for upstream '{}'",
                    name
                )));
            }
            url::Url::parse(url)?;
        }

        if self.overall_timeout_secs == 0 {
            return Err(AnalysisError::Config(
                "overall_timeout_secs must be positive".into(),
            ));
        }

        for source in Source::ALL {
            let tuning = self.upstreams.for_source(source);
            if tuning.call_timeout_secs == 0 {
                return Err(AnalysisError::Config(format!(
                    "call_timeout_secs must be positive for '{}'",
                    source
                )));
            }
            if tuning.max_attempts == 0 {
                return Err(AnalysisError::Config(format!(
                    "max_attempts must be at least 1 for '{}'",
                    source
                )));
            }
            if tuning.permits_per_minute == 0 {
                return Err(AnalysisError::Config(format!(
                    "permits_per_minute must be positive for '{}'",
                    source
                )));
            }
        }

        Ok(())
    }

    /// Overall aggregation deadline as a Duration
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_regulatory_sources_get_long_ttl() {
        let config = Config::default();
        assert_eq!(config.upstreams.cosing.cache_ttl_secs, 24 * 3600);
        assert_eq!(config.upstreams.inci.cache_ttl_secs, 24 * 3600);
        assert_eq!(config.upstreams.online_ai.cache_ttl_secs, 1800);
    }

    #[test]
    fn test_empty_url_rejected() {
        let mut config = Config::default();
        config.endpoints.fda.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_url_rejected() {
        let mut config = Config::default();
        config.endpoints.ewg.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::UrlParse(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.overall_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "overall_timeout_secs = 10\n\n[upstreams.fda]\npermits_per_minute = 5"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.overall_timeout_secs, 10);
        assert_eq!(config.upstreams.fda.permits_per_minute, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.upstreams.ewg.permits_per_minute, 60);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [").unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(AnalysisError::Config(_))
        ));
    }
}
