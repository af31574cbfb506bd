use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use patrol_analyzer::ResolverConfig;
use patrol_cache::{CacheConfig, EvictionPolicy};

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PatrolConfig {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub repository: RepositorySettings,

    #[serde(default)]
    pub context: ContextSettings,

    #[serde(default)]
    pub api: ApiSettings,
}

/// Analysis-result cache configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CacheSettings {
    /// Maximum number of cached analyses (0 disables retention)
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Eviction policy: "LRU" (default) or "FIFO"
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,

    /// Entry lifetime in seconds (0 means immediate expiry)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_eviction_policy() -> String {
    "LRU".to_string()
}

fn default_ttl_seconds() -> u64 {
    86400
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            eviction_policy: default_eviction_policy(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        let policy = match EvictionPolicy::from_str(&self.eviction_policy) {
            Ok(policy) => policy,
            Err(_) => {
                log::warn!(
                    "unknown eviction policy '{}', defaulting to LRU. Valid values: 'LRU', 'FIFO'",
                    self.eviction_policy
                );
                EvictionPolicy::Lru
            }
        };

        CacheConfig {
            max_size: self.max_size,
            policy,
            ttl: Duration::from_secs(self.ttl_seconds),
        }
    }
}

/// Target repository configuration
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RepositorySettings {
    /// Fallback repository when the event carries none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_url: Option<String>,

    /// service.name -> repository URL overrides
    #[serde(default)]
    pub services: HashMap<String, String>,
}

/// Code-context assembly configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ContextSettings {
    /// Source lines fetched before and after the target line
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,

    /// Maximum code locations pulled per event
    #[serde(default = "default_max_locations")]
    pub max_locations: usize,

    /// Character budget for the assembled snippet blob
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_context_lines() -> u32 {
    20
}

fn default_max_locations() -> usize {
    4
}

fn default_max_context_chars() -> usize {
    12000
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            max_locations: default_max_locations(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

/// LLM API configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
        }
    }
}

impl PatrolConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        let mut config: PatrolConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `patrol.toml` from the working directory when present, then
    /// apply environment overrides on top.
    pub fn load() -> Result<Self> {
        let mut config = if Path::new("patrol.toml").exists() {
            let content =
                std::fs::read_to_string("patrol.toml").context("Failed to read patrol.toml")?;
            toml::from_str(&content).context("Failed to parse patrol.toml")?
        } else {
            PatrolConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("CACHE_MAX_SIZE") {
            if let Ok(size) = value.parse() {
                self.cache.max_size = size;
            }
        }
        if let Ok(value) = std::env::var("CACHE_EVICTION_POLICY") {
            self.cache.eviction_policy = value;
        }
        if let Ok(value) = std::env::var("CACHE_TTL") {
            if let Ok(ttl) = value.parse() {
                self.cache.ttl_seconds = ttl;
            }
        }
        if let Ok(value) = std::env::var("DEFAULT_REPOSITORY_URL") {
            if !value.trim().is_empty() {
                self.repository.default_url = Some(value.trim().to_string());
            }
        }
        if let Ok(value) = std::env::var("CODE_CONTEXT_LINES") {
            if let Ok(lines) = value.parse() {
                self.context.context_lines = lines;
            }
        }
        if let Ok(value) = std::env::var("MAX_CODE_LOCATIONS") {
            if let Ok(max) = value.parse() {
                self.context.max_locations = max;
            }
        }
        if let Ok(value) = std::env::var("MAX_REPOSITORY_CONTEXT_CHARS") {
            if let Ok(max) = value.parse() {
                self.context.max_context_chars = max;
            }
        }
        if let Ok(value) = std::env::var("OPENAI_MODEL") {
            self.api.model = value;
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            default_repository_url: self.repository.default_url.clone(),
            service_repositories: self.repository.services.clone(),
            context_lines: self.context.context_lines,
            max_locations: self.context.max_locations,
            max_context_chars: self.context.max_context_chars,
        }
    }

    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&PatrolConfig::default())
            .unwrap_or_else(|_| String::from("# failed to render default config"))
    }
}
