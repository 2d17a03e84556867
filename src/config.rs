use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Google OAuth client id rendered into the sign-in button. Optional;
    /// without it the login flow is simply not offered.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Secret for signing session cookies. Falls back to the
    /// `CONCOURSE_SECRET_KEY` environment variable.
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the flight/airport/amenity search service.
    pub base_url: String,
    /// Static bearer token for authenticated deployments. Optional.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_steps() -> usize {
    3
}
fn default_max_tokens() -> u32 {
    512
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatastoreConfig {
    /// Postgres connection URL. Falls back to `DATABASE_URL`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_top_k() -> i64 {
    5
}

impl ServerConfig {
    pub fn secret_key(&self) -> Result<String> {
        if let Some(ref key) = self.secret_key {
            return Ok(key.clone());
        }
        std::env::var("CONCOURSE_SECRET_KEY")
            .context("server.secret_key not set and CONCOURSE_SECRET_KEY not in environment")
    }
}

impl DatastoreConfig {
    pub fn url(&self) -> Result<String> {
        if let Some(ref url) = self.url {
            return Ok(url.clone());
        }
        std::env::var("DATABASE_URL")
            .context("datastore.url not set and DATABASE_URL not in environment")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.backend.base_url.trim().is_empty() {
        anyhow::bail!("backend.base_url must not be empty");
    }

    if config.llm.model.trim().is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }

    if config.llm.max_steps == 0 {
        anyhow::bail!("llm.max_steps must be > 0");
    }

    if config.datastore.top_k < 1 {
        anyhow::bail!("datastore.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.datastore.similarity_threshold) {
        anyhow::bail!("datastore.similarity_threshold must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const BASE: &str = r#"
[server]
bind = "127.0.0.1:8081"

[backend]
base_url = "http://127.0.0.1:8080"

[llm]
model = "gpt-4o-mini"
"#;

    #[test]
    fn test_load_minimal() {
        let f = write_config(BASE);
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8081");
        assert_eq!(cfg.llm.max_steps, 3);
        assert_eq!(cfg.llm.max_tokens, 512);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.datastore.top_k, 5);
    }

    #[test]
    fn test_rejects_zero_max_steps() {
        let content = BASE.replace(
            "model = \"gpt-4o-mini\"",
            "model = \"gpt-4o-mini\"\nmax_steps = 0",
        );
        let f = write_config(&content);
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let content = format!("{}\n[datastore]\nsimilarity_threshold = 1.5\n", BASE);
        let f = write_config(&content);
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_unknown_embedding_provider() {
        let content = format!(
            "{}\n[embedding]\nprovider = \"vertex\"\nmodel = \"m\"\ndims = 768\n",
            BASE
        );
        let f = write_config(&content);
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_embedding_requires_model_and_dims() {
        let content = format!("{}\n[embedding]\nprovider = \"openai\"\n", BASE);
        let f = write_config(&content);
        assert!(load_config(f.path()).is_err());
    }
}
