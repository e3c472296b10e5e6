use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Built-in defaults, then `config.toml`, then `config.<RUST_ENV>.toml`,
    /// then `APP_*` env vars (`__` separates nested keys, e.g. `APP_BATCH__SIZE`).
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Same as [`Config::load`] with an explicit base file instead of `config.toml`.
    /// An explicit file must exist; the implicit `config.toml` is optional.
    pub fn load_with(config_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(Error::InvalidConfig(format!("config file not found: {}", path.display())));
            }
        }
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let base = config_file.unwrap_or(Path::new("config.toml"));
        let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default())).merge(Toml::file(base));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// The typed run configuration, not yet validated (callers may still
    /// apply overrides before calling [`PipelineConfig::validate`]).
    pub fn extract(&self) -> Result<PipelineConfig> {
        self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkMode {
    Store,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    Hashing,
}

/// What the file sink does when extraction returned no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyExportPolicy {
    /// Leave any existing file untouched and write nothing.
    Skip,
    /// Write a document holding an empty record list.
    WriteEmpty,
}

/// Immutable configuration for one run, built once and passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: SinkMode,
    pub source: SourceConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub store: StoreConfig,
    pub file: FileConfig,
    pub run: RunConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::Store,
            source: SourceConfig::default(),
            embedding: EmbeddingConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            store: StoreConfig::default(),
            file: FileConfig::default(),
            run: RunConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: String,
    pub table: String,
}

impl Default for SourceConfig {
    fn default() -> Self { Self { path: String::new(), table: "products".to_string() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            api_key: None,
            model: "text-embedding-004".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self { Self { max_attempts: 3, base_delay_ms: 1_000, max_delay_ms: 30_000 } }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration { Duration::from_millis(self.base_delay_ms) }
    pub fn max_delay(&self) -> Duration { Duration::from_millis(self.max_delay_ms) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub delay_ms: u64,
    pub progress_every: usize,
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self { Self { size: 50, delay_ms: 2_000, progress_every: 10, concurrency: 1 } }
}

impl BatchConfig {
    pub fn delay(&self) -> Duration { Duration::from_millis(self.delay_ms) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub uri: String,
    pub collection: String,
    pub index_name: String,
    /// Delete every document in the collection before inserting (full replace).
    pub purge: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "data/catalog.lance".to_string(),
            collection: "products".to_string(),
            index_name: "vector_index".to_string(),
            purge: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub output_path: String,
    pub empty_policy: EmptyExportPolicy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self { output_path: "products_with_embeddings.json".to_string(), empty_policy: EmptyExportPolicy::Skip }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Whole-run deadline in seconds; 0 disables it.
    pub timeout_secs: u64,
    /// Draw progress bars on stderr.
    pub progress: bool,
}

impl PipelineConfig {
    /// Rejects missing descriptors and credentials before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        let missing = |what: &str| -> Result<()> { Err(Error::InvalidConfig(format!("{} is required", what))) };
        if self.source.path.trim().is_empty() { return missing("source.path"); }
        if self.source.table.trim().is_empty() { return missing("source.table"); }
        if self.embedding.provider == ProviderKind::Gemini
            && self.embedding.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return missing("embedding.api_key");
        }
        match self.mode {
            SinkMode::Store => {
                if self.store.uri.trim().is_empty() { return missing("store.uri"); }
                if self.store.collection.trim().is_empty() { return missing("store.collection"); }
                if self.store.index_name.trim().is_empty() { return missing("store.index_name"); }
            }
            SinkMode::File => {
                if self.file.output_path.trim().is_empty() { return missing("file.output_path"); }
            }
        }
        if self.batch.size == 0 { return Err(Error::InvalidConfig("batch.size must be at least 1".into())); }
        if self.batch.concurrency == 0 { return Err(Error::InvalidConfig("batch.concurrency must be at least 1".into())); }
        if self.retry.max_attempts == 0 { return Err(Error::InvalidConfig("retry.max_attempts must be at least 1".into())); }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::InvalidConfig("retry.base_delay_ms must not exceed retry.max_delay_ms".into()));
        }
        Ok(())
    }

    pub fn source_path(&self) -> PathBuf { expand_path(&self.source.path) }
    pub fn store_uri(&self) -> PathBuf { expand_path(&self.store.uri) }
    pub fn output_path(&self) -> PathBuf { expand_path(&self.file.output_path) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
