use std::str::FromStr;

use serde::Deserialize;
use serde_with::serde_as;
use strum::{Display, EnumString};

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub source: SourceSettings,
    pub lake: LakeSettings,
    pub transform_service: TransformServiceSettings,
    pub embedding: EmbeddingSettings,
    pub chat: ChatSettings,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    pub rag: RagSettings,
    pub semantic_search: SemanticSearchSettings,
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Clone)]
pub struct LakeSettings {
    pub url: String,
    pub repository_id: String,
    /// Root path in the lake under which ingested documents are placed.
    pub target_path: String,
    pub idp: IdpSettings,
    pub model_bootstrap: ModelBootstrapSettings,
}

#[derive(Deserialize, Clone)]
pub struct IdpSettings {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Clone)]
pub struct ModelBootstrapSettings {
    pub enabled: bool,
    pub fragments_path: String,
}

#[derive(Deserialize, Clone)]
pub struct TransformServiceSettings {
    pub url: String,
    pub timeout_ms: u64,
    pub enabled: bool,
}

#[derive(Deserialize, Clone)]
pub struct EmbeddingSettings {
    pub url: String,
    pub model_name: String,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// When false, the simple fixed-window chunker replaces the adaptive
    /// strategy.
    #[serde(default = "default_true")]
    pub adaptive_chunking: bool,
    pub aggressive_noise_reduction: bool,
    pub query_instruction_prefix_enabled: bool,
}

#[derive(Deserialize, Clone)]
pub struct ChatSettings {
    pub url: String,
    pub model_name: String,
}

#[derive(Deserialize, Clone, Default)]
pub struct IngestionSettings {
    #[serde(default)]
    pub sources: Vec<SourceFolderSettings>,
    #[serde(default)]
    pub exclude: ExcludeSettings,
    #[serde(default)]
    pub transform: TransformWorkerSettings,
}

#[derive(Deserialize, Clone)]
pub struct SourceFolderSettings {
    pub folder: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub mime_types: Vec<String>,
}

#[derive(Deserialize, Clone, Default)]
pub struct ExcludeSettings {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub aspects: Vec<String>,
}

#[derive(Deserialize, Clone)]
pub struct TransformWorkerSettings {
    pub worker_threads: usize,
    pub queue_capacity: usize,
}

impl Default for TransformWorkerSettings {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            queue_capacity: 1000,
        }
    }
}

/// Sizing for the ingestion executor: how many sync jobs may run at once.
#[derive(Deserialize, Clone)]
pub struct BatchSettings {
    pub max_concurrent_jobs: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct RagSettings {
    pub default_top_k: u32,
    pub default_min_score: f64,
    pub max_context_length: usize,
    pub default_system_prompt: String,
}

#[derive(Deserialize, Clone)]
pub struct SemanticSearchSettings {
    pub default_min_score: f64,
}

fn default_true() -> bool {
    true
}

pub fn read_config() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let config_directory = base_path.join("config");

    let environment = Environment::from_str(
        std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .as_str(),
    )
    .expect("Failed to parse APP_ENVIRONMENT");
    let environment_filename = format!("{}.yaml", environment);

    let settings = config::Config::builder()
        .add_source(config::File::from(config_directory.join("base.yaml")))
        .add_source(config::File::from(
            config_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("LAKESYNC")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[derive(Display, Debug, EnumString)]
pub enum Environment {
    #[strum(ascii_case_insensitive, serialize = "local")]
    Local,
    #[strum(ascii_case_insensitive, serialize = "production")]
    Production,
}
