use config::{Config, File};
use dotenv::dotenv;
use eyre::{eyre, Result};
use serde::{de::DeserializeOwned, Deserialize};

fn config_from_env() -> Result<AppConfig> {
    dotenv().ok();

    let settings = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(
            config::Environment::default()
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("indexer.supervisor.provider_error_markers")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize().map_err(eyre::Error::from)
}

pub trait LoadFromEnv: Sized + DeserializeOwned {
    fn from_env() -> Result<Self>;
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub indexer: Option<IndexerConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RpcEndpoint {
    pub http_rpc_url: String,
    pub ws_rpc_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub start_block: u64,
    pub block_sync_batch_size: u64,
    pub primary: RpcEndpoint,
    pub fallback: RpcEndpoint,
}

/// Addresses of the contracts whose events are ingested, as hex strings.
#[derive(Deserialize, Debug, Clone)]
pub struct ContractsConfig {
    pub token: String,
    pub community_admin: String,
    pub governance: String,
    pub treasury: String,
    pub attestation: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngestionSettings {
    /// Token transfers below this amount (base units) are not beneficiary activity.
    pub dust_threshold: String,
    #[serde(default = "default_legacy_retry_interval_ms")]
    pub legacy_manager_retry_interval_ms: u64,
    #[serde(default = "default_legacy_retry_attempts")]
    pub legacy_manager_retry_attempts: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SupervisorSettings {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_return_to_primary_after_secs")]
    pub return_to_primary_after_secs: u64,
    #[serde(default = "default_provider_error_markers")]
    pub provider_error_markers: Vec<String>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            success_threshold: default_threshold(),
            failure_threshold: default_threshold(),
            return_to_primary_after_secs: default_return_to_primary_after_secs(),
            provider_error_markers: default_provider_error_markers(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct IndexerConfig {
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub contracts: ContractsConfig,
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

impl LoadFromEnv for IndexerConfig {
    fn from_env() -> Result<Self> {
        config_from_env()?
            .indexer
            .ok_or_else(|| eyre!("Configuration for the 'indexer' service is missing."))
    }
}

fn default_legacy_retry_interval_ms() -> u64 {
    4_000
}

fn default_legacy_retry_attempts() -> u32 {
    5
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_threshold() -> u32 {
    5
}

fn default_return_to_primary_after_secs() -> u64 {
    60
}

fn default_provider_error_markers() -> Vec<String> {
    ["forno", "infura", "alchemy", "ankr", "quicknode", "celo"]
        .into_iter()
        .map(String::from)
        .collect()
}
