use mnemos_memory::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Log output format for the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Contents of `mnemos.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MnemosConfig {
    /// Directory holding `live.json` and `checkpoints/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Dimension of the built-in local embedding.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_embedding_dimension() -> usize {
    256
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_format: LogFormat::default(),
            embedding_dimension: default_embedding_dimension(),
            engine: EngineConfig::default(),
        }
    }
}

impl MnemosConfig {
    /// Load the config file, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: MnemosConfig = toml::from_str(raw)?;
        if config.embedding_dimension == 0 {
            anyhow::bail!("embedding_dimension must be at least 1");
        }
        config.engine.validate()?;
        Ok(config)
    }
}
