use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kairos_core::{KairosError, KairosResult, QueryLimits};

const DEFAULT_CONFIG_NAME: &str = "kairos.json";
const DEFAULT_DB_NAME: &str = "kairos.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub temporal_instance_limit: Option<u32>,
    pub entities_limit_default: Option<u32>,
    pub entities_limit_max: Option<u32>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        let defaults = QueryLimits::default();
        Self {
            temporal_instance_limit: Some(defaults.temporal_instance_limit),
            entities_limit_default: Some(defaults.entities_limit_default),
            entities_limit_max: Some(defaults.entities_limit_max),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KairosConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
}

impl KairosConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> KairosResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| KairosError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| KairosError::storage(format!("read config: {err}")))?;
            let config: KairosConfig = serde_json::from_str(&raw)
                .map_err(|err| KairosError::bad_request(format!("invalid config: {err}")))?;
            return Ok(config);
        }
        let default = KairosConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| KairosError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| KairosError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> KairosResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(KairosError::bad_request("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    /// Limits handed to the query parser; unset fields fall back to the defaults.
    pub fn query_limits(&self) -> QueryLimits {
        let defaults = QueryLimits::default();
        let Some(limits) = &self.limits else {
            return defaults;
        };
        QueryLimits {
            temporal_instance_limit: limits
                .temporal_instance_limit
                .unwrap_or(defaults.temporal_instance_limit),
            entities_limit_default: limits
                .entities_limit_default
                .unwrap_or(defaults.entities_limit_default),
            entities_limit_max: limits
                .entities_limit_max
                .unwrap_or(defaults.entities_limit_max),
        }
    }
}

pub(crate) fn default_db_name() -> &'static str {
    DEFAULT_DB_NAME
}
