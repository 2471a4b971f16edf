pub mod config;
pub mod datastore;
mod db;
pub mod migration;
pub mod search;
pub mod store;

pub use config::{DatabaseConfig, KairosConfig, LimitsConfig, PoolConfig};
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use kairos_core::*;
pub use store::KairosStore;
