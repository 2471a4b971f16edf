use std::path::{Path, PathBuf};

use crate::config::default_db_name;
use crate::{KairosConfig, KairosResult, KairosStore};

pub fn load_or_init_config(base: &Path) -> KairosResult<KairosConfig> {
    let default_sqlite = default_sqlite_path(base);
    KairosConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> KairosResult<KairosStore> {
    let config = load_or_init_config(base)?;
    KairosStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(default_db_name())
}
