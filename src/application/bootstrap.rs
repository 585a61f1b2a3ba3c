use crate::infrastructure::config::ensure_default_configs;
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Prepares the on-disk workspace: config, state and logs directories,
/// default config files, and an initialized database.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, AppError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("focusdeck.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = SqliteStore::open(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
    })
}
