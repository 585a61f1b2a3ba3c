use focusdeck::application::bootstrap::bootstrap_workspace;
use focusdeck::infrastructure::config::read_listen_address;
use focusdeck::{start_server, AppError, AppState, SqliteStore};
use std::process::ExitCode;
use std::sync::Arc;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("focusdeck=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn run() -> Result<(), AppError> {
    let workspace_root = std::env::current_dir()?;
    let workspace = bootstrap_workspace(&workspace_root)?;
    tracing::info!(
        root = %workspace.workspace_root.display(),
        database = %workspace.database_path.display(),
        "workspace ready"
    );

    let (host, port) = read_listen_address(&workspace.config_dir)?;
    let store = Arc::new(SqliteStore::open(&workspace.database_path)?);
    start_server(&host, port, AppState::new(store)).await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "focusdeck exited with an error");
            ExitCode::FAILURE
        }
    }
}
