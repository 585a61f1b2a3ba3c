//! Focusdeck backend: projects, tasks, Pomodoro sessions, a bounded
//! work queue, dashboard trends, Notion sync, and portable
//! import/export, with the cross-tab runtime (leader election, refresh
//! scheduling, realtime adapters) that keeps multiple clients
//! coherent over one store.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod server;

pub use application::tab_runtime::TabRuntime;
pub use infrastructure::error::AppError;
pub use infrastructure::storage::SqliteStore;
pub use server::{start_server, AppState};
