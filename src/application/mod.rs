pub mod bootstrap;
pub mod dedup;
pub mod export;
pub mod import;
pub mod leader;
pub mod notion_sync;
pub mod queue;
pub mod realtime;
pub mod refresh;
pub mod sessions;
pub mod settings;
pub mod tab_bus;
pub mod tab_runtime;
pub mod trends;

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Injectable clock. Production wires the system clock; tests pin a
/// fixed instant to make timing assertions deterministic.
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> NowProvider {
    Arc::new(Utc::now)
}
