pub mod import;
pub mod queue;
pub mod sessions;
pub mod settings;
pub mod sync;
pub mod tasks;
pub mod trends;
