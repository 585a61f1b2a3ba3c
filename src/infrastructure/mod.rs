pub mod change_feed;
pub mod config;
pub mod error;
pub mod notion_client;
pub mod shared_state;
pub mod storage;
pub mod store;
