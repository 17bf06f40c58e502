pub mod add;
pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod done;
pub mod export;
pub mod import;
pub mod list;
pub mod sync;
