// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod columns;
pub mod config;
pub mod export;
pub mod llm;
pub mod protocol;
pub mod schedule;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
pub mod ws;
