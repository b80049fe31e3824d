pub mod ai_provider;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod picker;
pub mod pipeline;
pub mod store;
