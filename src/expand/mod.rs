//! Autonomous expansion: work queue, worker pool, and the article pipeline

mod config;
mod orchestrator;

pub use config::ExpansionConfig;
pub use orchestrator::{ExpansionError, Orchestrator, TitleFilter};
