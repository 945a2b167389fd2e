pub mod ai;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{cli::LocalStorage, toml_config::TomlConfig};
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use ai::{GenAiClient, HeuristicAdvisor};
pub use core::{engine::InsightEngine, pipeline::InsightPipeline, session::Session};
pub use utils::error::{InsightError, Result};
