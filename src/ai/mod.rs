pub mod client;
pub mod debounce;
pub mod flows;
pub mod heuristics;
pub mod prompts;
pub mod repair;

pub use client::GenAiClient;
pub use debounce::{DebounceOutcome, Debouncer};
pub use heuristics::HeuristicAdvisor;
pub use repair::{fallback_layer_suggestion, normalize_layer_suggestions};

use crate::core::{AiSettings, SuggestionProvider};
use crate::utils::error::Result;
use std::sync::Arc;

/// 有 AI 設定時用遠端模型，否則用內建規則
pub fn build_provider(settings: Option<AiSettings>) -> Result<Arc<dyn SuggestionProvider>> {
    match settings {
        Some(settings) => {
            tracing::info!("🤖 AI suggestions via model {}", settings.model);
            Ok(Arc::new(GenAiClient::new(settings)?))
        }
        None => {
            tracing::info!("🧭 AI disabled, using built-in heuristics");
            Ok(Arc::new(HeuristicAdvisor::new()))
        }
    }
}
