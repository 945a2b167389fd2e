use crate::domain::model::{BaseMap, LayerConfig, LayerType};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_AI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout_seconds: u64,
    pub temperature: f64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            api_key: String::new(),
            timeout_seconds: 30,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSettings {
    pub access_token: Option<String>,
    pub base_map: BaseMap,
    pub fit_to_data: bool,
}

/// 明確要求的圖層，可附帶設定覆寫
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRequest {
    pub layer_type: LayerType,
    #[serde(default)]
    pub overrides: LayerConfig,
}

impl LayerRequest {
    pub fn new(layer_type: LayerType) -> Self {
        Self {
            layer_type,
            overrides: LayerConfig::default(),
        }
    }
}
