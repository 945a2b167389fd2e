use crate::config::INPUT_EXTENSIONS;
use crate::core::{
    AiSettings, BaseMap, ChartConfig, ChartType, ColumnMapping, ConfigProvider, LayerConfig,
    LayerRequest, LayerType, MapSettings,
};
use crate::domain::settings::{DEFAULT_AI_ENDPOINT, DEFAULT_AI_MODEL};
use crate::utils::error::{InsightError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
    pub chart: Option<ChartEntry>,
    #[serde(default)]
    pub map: MapConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 省略時使用範例資料
    pub input: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub temperature: Option<f64>,
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub insights: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            model: None,
            api_key: None,
            timeout_seconds: None,
            temperature: None,
            debounce_ms: None,
            insights: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub value: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerEntry {
    pub r#type: String,
    #[serde(default)]
    pub config: LayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartEntry {
    pub r#type: String,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapConfig {
    pub access_token: Option<String>,
    pub base_map: Option<String>,
    #[serde(default)]
    pub fit_to_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub archive_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

fn default_true() -> bool {
    true
}

/// 未被替換的 `${VAR}` 視同未設定
fn resolved(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty() && !v.contains("${"))
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| InsightError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})，找不到的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| InsightError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_file_extension("load.archive_name", self.archive_name(), &["zip"])?;

        if let Some(input) = &self.source.input {
            validation::validate_file_extension("source.input", input, INPUT_EXTENSIONS)?;
        }

        if let Some(settings) = self.ai_settings() {
            validation::validate_url("ai.endpoint", &settings.endpoint)?;
            validation::validate_non_empty_string("ai.model", &settings.model)?;
            validation::validate_positive_number("ai.timeout_seconds", settings.timeout_seconds, 1)?;
            validation::validate_range("ai.temperature", settings.temperature, 0.0, 2.0)?;
        }

        for entry in &self.layers {
            if LayerType::parse(&entry.r#type).is_none() {
                return Err(InsightError::InvalidConfigValueError {
                    field: "layers.type".to_string(),
                    value: entry.r#type.clone(),
                    reason: format!(
                        "Unknown layer type. Valid types: {}",
                        LayerType::ALL.map(|t| t.as_str()).join(", ")
                    ),
                });
            }
        }

        if let Some(chart) = &self.chart {
            if ChartType::parse(&chart.r#type).is_none() {
                return Err(InsightError::InvalidConfigValueError {
                    field: "chart.type".to_string(),
                    value: chart.r#type.clone(),
                    reason: "Valid charts: bar, line, pie, scatter, histogram, summary".to_string(),
                });
            }
        }

        if let Some(base_map) = &self.map.base_map {
            if BaseMap::parse(base_map).is_none() {
                return Err(InsightError::InvalidConfigValueError {
                    field: "map.base_map".to_string(),
                    value: base_map.clone(),
                    reason: "Base map must be 'dark' or 'light'".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_level.as_deref())
    }
}

impl ConfigProvider for TomlConfig {
    fn input_path(&self) -> Option<&str> {
        resolved(self.source.input.as_deref())
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn archive_name(&self) -> &str {
        self.load.archive_name.as_deref().unwrap_or("geo_insight.zip")
    }

    fn project_name(&self) -> Option<&str> {
        resolved(self.project.name.as_deref())
    }

    fn ai_settings(&self) -> Option<AiSettings> {
        if !self.ai.enabled {
            return None;
        }
        let api_key = resolved(self.ai.api_key.as_deref())?;
        let defaults = AiSettings::default();
        Some(AiSettings {
            endpoint: self.ai.endpoint.clone().unwrap_or_else(|| DEFAULT_AI_ENDPOINT.to_string()),
            model: self.ai.model.clone().unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            api_key: api_key.to_string(),
            timeout_seconds: self.ai.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            temperature: self.ai.temperature.unwrap_or(defaults.temperature),
        })
    }

    fn suggestion_debounce_ms(&self) -> u64 {
        self.ai.debounce_ms.unwrap_or(300)
    }

    fn mapping_overrides(&self) -> ColumnMapping {
        ColumnMapping {
            latitude: self.mapping.latitude.clone(),
            longitude: self.mapping.longitude.clone(),
            value: self.mapping.value.clone(),
            category: self.mapping.category.clone(),
        }
    }

    fn requested_layers(&self) -> Vec<LayerRequest> {
        self.layers
            .iter()
            .filter_map(|entry| {
                LayerType::parse(&entry.r#type).map(|layer_type| LayerRequest {
                    layer_type,
                    overrides: entry.config.clone(),
                })
            })
            .collect()
    }

    fn chart_config(&self) -> Option<ChartConfig> {
        let chart = self.chart.as_ref()?;
        Some(ChartConfig {
            chart_type: Some(ChartType::parse(&chart.r#type)?),
            x_axis: chart.x_axis.clone(),
            y_axis: chart.y_axis.clone(),
        })
    }

    fn map_settings(&self) -> MapSettings {
        MapSettings {
            access_token: resolved(self.map.access_token.as_deref()).map(str::to_string),
            base_map: self
                .map
                .base_map
                .as_deref()
                .and_then(BaseMap::parse)
                .unwrap_or_default(),
            fit_to_data: self.map.fit_to_data,
        }
    }

    fn generate_insights(&self) -> bool {
        self.ai.insights
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
