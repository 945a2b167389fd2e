pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::{
    AiSettings, BaseMap, ChartConfig, ChartType, ColumnMapping, ConfigProvider, LayerRequest,
    LayerType, MapSettings,
};
#[cfg(feature = "cli")]
use crate::domain::settings::{DEFAULT_AI_ENDPOINT, DEFAULT_AI_MODEL};
#[cfg(feature = "cli")]
use crate::utils::error::{InsightError, Result};
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

/// 可上傳的副檔名
pub const INPUT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "json", "geojson"];

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "geo-insight")]
#[command(about = "Turn CSV, JSON and GeoJSON point data into map layers, charts and AI insights")]
pub struct CliConfig {
    /// 省略時載入內建範例資料
    #[arg(long, short)]
    pub input: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "geo_insight.zip")]
    pub archive_name: String,

    #[arg(long)]
    pub project_name: Option<String>,

    #[arg(long, env = "GEO_INSIGHT_AI_ENDPOINT", default_value = DEFAULT_AI_ENDPOINT)]
    pub ai_endpoint: String,

    #[arg(long, env = "GEO_INSIGHT_AI_MODEL", default_value = DEFAULT_AI_MODEL)]
    pub ai_model: String,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub ai_api_key: Option<String>,

    #[arg(long, default_value = "30")]
    pub ai_timeout: u64,

    #[arg(long, default_value = "0.2")]
    pub ai_temperature: f64,

    #[arg(long, help = "Use built-in heuristics instead of the AI service")]
    pub no_ai: bool,

    #[arg(long, default_value = "300")]
    pub debounce_ms: u64,

    #[arg(long)]
    pub lat: Option<String>,

    #[arg(long)]
    pub lng: Option<String>,

    #[arg(long)]
    pub value: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    /// 例如 "scatterplot,hexagon"；省略時採用建議的圖層
    #[arg(long, value_delimiter = ',')]
    pub layers: Vec<String>,

    #[arg(long, help = "bar, line, pie, scatter, histogram or summary")]
    pub chart: Option<String>,

    #[arg(long)]
    pub x_axis: Option<String>,

    #[arg(long)]
    pub y_axis: Option<String>,

    #[arg(long, env = "MAPBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub map_token: Option<String>,

    #[arg(long, default_value = "dark")]
    pub base_map: String,

    #[arg(long, help = "Fit the viewport to the mapped points")]
    pub fit_to_data: bool,

    #[arg(long, help = "Ask for a written summary of the data")]
    pub insights: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn input_path(&self) -> Option<&str> {
        self.input.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn archive_name(&self) -> &str {
        &self.archive_name
    }

    fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    fn ai_settings(&self) -> Option<AiSettings> {
        if self.no_ai {
            return None;
        }
        let api_key = self.ai_api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(AiSettings {
            endpoint: self.ai_endpoint.clone(),
            model: self.ai_model.clone(),
            api_key: api_key.to_string(),
            timeout_seconds: self.ai_timeout,
            temperature: self.ai_temperature,
        })
    }

    fn suggestion_debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    fn mapping_overrides(&self) -> ColumnMapping {
        ColumnMapping {
            latitude: self.lat.clone(),
            longitude: self.lng.clone(),
            value: self.value.clone(),
            category: self.category.clone(),
        }
    }

    fn requested_layers(&self) -> Vec<LayerRequest> {
        self.layers
            .iter()
            .filter_map(|name| LayerType::parse(name))
            .map(LayerRequest::new)
            .collect()
    }

    fn chart_config(&self) -> Option<ChartConfig> {
        let chart_type = ChartType::parse(self.chart.as_deref()?)?;
        Some(ChartConfig {
            chart_type: Some(chart_type),
            x_axis: self.x_axis.clone(),
            y_axis: self.y_axis.clone(),
        })
    }

    fn map_settings(&self) -> MapSettings {
        MapSettings {
            access_token: self.map_token.clone(),
            base_map: BaseMap::parse(&self.base_map).unwrap_or_default(),
            fit_to_data: self.fit_to_data,
        }
    }

    fn generate_insights(&self) -> bool {
        self.insights
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_file_extension("archive_name", &self.archive_name, &["zip"])?;

        if let Some(input) = &self.input {
            validation::validate_path("input", input)?;
            validation::validate_file_extension("input", input, INPUT_EXTENSIONS)?;
        }

        if self.ai_settings().is_some() {
            validation::validate_url("ai_endpoint", &self.ai_endpoint)?;
            validation::validate_non_empty_string("ai_model", &self.ai_model)?;
            validation::validate_positive_number("ai_timeout", self.ai_timeout, 1)?;
            validation::validate_range("ai_temperature", self.ai_temperature, 0.0, 2.0)?;
        }

        for name in &self.layers {
            if LayerType::parse(name).is_none() {
                return Err(InsightError::InvalidConfigValueError {
                    field: "layers".to_string(),
                    value: name.clone(),
                    reason: format!(
                        "Unknown layer type. Valid types: {}",
                        LayerType::ALL.map(|t| t.as_str()).join(", ")
                    ),
                });
            }
        }

        match self.chart.as_deref() {
            Some(chart) if ChartType::parse(chart).is_none() => {
                return Err(InsightError::InvalidConfigValueError {
                    field: "chart".to_string(),
                    value: chart.to_string(),
                    reason: "Valid charts: bar, line, pie, scatter, histogram, summary".to_string(),
                });
            }
            None if self.x_axis.is_some() || self.y_axis.is_some() => {
                return Err(InsightError::MissingConfigError {
                    field: "chart".to_string(),
                });
            }
            _ => {}
        }

        if BaseMap::parse(&self.base_map).is_none() {
            return Err(InsightError::InvalidConfigValueError {
                field: "base_map".to_string(),
                value: self.base_map.clone(),
                reason: "Base map must be 'dark' or 'light'".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        let mut full = vec!["geo-insight"];
        full.extend_from_slice(args);
        CliConfig::parse_from(full)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--no-ai"]);
        assert_eq!(config.output_path, "./output");
        assert_eq!(config.archive_name, "geo_insight.zip");
        assert!(config.ai_settings().is_none());
        assert!(config.mapping_overrides().is_empty());
        assert_eq!(config.map_settings().base_map, BaseMap::Dark);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ai_settings_need_key() {
        let config = parse(&["--ai-api-key", "abc", "--ai-temperature", "0.5"]);
        let settings = config.ai_settings().unwrap();
        assert_eq!(settings.api_key, "abc");
        assert_eq!(settings.temperature, 0.5);
        assert_eq!(settings.model, DEFAULT_AI_MODEL);

        let blank = parse(&["--ai-api-key", "  "]);
        assert!(blank.ai_settings().is_none());
    }

    #[test]
    fn test_layers_chart_and_mapping() {
        let config = parse(&[
            "--no-ai",
            "--layers",
            "scatterplot,hexagon",
            "--chart",
            "bar",
            "--x-axis",
            "region",
            "--y-axis",
            "population",
            "--lat",
            "Y",
            "--base-map",
            "light",
        ]);
        let layers: Vec<LayerType> = config.requested_layers().iter().map(|r| r.layer_type).collect();
        assert_eq!(layers, vec![LayerType::ScatterplotLayer, LayerType::HexagonLayer]);
        assert_eq!(config.chart_config().unwrap().chart_type, Some(ChartType::Bar));
        assert_eq!(config.mapping_overrides().latitude.as_deref(), Some("Y"));
        assert_eq!(config.map_settings().base_map, BaseMap::Light);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(parse(&["--no-ai", "--layers", "arc"]).validate().is_err());
        assert!(parse(&["--no-ai", "--chart", "radar"]).validate().is_err());
        assert!(parse(&["--no-ai", "--x-axis", "a"]).validate().is_err());
        assert!(parse(&["--no-ai", "--input", "book.xlsx"]).validate().is_err());
        assert!(parse(&["--no-ai", "--archive-name", "out.tar"]).validate().is_err());
        assert!(parse(&["--ai-api-key", "k", "--ai-endpoint", "ftp://x"])
            .validate()
            .is_err());
    }
}
