use crate::core::layers::default_config;
use crate::core::mapping::heuristic_mapping;
use crate::core::{
    ColumnMapping, ColumnTypes, InsightRequest, LatLngSuggestion, LayerSuggestion,
    LayerSuggestionRequest, LayerType, SuggestionProvider,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub const HEURISTIC_ADVISOR_NAME: &str = "heuristic";

/// 不連網的建議來源，規則與提示中的準則相同
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAdvisor;

impl HeuristicAdvisor {
    pub fn new() -> Self {
        Self
    }

    pub fn layer_suggestions(mapping: &ColumnMapping) -> Vec<LayerSuggestion> {
        if !mapping.has_lat_lng() {
            return Vec::new();
        }

        let suggest = |layer_type: LayerType, rationale: &str| LayerSuggestion {
            layer_type,
            initial_configuration: default_config(layer_type),
            rationale: rationale.to_string(),
        };

        let mut suggestions = vec![suggest(
            LayerType::ScatterplotLayer,
            "Latitude and longitude are mapped, so every row can be drawn as a point.",
        )];
        suggestions.push(suggest(
            LayerType::HexagonLayer,
            "Hexagon bins show where points are densest.",
        ));
        if mapping.value.is_some() {
            suggestions.push(suggest(
                LayerType::HeatmapLayer,
                "The mapped value can drive a smooth intensity gradient.",
            ));
        }
        suggestions
    }

    /// "us_cities-2024.csv: ..." → "Us Cities 2024 Map"
    pub fn project_name(data_description: &str) -> String {
        let source = data_description
            .split(':')
            .next()
            .unwrap_or_default()
            .trim();
        let stem = source.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(source);

        let words: Vec<String> = stem
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect();

        if words.is_empty() {
            "Untitled Project".to_string()
        } else {
            format!("{} Map", words.join(" "))
        }
    }
}

#[async_trait]
impl SuggestionProvider for HeuristicAdvisor {
    fn name(&self) -> &str {
        HEURISTIC_ADVISOR_NAME
    }

    async fn suggest_column_mapping(
        &self,
        columns: &[String],
        types: &ColumnTypes,
    ) -> Result<ColumnMapping> {
        Ok(heuristic_mapping(columns, types))
    }

    async fn suggest_lat_lng(
        &self,
        columns: &[String],
        types: &ColumnTypes,
    ) -> Result<LatLngSuggestion> {
        let mapping = heuristic_mapping(columns, types);
        Ok(LatLngSuggestion {
            latitude: mapping.latitude,
            longitude: mapping.longitude,
        })
    }

    async fn suggest_layers(&self, request: &LayerSuggestionRequest) -> Result<Vec<LayerSuggestion>> {
        Ok(Self::layer_suggestions(&request.mapping()))
    }

    async fn generate_project_name(&self, data_description: &str) -> Result<String> {
        Ok(Self::project_name(data_description))
    }

    async fn explain_data_insights(&self, request: &InsightRequest) -> Result<String> {
        let mut lines = vec![
            format!("Dataset: {}", request.dataset_description),
            format!("Visualization: {}", request.visualization_description),
        ];
        if !request.chart_summaries.trim().is_empty() {
            lines.push(format!("Charts: {}", request.chart_summaries));
        }
        Ok(lines.join("\n"))
    }
}
