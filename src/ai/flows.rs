use crate::ai::client::GenAiClient;
use crate::ai::{prompts, repair};
use crate::core::{
    ColumnMapping, ColumnTypes, InsightRequest, LatLngSuggestion, LayerSuggestion,
    LayerSuggestionRequest, SuggestionProvider,
};
use crate::utils::error::{InsightError, Result};
use async_trait::async_trait;
use serde_json::Value;

pub const SUGGEST_COLUMN_MAPPING: &str = "suggestColumnMapping";
pub const SUGGEST_LAT_LNG: &str = "suggestLatLng";
pub const SUGGEST_LAYERS: &str = "suggestLayers";
pub const GENERATE_PROJECT_NAME: &str = "generateProjectName";
pub const EXPLAIN_DATA_INSIGHTS: &str = "explainDataInsights";

fn missing_field(flow: &str, field: &str, value: &Value) -> InsightError {
    tracing::debug!("{} reply without '{}': {}", flow, field, value);
    InsightError::AiResponseError {
        flow: flow.to_string(),
        message: format!("reply has no '{}' field", field),
    }
}

#[async_trait]
impl SuggestionProvider for GenAiClient {
    fn name(&self) -> &str {
        &self.settings().model
    }

    async fn suggest_column_mapping(
        &self,
        columns: &[String],
        _types: &ColumnTypes,
    ) -> Result<ColumnMapping> {
        let prompt = prompts::column_mapping(columns);
        let value = self
            .generate_json(SUGGEST_COLUMN_MAPPING, &prompt, self.settings().temperature)
            .await?;
        Ok(repair::parse_mapping(&value))
    }

    async fn suggest_lat_lng(
        &self,
        columns: &[String],
        _types: &ColumnTypes,
    ) -> Result<LatLngSuggestion> {
        let prompt = prompts::lat_lng(columns);
        let value = self.generate_json(SUGGEST_LAT_LNG, &prompt, 0.0).await?;
        Ok(repair::parse_lat_lng(&value))
    }

    async fn suggest_layers(&self, request: &LayerSuggestionRequest) -> Result<Vec<LayerSuggestion>> {
        let prompt = prompts::layer_suggestions(request);
        let value = self
            .generate_json(SUGGEST_LAYERS, &prompt, self.settings().temperature)
            .await?;
        Ok(repair::parse_layer_suggestions(&value))
    }

    async fn generate_project_name(&self, data_description: &str) -> Result<String> {
        let prompt = prompts::project_name(data_description);
        let value = self
            .generate_json(GENERATE_PROJECT_NAME, &prompt, self.settings().temperature)
            .await?;
        repair::parse_text_field(&value, "projectName")
            .map(|name| name.trim_matches(|c| c == '"' || c == '\'').to_string())
            .ok_or_else(|| missing_field(GENERATE_PROJECT_NAME, "projectName", &value))
    }

    async fn explain_data_insights(&self, request: &InsightRequest) -> Result<String> {
        let prompt = prompts::data_insights(request);
        let value = self
            .generate_json(EXPLAIN_DATA_INSIGHTS, &prompt, self.settings().temperature)
            .await?;
        repair::parse_text_field(&value, "summary")
            .ok_or_else(|| missing_field(EXPLAIN_DATA_INSIGHTS, "summary", &value))
    }
}
