use crate::domain::model::{
    ChartConfig, ColumnMapping, ColumnTypes, Dataset, InsightResult, LayerSuggestion,
};
use crate::domain::settings::{AiSettings, LayerRequest, MapSettings};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    /// None 表示使用內建的範例資料
    fn input_path(&self) -> Option<&str>;
    fn output_path(&self) -> &str;
    fn archive_name(&self) -> &str;
    fn project_name(&self) -> Option<&str>;
    /// None 表示停用 AI，改用內建規則
    fn ai_settings(&self) -> Option<AiSettings>;
    fn suggestion_debounce_ms(&self) -> u64;
    fn mapping_overrides(&self) -> ColumnMapping;
    fn requested_layers(&self) -> Vec<LayerRequest>;
    fn chart_config(&self) -> Option<ChartConfig>;
    fn map_settings(&self) -> MapSettings;
    fn generate_insights(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, dataset: Dataset) -> Result<InsightResult>;
    async fn load(&self, result: InsightResult) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLngSuggestion {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerSuggestionRequest {
    #[serde(rename = "columnTypes")]
    pub column_types: ColumnTypes,
    #[serde(rename = "columnNames")]
    pub column_names: Vec<String>,
    #[serde(rename = "mappedLatitude")]
    pub mapped_latitude: Option<String>,
    #[serde(rename = "mappedLongitude")]
    pub mapped_longitude: Option<String>,
    #[serde(rename = "mappedValue")]
    pub mapped_value: Option<String>,
    #[serde(rename = "mappedCategory")]
    pub mapped_category: Option<String>,
}

impl LayerSuggestionRequest {
    pub fn mapping(&self) -> ColumnMapping {
        ColumnMapping {
            latitude: self.mapped_latitude.clone(),
            longitude: self.mapped_longitude.clone(),
            value: self.mapped_value.clone(),
            category: self.mapped_category.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    #[serde(rename = "datasetDescription")]
    pub dataset_description: String,
    #[serde(rename = "visualizationDescription")]
    pub visualization_description: String,
    #[serde(rename = "chartSummaries")]
    pub chart_summaries: String,
}

/// 產生欄位對應、圖層建議等的顧問；輸出尚未經過修補
///
/// `types` 僅供離線規則使用，遠端模型只看得到欄位名稱。
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn suggest_column_mapping(
        &self,
        columns: &[String],
        types: &ColumnTypes,
    ) -> Result<ColumnMapping>;
    async fn suggest_lat_lng(
        &self,
        columns: &[String],
        types: &ColumnTypes,
    ) -> Result<LatLngSuggestion>;
    async fn suggest_layers(&self, request: &LayerSuggestionRequest) -> Result<Vec<LayerSuggestion>>;
    async fn generate_project_name(&self, data_description: &str) -> Result<String>;
    async fn explain_data_insights(&self, request: &InsightRequest) -> Result<String>;
}
