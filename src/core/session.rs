//! 單一扁平狀態：目前的資料、對應、圖層、視角與圖表設定。

use crate::ai::flows::{
    EXPLAIN_DATA_INSIGHTS, GENERATE_PROJECT_NAME, SUGGEST_COLUMN_MAPPING, SUGGEST_LAT_LNG,
    SUGGEST_LAYERS,
};
use crate::ai::{normalize_layer_suggestions, DebounceOutcome, Debouncer};
use crate::core::charts::{build_chart, describe_chart, validate_axis};
use crate::core::ingest::parse_dataset;
use crate::core::layers::{display_name, LayerStack};
use crate::core::mapping::{extract_points, heuristic_mapping, repair_mapping, PointExtraction};
use crate::core::schema::infer_column_types;
use crate::core::{
    ActiveView, AiFailure, BaseMap, ChartAxis, ChartConfig, ChartOutput, ChartType, ColumnMapping,
    ColumnTypes, Dataset, InsightRequest, LayerConfig, LayerSpec, LayerSuggestion,
    LayerSuggestionRequest, LayerType, MapView, MappingRole, ProjectSnapshot, SuggestionProvider,
    Viewport,
};
use crate::utils::error::{InsightError, Result};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";

#[derive(Debug, Clone)]
pub struct AppState {
    pub project_name: String,
    pub dataset: Option<Dataset>,
    pub column_types: ColumnTypes,
    pub mapping: ColumnMapping,
    pub layers: LayerStack,
    pub layer_suggestions: Vec<LayerSuggestion>,
    pub viewport: Viewport,
    pub base_map: BaseMap,
    pub chart_config: ChartConfig,
    pub active_view: ActiveView,
    pub ai_error: Option<AiFailure>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            dataset: None,
            column_types: ColumnTypes::new(),
            mapping: ColumnMapping::default(),
            layers: LayerStack::new(),
            layer_suggestions: Vec::new(),
            viewport: Viewport::default(),
            base_map: BaseMap::default(),
            chart_config: ChartConfig::default(),
            active_view: ActiveView::default(),
            ai_error: None,
        }
    }
}

/// 一次圖層建議請求的結果，連同送出時的欄位對應
#[derive(Debug)]
pub struct LayerSuggestionResponse {
    mapping: ColumnMapping,
    outcome: DebounceOutcome<Result<Vec<LayerSuggestion>>>,
}

impl LayerSuggestionResponse {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, DebounceOutcome::Completed(_))
    }

    pub fn outcome(&self) -> &DebounceOutcome<Result<Vec<LayerSuggestion>>> {
        &self.outcome
    }
}

pub struct Session {
    state: AppState,
    provider: Arc<dyn SuggestionProvider>,
    debouncer: Debouncer,
}

impl Session {
    pub fn new(provider: Arc<dyn SuggestionProvider>) -> Self {
        Self::with_debounce(provider, Duration::ZERO)
    }

    pub fn with_debounce(provider: Arc<dyn SuggestionProvider>, delay: Duration) -> Self {
        Self {
            state: AppState::default(),
            provider,
            debouncer: Debouncer::new(delay),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.state.dataset.as_ref()
    }

    fn require_dataset(&self) -> Result<&Dataset> {
        self.state
            .dataset
            .as_ref()
            .ok_or_else(|| InsightError::ProcessingError {
                message: "no dataset has been loaded".to_string(),
            })
    }

    fn columns(&self) -> &[String] {
        self.state
            .dataset
            .as_ref()
            .map(|d| d.columns.as_slice())
            .unwrap_or_default()
    }

    // ---- 資料 ----

    /// 換成新的資料；專案名稱與視角保留
    pub fn load_dataset(&mut self, dataset: Dataset) {
        let types = infer_column_types(&dataset);
        tracing::info!(
            "📂 Loaded {} ({} rows, {} columns)",
            dataset.name,
            dataset.len(),
            dataset.columns.len()
        );

        self.state.column_types = types;
        self.state.dataset = Some(dataset);
        self.state.mapping = ColumnMapping::default();
        self.state.layers.clear();
        self.state.layer_suggestions.clear();
        self.state.chart_config = ChartConfig::default();
        self.state.active_view = ActiveView::Map;
    }

    /// 解析失敗時狀態不變
    pub fn load_file(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let dataset = parse_dataset(name, bytes)?;
        self.load_dataset(dataset);
        Ok(())
    }

    pub fn set_project_name(&mut self, name: &str) {
        let name = name.trim();
        self.state.project_name = if name.is_empty() {
            DEFAULT_PROJECT_NAME.to_string()
        } else {
            name.to_string()
        };
    }

    // ---- 地圖 ----

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    /// 回傳納入計算的點數
    pub fn fit_viewport_to_data(&mut self, width: f64, height: f64) -> Result<usize> {
        let extraction = self.points()?;
        self.state.viewport = self
            .state
            .viewport
            .fit_bounds(&extraction.points, width, height);
        tracing::debug!(
            "🗺️ Viewport fitted to {} points: zoom {:.2}",
            extraction.points.len(),
            self.state.viewport.zoom
        );
        Ok(extraction.points.len())
    }

    pub fn set_base_map(&mut self, base_map: BaseMap) {
        self.state.base_map = base_map;
    }

    pub fn points(&self) -> Result<PointExtraction> {
        extract_points(self.require_dataset()?, &self.state.mapping)
    }

    pub fn map_view(&self, access_token: Option<&str>) -> Result<MapView> {
        MapView::build(
            access_token,
            self.state.base_map,
            self.state.viewport,
            self.state.layers.layers(),
        )
    }

    // ---- 欄位對應 ----

    pub fn set_mapping(&mut self, mapping: ColumnMapping) -> Result<()> {
        crate::core::mapping::validate_mapping(&mapping, self.columns())?;
        self.apply_mapping(mapping);
        Ok(())
    }

    /// 指定的欄位會從其他角色移除
    pub fn set_role(&mut self, role: MappingRole, column: Option<&str>) -> Result<()> {
        let mapping = match column {
            Some(column) => {
                if !self.columns().iter().any(|c| c == column) {
                    return Err(InsightError::UnknownColumn {
                        column: column.to_string(),
                    });
                }
                let mut single = ColumnMapping::default();
                single.set(role, Some(column.to_string()));
                self.state.mapping.merge_overrides(&single)
            }
            None => {
                let mut cleared = self.state.mapping.clone();
                cleared.set(role, None);
                cleared
            }
        };
        self.apply_mapping(mapping);
        Ok(())
    }

    fn apply_mapping(&mut self, mapping: ColumnMapping) {
        if !mapping.has_lat_lng() {
            self.state.layer_suggestions.clear();
        }
        self.state.mapping = mapping;
    }

    pub async fn suggest_mapping(&mut self) -> Result<ColumnMapping> {
        let dataset = self.require_dataset()?;
        let columns = dataset.columns.clone();
        let types = self.state.column_types.clone();

        let suggested = self.provider.suggest_column_mapping(&columns, &types).await;
        let mapping = match suggested {
            Ok(raw) => repair_mapping(&raw, &columns),
            Err(e) => {
                self.record_ai_failure(SUGGEST_COLUMN_MAPPING, &e);
                heuristic_mapping(&columns, &types)
            }
        };

        tracing::info!(
            "🧭 Mapping: lat={:?} lng={:?} value={:?} category={:?}",
            mapping.latitude,
            mapping.longitude,
            mapping.value,
            mapping.category
        );
        self.apply_mapping(mapping.clone());
        Ok(mapping)
    }

    /// 只補經緯度，其餘角色不動
    pub async fn suggest_lat_lng(&mut self) -> Result<ColumnMapping> {
        let columns = self.require_dataset()?.columns.clone();
        let types = self.state.column_types.clone();

        let reply = self.provider.suggest_lat_lng(&columns, &types).await;
        let suggested = match reply {
            Ok(raw) => repair_mapping(
                &ColumnMapping {
                    latitude: raw.latitude,
                    longitude: raw.longitude,
                    ..Default::default()
                },
                &columns,
            ),
            Err(e) => {
                self.record_ai_failure(SUGGEST_LAT_LNG, &e);
                let fallback = heuristic_mapping(&columns, &types);
                ColumnMapping {
                    latitude: fallback.latitude,
                    longitude: fallback.longitude,
                    ..Default::default()
                }
            }
        };

        let merged = self.state.mapping.merge_overrides(&suggested);
        self.apply_mapping(merged.clone());
        Ok(merged)
    }

    pub fn describe_dataset(&self) -> String {
        let Some(dataset) = self.state.dataset.as_ref() else {
            return "No dataset loaded".to_string();
        };
        let columns: Vec<String> = dataset
            .columns
            .iter()
            .map(|c| match self.state.column_types.get(c) {
                Some(t) => format!("{} ({})", c, t),
                None => c.clone(),
            })
            .collect();
        format!(
            "{}: {} rows. Columns: {}",
            dataset.name,
            dataset.len(),
            columns.join(", ")
        )
    }

    pub fn describe_visualization(&self) -> String {
        let mapping = &self.state.mapping;
        let mut parts = Vec::new();
        for role in MappingRole::ALL {
            if let Some(column) = mapping.get(role) {
                parts.push(format!("{} = {}", role.as_str(), column));
            }
        }
        let layers: Vec<String> = self
            .state
            .layers
            .layers()
            .iter()
            .map(|l| display_name(l.layer_type))
            .collect();
        format!(
            "Mapped columns: {}. Layers: {}. Base map: {:?}.",
            if parts.is_empty() { "none".to_string() } else { parts.join(", ") },
            if layers.is_empty() { "none".to_string() } else { layers.join(", ") },
            self.state.base_map
        )
    }

    /// 失敗時保留原名稱
    pub async fn suggest_project_name(&mut self) -> String {
        let description = self.describe_dataset();
        let reply = self.provider.generate_project_name(&description).await;
        match reply {
            Ok(name) => {
                tracing::info!("🏷️ Project name: {}", name);
                self.set_project_name(&name);
            }
            Err(e) => self.record_ai_failure(GENERATE_PROJECT_NAME, &e),
        }
        self.state.project_name.clone()
    }

    // ---- 圖層建議 ----

    pub fn layer_suggestion_request(&self) -> LayerSuggestionRequest {
        let mapping = &self.state.mapping;
        LayerSuggestionRequest {
            column_types: self.state.column_types.clone(),
            column_names: self.columns().to_vec(),
            mapped_latitude: mapping.latitude.clone(),
            mapped_longitude: mapping.longitude.clone(),
            mapped_value: mapping.value.clone(),
            mapped_category: mapping.category.clone(),
        }
    }

    /// 只讀取狀態送出請求，多個請求可同時進行；結果交給 `apply_layer_suggestions`
    pub async fn request_layer_suggestions(&self) -> LayerSuggestionResponse {
        let mapping = self.state.mapping.clone();
        if !mapping.has_lat_lng() {
            return LayerSuggestionResponse {
                mapping,
                outcome: DebounceOutcome::Completed(Ok(Vec::new())),
            };
        }

        let request = self.layer_suggestion_request();
        let provider = Arc::clone(&self.provider);
        let outcome = self
            .debouncer
            .run(|| async move { provider.suggest_layers(&request).await })
            .await;
        LayerSuggestionResponse { mapping, outcome }
    }

    /// 回傳是否更新了建議；被取代、忙碌中或對應已改變時為 false
    pub fn apply_layer_suggestions(&mut self, response: LayerSuggestionResponse) -> bool {
        if !self.state.mapping.has_lat_lng() {
            self.state.layer_suggestions.clear();
            return false;
        }
        if response.mapping != self.state.mapping {
            tracing::debug!("Discarding layer suggestions for an outdated mapping");
            return false;
        }

        let raw = match response.outcome {
            DebounceOutcome::Completed(Ok(suggestions)) => suggestions,
            DebounceOutcome::Completed(Err(e)) => {
                self.record_ai_failure(SUGGEST_LAYERS, &e);
                Vec::new()
            }
            DebounceOutcome::Superseded | DebounceOutcome::Busy => return false,
        };

        self.state.layer_suggestions = normalize_layer_suggestions(raw, &response.mapping);
        tracing::info!(
            "💡 {} layer suggestions: {}",
            self.state.layer_suggestions.len(),
            self.state
                .layer_suggestions
                .iter()
                .map(|s| s.layer_type.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        true
    }

    pub async fn refresh_layer_suggestions(&mut self) -> bool {
        let response = self.request_layer_suggestions().await;
        self.apply_layer_suggestions(response)
    }

    // ---- 圖層 ----

    pub fn add_layer(&mut self, layer_type: LayerType) -> Result<String> {
        let mapping = self.state.mapping.clone();
        Ok(self.state.layers.add(layer_type, &mapping)?.id.clone())
    }

    pub fn add_layer_with_overrides(
        &mut self,
        layer_type: LayerType,
        overrides: &LayerConfig,
    ) -> Result<String> {
        let id = self.add_layer(layer_type)?;
        if !overrides.0.is_empty() {
            self.state.layers.update_config(&id, overrides)?;
        }
        Ok(id)
    }

    pub fn add_suggested_layer(&mut self, index: usize) -> Result<String> {
        let suggestion = self
            .state
            .layer_suggestions
            .get(index)
            .cloned()
            .ok_or_else(|| InsightError::LayerError {
                message: format!("no layer suggestion at position {}", index),
            })?;
        let mapping = self.state.mapping.clone();
        Ok(self
            .state
            .layers
            .add_suggested(&suggestion, &mapping)?
            .id
            .clone())
    }

    pub fn layers(&self) -> &[LayerSpec] {
        self.state.layers.layers()
    }

    pub fn remove_layer(&mut self, id: &str) -> Result<LayerSpec> {
        self.state.layers.remove(id)
    }

    pub fn update_layer_config(&mut self, id: &str, patch: &LayerConfig) -> Result<()> {
        self.state.layers.update_config(id, patch)
    }

    pub fn set_layer_opacity(&mut self, id: &str, opacity: f64) -> Result<()> {
        self.state.layers.set_opacity(id, opacity)
    }

    pub fn set_layer_fill_color(&mut self, id: &str, palette_name: &str) -> Result<()> {
        self.state.layers.set_fill_color(id, palette_name)
    }

    pub fn set_layer_color_range(&mut self, id: &str, ramp_name: &str) -> Result<()> {
        self.state.layers.set_color_range(id, ramp_name)
    }

    // ---- 圖表 ----

    /// 再點一次同類型會取消並回到地圖
    pub fn select_chart_type(&mut self, chart_type: ChartType) {
        if self.state.chart_config.chart_type == Some(chart_type) {
            self.state.chart_config.chart_type = None;
            self.state.active_view = ActiveView::Map;
        } else {
            self.state.chart_config = ChartConfig {
                chart_type: Some(chart_type),
                x_axis: None,
                y_axis: None,
            };
            self.state.active_view = ActiveView::Chart;
        }
    }

    pub fn set_chart_axis(&mut self, axis: ChartAxis, column: &str) -> Result<()> {
        let chart_type = self
            .state
            .chart_config
            .chart_type
            .ok_or_else(|| InsightError::ChartError {
                message: "select a chart type before choosing axes".to_string(),
            })?;
        validate_axis(chart_type, axis, column, &self.state.column_types)?;
        let slot = match axis {
            ChartAxis::X => &mut self.state.chart_config.x_axis,
            ChartAxis::Y => &mut self.state.chart_config.y_axis,
        };
        *slot = Some(column.to_string());
        Ok(())
    }

    /// 一次套用完整的圖表設定
    pub fn configure_chart(&mut self, config: &ChartConfig) -> Result<()> {
        let Some(chart_type) = config.chart_type else {
            self.state.chart_config = ChartConfig::default();
            return Ok(());
        };
        if self.state.chart_config.chart_type != Some(chart_type) {
            self.select_chart_type(chart_type);
        }
        if let Some(x) = config.x_axis.as_deref() {
            self.set_chart_axis(ChartAxis::X, x)?;
        }
        if let Some(y) = config.y_axis.as_deref() {
            self.set_chart_axis(ChartAxis::Y, y)?;
        }
        Ok(())
    }

    pub fn set_active_view(&mut self, view: ActiveView) -> Result<()> {
        match view {
            ActiveView::Chart if self.state.chart_config.chart_type.is_none() => {
                return Err(InsightError::ChartError {
                    message: "select a chart type to open the chart view".to_string(),
                });
            }
            ActiveView::Map => self.state.chart_config.chart_type = None,
            ActiveView::Chart => {}
        }
        self.state.active_view = view;
        Ok(())
    }

    pub fn chart(&self) -> Result<ChartOutput> {
        build_chart(self.require_dataset()?, &self.state.chart_config)
    }

    // ---- AI 錯誤與說明 ----

    fn record_ai_failure(&mut self, flow: &str, error: &InsightError) {
        tracing::warn!("❌ AI flow {} failed: {}", flow, error);
        tracing::warn!("💡 建議: {}", error.recovery_suggestion());
        self.state.ai_error = Some(AiFailure {
            message: error.to_string(),
            source: flow.to_string(),
        });
    }

    pub fn clear_ai_error(&mut self) {
        self.state.ai_error = None;
    }

    /// AI 失敗時回傳 None
    pub async fn explain_insights(&mut self) -> Option<String> {
        let chart_summaries = self
            .chart()
            .map(|chart| describe_chart(&chart))
            .unwrap_or_default();
        let request = InsightRequest {
            dataset_description: self.describe_dataset(),
            visualization_description: self.describe_visualization(),
            chart_summaries,
        };

        let reply = self.provider.explain_data_insights(&request).await;
        match reply {
            Ok(summary) => Some(summary),
            Err(e) => {
                self.record_ai_failure(EXPLAIN_DATA_INSIGHTS, &e);
                None
            }
        }
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        let state = &self.state;
        ProjectSnapshot {
            project_name: state.project_name.clone(),
            source: state.dataset.as_ref().map(|d| d.name.clone()),
            row_count: state.dataset.as_ref().map(Dataset::len).unwrap_or(0),
            columns: self.columns().to_vec(),
            column_types: state.column_types.clone(),
            mapping: state.mapping.clone(),
            layers: state.layers.layers().to_vec(),
            layer_suggestions: state.layer_suggestions.clone(),
            viewport: state.viewport,
            base_map: state.base_map,
            chart_config: state.chart_config.clone(),
            active_view: state.active_view,
            ai_error: state.ai_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::HeuristicAdvisor;
    use crate::core::ingest::sample_dataset;
    use crate::core::LatLngSuggestion;
    use async_trait::async_trait;

    /// 每個流程都失敗的顧問
    struct FailingProvider;

    fn offline() -> InsightError {
        InsightError::AiError {
            flow: "test".to_string(),
            message: "service unavailable".to_string(),
        }
    }

    #[async_trait]
    impl SuggestionProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn suggest_column_mapping(&self, _: &[String], _: &ColumnTypes) -> Result<ColumnMapping> {
            Err(offline())
        }
        async fn suggest_lat_lng(&self, _: &[String], _: &ColumnTypes) -> Result<LatLngSuggestion> {
            Err(offline())
        }
        async fn suggest_layers(&self, _: &LayerSuggestionRequest) -> Result<Vec<LayerSuggestion>> {
            Err(offline())
        }
        async fn generate_project_name(&self, _: &str) -> Result<String> {
            Err(offline())
        }
        async fn explain_data_insights(&self, _: &InsightRequest) -> Result<String> {
            Err(offline())
        }
    }

    fn sample_session() -> Session {
        let mut session = Session::new(Arc::new(HeuristicAdvisor::new()));
        session.load_dataset(sample_dataset().unwrap());
        session
    }

    #[tokio::test]
    async fn test_offline_flow_on_sample_data() {
        let mut session = sample_session();
        let mapping = session.suggest_mapping().await.unwrap();
        assert_eq!(mapping.latitude.as_deref(), Some("latitude"));
        assert_eq!(mapping.longitude.as_deref(), Some("longitude"));
        assert_eq!(mapping.value.as_deref(), Some("population"));

        assert!(session.refresh_layer_suggestions().await);
        let suggestions = &session.state().layer_suggestions;
        assert_eq!(suggestions[0].layer_type, LayerType::ScatterplotLayer);
        assert_eq!(suggestions.len(), 3);

        let id = session.add_suggested_layer(1).unwrap();
        assert!(id.starts_with("hexagonlayer-"));
        assert!(session.add_suggested_layer(1).is_err());

        assert_eq!(session.suggest_project_name().await, "Sample Data Map");
        assert!(session.state().ai_error.is_none());
    }

    #[tokio::test]
    async fn test_ai_failures_fall_back_and_are_recorded() {
        let mut session = Session::new(Arc::new(FailingProvider));
        session.load_dataset(sample_dataset().unwrap());

        let mapping = session.suggest_mapping().await.unwrap();
        assert!(mapping.has_lat_lng());
        assert_eq!(
            session.state().ai_error.as_ref().map(|e| e.source.as_str()),
            Some(SUGGEST_COLUMN_MAPPING)
        );

        assert!(session.refresh_layer_suggestions().await);
        assert_eq!(
            session.state().layer_suggestions,
            vec![crate::ai::fallback_layer_suggestion()]
        );

        assert_eq!(session.suggest_project_name().await, DEFAULT_PROJECT_NAME);
        assert!(session.explain_insights().await.is_none());

        session.clear_ai_error();
        assert!(session.state().ai_error.is_none());
    }

    /// 建議圖層很慢的顧問，其餘流程交給規則顧問
    struct SlowProvider {
        inner: HeuristicAdvisor,
        latency: Duration,
    }

    #[async_trait]
    impl SuggestionProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }
        async fn suggest_column_mapping(&self, columns: &[String], types: &ColumnTypes) -> Result<ColumnMapping> {
            self.inner.suggest_column_mapping(columns, types).await
        }
        async fn suggest_lat_lng(&self, columns: &[String], types: &ColumnTypes) -> Result<LatLngSuggestion> {
            self.inner.suggest_lat_lng(columns, types).await
        }
        async fn suggest_layers(&self, request: &LayerSuggestionRequest) -> Result<Vec<LayerSuggestion>> {
            tokio::time::sleep(self.latency).await;
            self.inner.suggest_layers(request).await
        }
        async fn generate_project_name(&self, description: &str) -> Result<String> {
            self.inner.generate_project_name(description).await
        }
        async fn explain_data_insights(&self, request: &InsightRequest) -> Result<String> {
            self.inner.explain_data_insights(request).await
        }
    }

    async fn slow_session(debounce: Duration, latency: Duration) -> Session {
        let provider = SlowProvider {
            inner: HeuristicAdvisor::new(),
            latency,
        };
        let mut session = Session::with_debounce(Arc::new(provider), debounce);
        session.load_dataset(sample_dataset().unwrap());
        session.suggest_mapping().await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_pending_one() {
        let mut session = slow_session(Duration::from_millis(30), Duration::from_millis(5)).await;

        let (first, second) = tokio::join!(
            session.request_layer_suggestions(),
            session.request_layer_suggestions()
        );
        assert!(matches!(first.outcome(), DebounceOutcome::Superseded));
        assert!(second.is_completed());

        assert!(!session.apply_layer_suggestions(first));
        assert!(session.state().layer_suggestions.is_empty());
        assert!(session.apply_layer_suggestions(second));
        assert_eq!(
            session.state().layer_suggestions[0].layer_type,
            LayerType::ScatterplotLayer
        );
    }

    #[tokio::test]
    async fn test_request_during_slow_call_is_refused() {
        let mut session = slow_session(Duration::from_millis(10), Duration::from_millis(400)).await;

        let (first, second) = tokio::join!(session.request_layer_suggestions(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            session.request_layer_suggestions().await
        });
        assert!(first.is_completed());
        assert!(matches!(second.outcome(), DebounceOutcome::Busy));

        assert!(!session.apply_layer_suggestions(second));
        assert!(session.apply_layer_suggestions(first));
        assert!(!session.state().layer_suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_response_for_old_mapping_is_discarded() {
        let mut session = sample_session();
        session.suggest_mapping().await.unwrap();
        let response = session.request_layer_suggestions().await;

        session.set_role(MappingRole::Value, None).unwrap();
        assert!(!session.apply_layer_suggestions(response));
        assert!(session.state().layer_suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_losing_lat_lng_clears_suggestions() {
        let mut session = sample_session();
        session.suggest_mapping().await.unwrap();
        session.refresh_layer_suggestions().await;
        assert!(!session.state().layer_suggestions.is_empty());

        session.set_role(MappingRole::Latitude, None).unwrap();
        assert!(session.state().layer_suggestions.is_empty());
        assert!(!session.refresh_layer_suggestions().await);
    }

    #[test]
    fn test_set_role_moves_column() {
        let mut session = sample_session();
        session.set_role(MappingRole::Value, Some("population")).unwrap();
        session.set_role(MappingRole::Category, Some("population")).unwrap();
        assert_eq!(session.state().mapping.value, None);
        assert_eq!(session.state().mapping.category.as_deref(), Some("population"));
        assert!(matches!(
            session.set_role(MappingRole::Latitude, Some("nope")),
            Err(InsightError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_failed_parse_keeps_state() {
        let mut session = sample_session();
        session.set_project_name("Cities");
        assert!(session.load_file("broken.xlsx", b"PK").is_err());
        assert_eq!(session.state().project_name, "Cities");
        assert_eq!(session.snapshot().source.as_deref(), Some("sample-data.csv"));
    }

    #[test]
    fn test_load_dataset_resets_mapping_but_keeps_viewport() {
        let mut session = sample_session();
        session.set_role(MappingRole::Latitude, Some("latitude")).unwrap();
        let viewport = Viewport {
            zoom: 7.0,
            ..Viewport::default()
        };
        session.set_viewport(viewport);

        session.load_file("other.csv", b"a,b\n1,2\n").unwrap();
        assert!(session.state().mapping.is_empty());
        assert_eq!(session.state().viewport, viewport);
        assert_eq!(session.snapshot().row_count, 1);
    }

    #[test]
    fn test_chart_panel_semantics() {
        let mut session = sample_session();
        assert!(session.set_active_view(ActiveView::Chart).is_err());

        session.select_chart_type(ChartType::Bar);
        assert_eq!(session.state().active_view, ActiveView::Chart);
        session.set_chart_axis(ChartAxis::X, "region").unwrap();
        assert!(session.set_chart_axis(ChartAxis::Y, "city").is_err());
        session.set_chart_axis(ChartAxis::Y, "population").unwrap();
        assert!(session.chart().is_ok());

        session.select_chart_type(ChartType::Pie);
        assert_eq!(session.state().chart_config.x_axis, None);

        session.select_chart_type(ChartType::Pie);
        assert_eq!(session.state().chart_config.chart_type, None);
        assert_eq!(session.state().active_view, ActiveView::Map);
    }

    #[tokio::test]
    async fn test_fit_viewport_and_map_view() {
        let mut session = sample_session();
        assert!(session.fit_viewport_to_data(1024.0, 768.0).is_err());

        session.suggest_mapping().await.unwrap();
        let fitted = session.fit_viewport_to_data(1024.0, 768.0).unwrap();
        assert_eq!(fitted, session.dataset().unwrap().len());
        assert!(session.state().viewport.zoom < 5.0);

        session.add_layer(LayerType::ScatterplotLayer).unwrap();
        assert!(matches!(session.map_view(None), Err(InsightError::MissingMapToken)));
        let view = session.map_view(Some("pk.token")).unwrap();
        assert_eq!(view.layers.len(), 1);
    }
}
