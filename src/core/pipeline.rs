use crate::ai::build_provider;
use crate::core::aggregate::{aggregate_layer, AggregationInput};
use crate::core::ingest::{parse_dataset, sample_dataset};
use crate::core::mapping::PointExtraction;
use crate::core::schema::category_key;
use crate::core::session::Session;
use crate::core::viewport::DEFAULT_CANVAS;
use crate::core::{
    ChartOutput, ColumnMapping, ConfigProvider, Dataset, InsightResult, LayerOutput, MapView,
    Pipeline, Storage, SuggestionProvider,
};
use crate::utils::error::{InsightError, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use zip::write::{FileOptions, ZipWriter};

pub struct InsightPipeline<S: Storage, C: ConfigProvider> {
    source: S,
    sink: S,
    config: C,
    provider: Arc<dyn SuggestionProvider>,
}

impl<S: Storage, C: ConfigProvider> InsightPipeline<S, C> {
    /// 依設定選擇遠端模型或內建規則
    pub fn new(source: S, sink: S, config: C) -> Result<Self> {
        let provider = build_provider(config.ai_settings())?;
        Ok(Self::with_provider(source, sink, config, provider))
    }

    pub fn with_provider(
        source: S,
        sink: S,
        config: C,
        provider: Arc<dyn SuggestionProvider>,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            provider,
        }
    }
}

/// 正規化後的點：lat, lon, value, category
pub fn points_csv(
    dataset: &Dataset,
    mapping: &ColumnMapping,
    extraction: &PointExtraction,
) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["lat", "lon", "value", "category"])?;

    for point in &extraction.points {
        let category = mapping
            .category
            .as_deref()
            .and_then(|column| dataset.records.get(point.row)?.get(column))
            .and_then(category_key)
            .unwrap_or_default();
        writer.write_record([
            point.lat.to_string(),
            point.lon.to_string(),
            point.value.map(|v| v.to_string()).unwrap_or_default(),
            category,
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| InsightError::ProcessingError {
        message: format!("failed to finish points.csv: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| InsightError::ProcessingError {
        message: format!("points.csv is not valid UTF-8: {}", e),
    })
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for InsightPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        match self.config.input_path() {
            Some(path) => {
                tracing::debug!("Reading input file: {}", path);
                let bytes = self.source.read_file(path).await?;
                let name = Path::new(path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(path);
                parse_dataset(name, &bytes)
            }
            None => {
                tracing::info!("📎 No input file given, loading sample data");
                sample_dataset()
            }
        }
    }

    async fn transform(&self, dataset: Dataset) -> Result<InsightResult> {
        let mut warnings: Vec<String> = Vec::new();
        let mut session = Session::with_debounce(
            Arc::clone(&self.provider),
            Duration::from_millis(self.config.suggestion_debounce_ms()),
        );
        tracing::debug!("Suggestions provided by: {}", session.provider_name());

        session.load_dataset(dataset);
        let map_settings = self.config.map_settings();
        session.set_base_map(map_settings.base_map);

        // 欄位對應：建議後再套用使用者指定
        session.suggest_mapping().await?;
        let overrides = self.config.mapping_overrides();
        if !overrides.is_empty() {
            let merged = session.state().mapping.merge_overrides(&overrides);
            session.set_mapping(merged)?;
        }

        match self.config.project_name() {
            Some(name) => session.set_project_name(name),
            None => {
                session.suggest_project_name().await;
            }
        }

        session.refresh_layer_suggestions().await;

        let requested = self.config.requested_layers();
        if !requested.is_empty() {
            for request in &requested {
                session.add_layer_with_overrides(request.layer_type, &request.overrides)?;
            }
        } else if session.state().mapping.has_lat_lng() {
            for index in 0..session.state().layer_suggestions.len() {
                session.add_suggested_layer(index)?;
            }
        }

        let extraction = if session.state().mapping.has_lat_lng() {
            session.points()?
        } else {
            warnings.push(
                "Latitude and longitude columns are not mapped, no map layers were built"
                    .to_string(),
            );
            PointExtraction::default()
        };
        if extraction.skipped > 0 {
            warnings.push(format!(
                "Skipped {} rows with missing or out-of-range coordinates",
                extraction.skipped
            ));
        }

        if map_settings.fit_to_data && !extraction.points.is_empty() {
            session.fit_viewport_to_data(DEFAULT_CANVAS.0, DEFAULT_CANVAS.1)?;
        }

        // 單一圖層設定壞掉只略過該圖層
        let mut layer_outputs: Vec<LayerOutput> = Vec::new();
        if let Some(dataset) = session.dataset() {
            let input = AggregationInput {
                dataset,
                mapping: &session.state().mapping,
                points: &extraction.points,
                viewport: &session.state().viewport,
            };
            for layer in session.layers() {
                match aggregate_layer(layer, &input) {
                    Ok(output) => layer_outputs.push(output),
                    Err(e) => {
                        tracing::warn!("⚠️ Layer {} skipped: {}", layer.id, e);
                        warnings.push(format!(
                            "Layer {}: {}",
                            layer.id,
                            e.user_friendly_message()
                        ));
                    }
                }
            }
        }

        let chart: Option<ChartOutput> = match self.config.chart_config() {
            Some(chart_config) => {
                match session
                    .configure_chart(&chart_config)
                    .and_then(|_| session.chart())
                {
                    Ok(chart) => Some(chart),
                    Err(e) => {
                        tracing::warn!("⚠️ Chart skipped: {}", e);
                        warnings.push(format!("Chart: {}", e.user_friendly_message()));
                        None
                    }
                }
            }
            None => None,
        };

        let map_view: Option<MapView> = match session.map_view(map_settings.access_token.as_deref())
        {
            Ok(view) => Some(view),
            Err(e) => {
                tracing::warn!("⚠️ {}", e.user_friendly_message());
                warnings.push(format!("Configuration Error: {}", e.user_friendly_message()));
                None
            }
        };

        let insights = if self.config.generate_insights() {
            session.explain_insights().await
        } else {
            None
        };

        if let Some(failure) = &session.state().ai_error {
            warnings.push(format!(
                "AI module failure in {}: {}",
                failure.source, failure.message
            ));
        }

        let points_csv = match session.dataset() {
            Some(dataset) => points_csv(dataset, &session.state().mapping, &extraction)?,
            None => String::new(),
        };

        Ok(InsightResult {
            snapshot: session.snapshot(),
            layer_outputs,
            chart,
            map_view,
            insights,
            points_csv,
            warnings,
        })
    }

    async fn load(&self, result: InsightResult) -> Result<String> {
        let archive_name = self.config.archive_name();
        let output_path = format!("{}/{}", self.config.output_path(), archive_name);

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("project.json", FileOptions::default())?;
            zip.write_all(serde_json::to_string_pretty(&result.snapshot)?.as_bytes())?;

            zip.start_file::<_, ()>("points.csv", FileOptions::default())?;
            zip.write_all(result.points_csv.as_bytes())?;

            for output in &result.layer_outputs {
                let name = format!("layers/{}.geojson", output.layer_id);
                zip.start_file::<_, ()>(name, FileOptions::default())?;
                zip.write_all(serde_json::to_string_pretty(&output.features)?.as_bytes())?;
            }

            if let Some(chart) = &result.chart {
                zip.start_file::<_, ()>("chart.json", FileOptions::default())?;
                zip.write_all(serde_json::to_string_pretty(chart)?.as_bytes())?;
            }

            if let Some(map_view) = &result.map_view {
                zip.start_file::<_, ()>("map.json", FileOptions::default())?;
                zip.write_all(serde_json::to_string_pretty(map_view)?.as_bytes())?;
            }

            if let Some(insights) = &result.insights {
                zip.start_file::<_, ()>("insights.md", FileOptions::default())?;
                let body = format!("# {}\n\n{}\n", result.snapshot.project_name, insights);
                zip.write_all(body.as_bytes())?;
            }

            if !result.warnings.is_empty() {
                zip.start_file::<_, ()>("warnings.txt", FileOptions::default())?;
                zip.write_all(result.warnings.join("\n").as_bytes())?;
            }

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.sink.write_file(archive_name, &zip_data).await?;
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::HeuristicAdvisor;
    use crate::core::{AiSettings, ChartConfig, ChartType, LayerRequest, LayerType, MapSettings};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn put(&self, path: &str, data: &[u8]) {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                InsightError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockConfig {
        input: Option<String>,
        project_name: Option<String>,
        overrides: ColumnMapping,
        layers: Vec<LayerRequest>,
        chart: Option<ChartConfig>,
        map: MapSettings,
        insights: bool,
    }

    impl ConfigProvider for MockConfig {
        fn input_path(&self) -> Option<&str> {
            self.input.as_deref()
        }
        fn output_path(&self) -> &str {
            "out"
        }
        fn archive_name(&self) -> &str {
            "insight.zip"
        }
        fn project_name(&self) -> Option<&str> {
            self.project_name.as_deref()
        }
        fn ai_settings(&self) -> Option<AiSettings> {
            None
        }
        fn suggestion_debounce_ms(&self) -> u64 {
            0
        }
        fn mapping_overrides(&self) -> ColumnMapping {
            self.overrides.clone()
        }
        fn requested_layers(&self) -> Vec<LayerRequest> {
            self.layers.clone()
        }
        fn chart_config(&self) -> Option<ChartConfig> {
            self.chart.clone()
        }
        fn map_settings(&self) -> MapSettings {
            self.map.clone()
        }
        fn generate_insights(&self) -> bool {
            self.insights
        }
    }

    fn pipeline(config: MockConfig) -> (InsightPipeline<MockStorage, MockConfig>, MockStorage, MockStorage) {
        let source = MockStorage::new();
        let sink = MockStorage::new();
        let pipeline = InsightPipeline::new(source.clone(), sink.clone(), config).unwrap();
        (pipeline, source, sink)
    }

    fn zip_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_sample_run_without_ai() {
        let (pipeline, _, sink) = pipeline(MockConfig::default());

        let dataset = pipeline.extract().await.unwrap();
        assert_eq!(dataset.len(), 32);

        let result = pipeline.transform(dataset).await.unwrap();
        assert_eq!(result.snapshot.project_name, "Sample Data Map");
        assert_eq!(result.layer_outputs.len(), 3);
        assert_eq!(result.layer_outputs[0].layer_type, LayerType::ScatterplotLayer);
        assert!(result.map_view.is_none());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("Configuration Error")));
        assert!(result.points_csv.starts_with("lat,lon,value,category\n40.7128,-74.006,8336817,New York"));

        let path = pipeline.load(result).await.unwrap();
        assert_eq!(path, "out/insight.zip");

        let names = zip_names(sink.get_file("insight.zip").await.unwrap());
        assert!(names.contains(&"project.json".to_string()));
        assert!(names.contains(&"points.csv".to_string()));
        assert!(names.contains(&"warnings.txt".to_string()));
        assert_eq!(names.iter().filter(|n| n.starts_with("layers/")).count(), 3);
        assert!(!names.contains(&"map.json".to_string()));
    }

    #[tokio::test]
    async fn test_requested_layers_chart_and_token() {
        let config = MockConfig {
            input: Some("data/quakes.csv".to_string()),
            project_name: Some("Quakes".to_string()),
            overrides: ColumnMapping {
                value: Some("mag".to_string()),
                ..Default::default()
            },
            layers: vec![LayerRequest::new(LayerType::ColumnLayer)],
            chart: Some(ChartConfig {
                chart_type: Some(ChartType::Histogram),
                x_axis: Some("mag".to_string()),
                y_axis: None,
            }),
            map: MapSettings {
                access_token: Some("pk.test".to_string()),
                fit_to_data: true,
                ..Default::default()
            },
            insights: true,
        };
        let (pipeline, source, sink) = pipeline(config);
        source
            .put(
                "data/quakes.csv",
                b"place,lat,lon,depth,mag\nA,35.1,-117.5,10,4.2\nB,36.0,-118.0,5,5.1\nC,,,3,2.0\n",
            )
            .await;

        let dataset = pipeline.extract().await.unwrap();
        assert_eq!(dataset.name, "quakes.csv");

        let result = pipeline.transform(dataset).await.unwrap();
        assert_eq!(result.snapshot.project_name, "Quakes");
        assert_eq!(result.snapshot.mapping.value.as_deref(), Some("mag"));
        assert_eq!(result.layer_outputs.len(), 1);
        assert_eq!(result.layer_outputs[0].layer_type, LayerType::ColumnLayer);
        assert!(result.map_view.is_some());
        assert!(result.chart.is_some());
        assert!(result.insights.is_some());
        assert!(result.warnings.iter().any(|w| w.contains("Skipped 1 rows")));
        assert!(result.snapshot.viewport.zoom > 4.0);

        pipeline.load(result).await.unwrap();
        let names = zip_names(sink.get_file("insight.zip").await.unwrap());
        for expected in ["map.json", "chart.json", "insights.md"] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_broken_layer_config_becomes_warning() {
        let mut hexagon = LayerRequest::new(LayerType::HexagonLayer);
        hexagon.overrides.set("radius", serde_json::json!(0));
        let config = MockConfig {
            layers: vec![LayerRequest::new(LayerType::ScatterplotLayer), hexagon],
            ..Default::default()
        };
        let (pipeline, _, _) = pipeline(config);

        let dataset = pipeline.extract().await.unwrap();
        let result = pipeline.transform(dataset).await.unwrap();

        assert_eq!(result.layer_outputs.len(), 1);
        assert_eq!(result.layer_outputs[0].layer_type, LayerType::ScatterplotLayer);
        assert_eq!(result.snapshot.layers.len(), 2);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("Layer ") && w.contains("radius")));
    }

    #[tokio::test]
    async fn test_with_provider_and_unknown_override() {
        let config = MockConfig {
            overrides: ColumnMapping {
                category: Some("ghost".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = InsightPipeline::with_provider(
            MockStorage::new(),
            MockStorage::new(),
            config,
            Arc::new(HeuristicAdvisor::new()),
        );
        let dataset = pipeline.extract().await.unwrap();
        assert!(matches!(
            pipeline.transform(dataset).await,
            Err(InsightError::UnknownColumn { .. })
        ));
    }
}
