use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 上傳資料中的一列，欄位型別不固定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column).filter(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
    GeoJson,
}

/// 最近一次成功解析的檔案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub format: FileFormat,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    String,
    Boolean,
    Empty,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Number => "number",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::Empty => "empty",
        };
        f.write_str(name)
    }
}

pub type ColumnTypes = BTreeMap<String, ColumnType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingRole {
    Latitude,
    Longitude,
    Value,
    Category,
}

impl MappingRole {
    /// 優先順序：經緯度先
    pub const ALL: [MappingRole; 4] = [
        MappingRole::Latitude,
        MappingRole::Longitude,
        MappingRole::Value,
        MappingRole::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingRole::Latitude => "latitude",
            MappingRole::Longitude => "longitude",
            MappingRole::Value => "value",
            MappingRole::Category => "category",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub value: Option<String>,
    pub category: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, role: MappingRole) -> Option<&str> {
        match role {
            MappingRole::Latitude => self.latitude.as_deref(),
            MappingRole::Longitude => self.longitude.as_deref(),
            MappingRole::Value => self.value.as_deref(),
            MappingRole::Category => self.category.as_deref(),
        }
    }

    pub fn set(&mut self, role: MappingRole, column: Option<String>) {
        let slot = match role {
            MappingRole::Latitude => &mut self.latitude,
            MappingRole::Longitude => &mut self.longitude,
            MappingRole::Value => &mut self.value,
            MappingRole::Category => &mut self.category,
        };
        *slot = column;
    }

    pub fn has_lat_lng(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn missing_spatial_roles(&self) -> Vec<MappingRole> {
        [MappingRole::Latitude, MappingRole::Longitude]
            .into_iter()
            .filter(|role| self.get(*role).is_none())
            .collect()
    }

    /// 使用者明確指定的欄位優先於建議
    pub fn merge_overrides(&self, overrides: &ColumnMapping) -> ColumnMapping {
        let mut merged = self.clone();
        for role in MappingRole::ALL {
            if let Some(column) = overrides.get(role) {
                // 同一欄位不可對應兩個角色
                for other in MappingRole::ALL {
                    if other != role && merged.get(other) == Some(column) {
                        merged.set(other, None);
                    }
                }
                merged.set(role, Some(column.to_string()));
            }
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        MappingRole::ALL.iter().all(|role| self.get(*role).is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    ScatterplotLayer,
    HeatmapLayer,
    HexagonLayer,
    ScreenGridLayer,
    ColumnLayer,
}

impl LayerType {
    pub const ALL: [LayerType; 5] = [
        LayerType::ScatterplotLayer,
        LayerType::HeatmapLayer,
        LayerType::HexagonLayer,
        LayerType::ScreenGridLayer,
        LayerType::ColumnLayer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::ScatterplotLayer => "ScatterplotLayer",
            LayerType::HeatmapLayer => "HeatmapLayer",
            LayerType::HexagonLayer => "HexagonLayer",
            LayerType::ScreenGridLayer => "ScreenGridLayer",
            LayerType::ColumnLayer => "ColumnLayer",
        }
    }

    /// 接受 "HexagonLayer"、"hexagon"、"screen-grid" 等寫法
    pub fn parse(name: &str) -> Option<LayerType> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let normalized = normalized.strip_suffix("layer").unwrap_or(&normalized);
        match normalized {
            "scatterplot" | "scatter" => Some(LayerType::ScatterplotLayer),
            "heatmap" => Some(LayerType::HeatmapLayer),
            "hexagon" | "hex" => Some(LayerType::HexagonLayer),
            "screengrid" | "grid" => Some(LayerType::ScreenGridLayer),
            "column" => Some(LayerType::ColumnLayer),
            _ => None,
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Rgba = [u8; 4];
pub type Rgb = [u8; 3];

/// 圖層的選項袋（free-form JSON）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerConfig(pub Map<String, Value>);

impl LayerConfig {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn rgba(&self, key: &str) -> Option<Rgba> {
        let items = self.0.get(key)?.as_array()?;
        color_channels(items).map(|c| [c[0], c[1], c[2], c.get(3).copied().unwrap_or(255)])
    }

    pub fn color_range(&self, key: &str) -> Option<Vec<Rgb>> {
        let ramp = self.0.get(key)?.as_array()?;
        let colors: Vec<Rgb> = ramp
            .iter()
            .filter_map(|c| c.as_array().and_then(|items| color_channels(items)))
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        if colors.is_empty() {
            None
        } else {
            Some(colors)
        }
    }

    /// 淺層合併
    pub fn merge(&mut self, patch: &LayerConfig) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

fn color_channels(items: &[Value]) -> Option<Vec<u8>> {
    if items.len() < 3 {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_f64().map(|n| n.clamp(0.0, 255.0).round() as u8))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub config: LayerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSuggestion {
    #[serde(rename = "layerType")]
    pub layer_type: LayerType,
    #[serde(rename = "initialConfiguration")]
    pub initial_configuration: LayerConfig,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
    pub padding: Padding,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            longitude: -98.5795,
            latitude: 39.8283,
            zoom: 4.0,
            pitch: 0.0,
            bearing: 0.0,
            padding: Padding {
                top: 20.0,
                bottom: 20.0,
                left: 20.0,
                right: 20.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseMap {
    #[default]
    Dark,
    Light,
}

impl BaseMap {
    pub fn style_url(&self) -> &'static str {
        match self {
            BaseMap::Dark => "mapbox://styles/mapbox/dark-v11",
            BaseMap::Light => "mapbox://styles/mapbox/light-v11",
        }
    }

    pub fn parse(name: &str) -> Option<BaseMap> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(BaseMap::Dark),
            "light" => Some(BaseMap::Light),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Map,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
    Summary,
}

impl ChartType {
    pub fn parse(name: &str) -> Option<ChartType> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartType::Bar),
            "line" => Some(ChartType::Line),
            "pie" => Some(ChartType::Pie),
            "scatter" => Some(ChartType::Scatter),
            "histogram" => Some(ChartType::Histogram),
            "summary" => Some(ChartType::Summary),
            _ => None,
        }
    }

    /// histogram 與 summary 只需要 x 軸
    pub fn needs_y_axis(&self) -> bool {
        !matches!(self, ChartType::Histogram | ChartType::Summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartAxis {
    #[serde(rename = "xAxis")]
    X,
    #[serde(rename = "yAxis")]
    Y,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: Option<ChartType>,
    #[serde(rename = "xAxis")]
    pub x_axis: Option<String>,
    #[serde(rename = "yAxis")]
    pub y_axis: Option<String>,
}

/// AI 模組失敗時顯示的阻擋式提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFailure {
    pub message: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
    pub value: Option<f64>,
    pub row: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerOutput {
    pub layer_id: String,
    pub layer_type: LayerType,
    pub input_points: usize,
    pub features: geojson::FeatureCollection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDatum {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: Value,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "lowercase")]
pub enum ChartData {
    Categories(Vec<CategoryDatum>),
    Series(Vec<SeriesPoint>),
    Histogram(Vec<HistogramBin>),
    Summary(SummaryStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartOutput {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    #[serde(rename = "xAxis")]
    pub x_axis: String,
    #[serde(rename = "yAxis")]
    pub y_axis: Option<String>,
    pub data: ChartData,
}

/// 交給地圖畫布的內容（不含 token 本身）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub style_url: String,
    pub base_map: BaseMap,
    pub viewport: Viewport,
    pub layers: Vec<LayerSpec>,
}

/// 不含資料列的專案狀態快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSnapshot {
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub source: Option<String>,
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    pub columns: Vec<String>,
    #[serde(rename = "columnTypes")]
    pub column_types: ColumnTypes,
    #[serde(rename = "mappedColumns")]
    pub mapping: ColumnMapping,
    pub layers: Vec<LayerSpec>,
    #[serde(rename = "layerSuggestions")]
    pub layer_suggestions: Vec<LayerSuggestion>,
    pub viewport: Viewport,
    #[serde(rename = "baseMap")]
    pub base_map: BaseMap,
    #[serde(rename = "chartConfig")]
    pub chart_config: ChartConfig,
    #[serde(rename = "activeView")]
    pub active_view: ActiveView,
    #[serde(rename = "aiError")]
    pub ai_error: Option<AiFailure>,
}

#[derive(Debug, Clone)]
pub struct InsightResult {
    pub snapshot: ProjectSnapshot,
    pub layer_outputs: Vec<LayerOutput>,
    pub chart: Option<ChartOutput>,
    pub map_view: Option<MapView>,
    pub insights: Option<String>,
    pub points_csv: String,
    pub warnings: Vec<String>,
}
