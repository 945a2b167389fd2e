//! 送給生成式模型的提示文字。回應一律要求 JSON。

use crate::core::{InsightRequest, LayerSuggestionRequest};

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| format!("{:?}", items))
}

fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("(none)")
}

pub fn column_mapping(columns: &[String]) -> String {
    format!(
        r#"You are an expert data analyst specializing in geographic data. Your task is to automatically identify the most likely columns for latitude, longitude, a numerical value (metric), and a category from a given list of column names.

Analyze the following column names:
{columns}

Guidelines for mapping:
- Latitude: Look for names like 'latitude', 'lat', 'y', 'y_coord', 'latitude_deg'.
- Longitude: Look for names like 'longitude', 'lon', 'long', 'x', 'x_coord', 'longitude_deg'.
- Value/Metric: Prefer numerical columns that are not latitude or longitude. Look for names like 'value', 'metric', 'population', 'magnitude', 'size', 'count', 'amount', 'price'.
- Category: Prefer columns with string/text data that could be used for grouping. Look for names like 'category', 'type', 'group', 'class', 'name', 'label', 'id'.

Return a JSON object with your suggested mappings for 'latitude', 'longitude', 'value', and 'category'. If no suitable column is found for a specific mapping, its value should be null. Do not map the same column to multiple fields. Prioritize latitude and longitude mappings."#,
        columns = json_list(columns)
    )
}

pub fn lat_lng(columns: &[String]) -> String {
    format!(
        r#"You are an expert data analyst specializing in geospatial data.
Your task is to identify the latitude and longitude columns from a given list of column names.

Column Names: {columns}

Analyze the column names and determine which one likely represents latitude and which one represents longitude.
Common names for latitude include 'lat', 'latitude', 'y', 'lat_num'.
Common names for longitude include 'lon', 'long', 'longitude', 'x', 'long_num'.

Return a JSON object with the fields 'latitude' and 'longitude'. If you cannot confidently identify one or both, return null for the respective field."#,
        columns = json_list(columns)
    )
}

pub fn layer_suggestions(request: &LayerSuggestionRequest) -> String {
    let column_types =
        serde_json::to_string(&request.column_types).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are an expert in data visualization using Deck.GL.

Based on the following data column types and mappings, suggest up to 3 suitable Deck.GL layer types and initial configurations. Provide a rationale for each suggestion.

Column Types: {column_types}
Column Names: {column_names}
Mapped Latitude Column: {lat}
Mapped Longitude Column: {lng}
Mapped Value Column: {value}
Mapped Category Column: {category}

Guidelines:
- If latitude and longitude are present, ScatterplotLayer is almost always a good primary choice.
- If a 'value' column is mapped, consider layers that use it for aggregation or magnitude, like HeatmapLayer or HexagonLayer.
- HexagonLayer is good for showing density of points in an area.
- HeatmapLayer shows intensity or density as a smooth color gradient.
- If a 'value' is present and represents magnitude at a point (not for aggregation), ColumnLayer is great for showing this in 3D.
- ScatterplotLayer can use the 'value' for radius and the 'category' for color.
- Only suggest layers that are appropriate for the provided mappings. For example, do not suggest ColumnLayer or HeatmapLayer if there is no mapped 'value' column.

Available Layer Types:
- ScatterplotLayer
- HexagonLayer
- HeatmapLayer
- ColumnLayer

Return an array of layer suggestions. Each suggestion must include:
1. 'layerType': A valid Deck.GL layer name from the available list.
2. 'initialConfiguration': A JSON object with sensible default settings. This MUST include 'opacity' (set to 0.8) and a color configuration. For ScatterplotLayer, include radius settings. For HexagonLayer, include 'radius' and 'elevationScale'. For HeatmapLayer, include 'radiusPixels' and 'intensity'. For ColumnLayer, include 'radius' and a 'getFillColor'.
3. 'rationale': A short, concise explanation for why the layer is a good fit.

The output must be a valid JSON array. If no suggestions can be made, return an empty array."#,
        column_types = column_types,
        column_names = json_list(&request.column_names),
        lat = or_none(request.mapped_latitude.as_deref()),
        lng = or_none(request.mapped_longitude.as_deref()),
        value = or_none(request.mapped_value.as_deref()),
        category = or_none(request.mapped_category.as_deref()),
    )
}

pub fn project_name(data_description: &str) -> String {
    format!(
        r#"You are an expert project naming assistant. Given a description of the data that will be visualized in a project, suggest a concise and relevant name for the project.

Data Description: {data_description}

Return a JSON object with a single field 'projectName'."#
    )
}

pub fn data_insights(request: &InsightRequest) -> String {
    format!(
        r#"You are an expert data analyst tasked with summarizing the key insights from a spatial data visualization.

Based on the provided dataset description, visualization details, and chart summaries, generate a concise textual summary of the most important trends and findings.

Dataset Description: {dataset}
Visualization Description: {visualization}
Chart Summaries: {charts}

Return a JSON object with a single field 'summary'."#,
        dataset = request.dataset_description,
        visualization = request.visualization_description,
        charts = request.chart_summaries,
    )
}
