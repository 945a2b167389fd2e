//! 點圖層計算：把對應好的點轉成地圖畫布可直接繪製的 GeoJSON。
//!
//! 所有分箱都在 Web Mercator 公尺座標上進行，輸出再轉回 WGS84。

use crate::core::layers::CLASSIC_RAMP;
use crate::core::schema::category_key;
use crate::core::viewport::{meters_per_pixel, project, unproject};
use crate::core::{
    ColumnMapping, Dataset, GeoPoint, LayerConfig, LayerOutput, LayerSpec, LayerType, Rgb, Rgba,
    Viewport,
};
use crate::utils::error::{InsightError, Result};
use geojson::{Feature, FeatureCollection, Geometry};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::f64::consts::PI;

/// deck.gl 預設的 elevationRange 上限
const ELEVATION_RANGE_MAX: f64 = 1000.0;

const CATEGORY_PALETTE: [Rgba; 10] = [
    [31, 119, 180, 180],
    [255, 127, 14, 180],
    [44, 160, 44, 180],
    [214, 39, 40, 180],
    [148, 103, 189, 180],
    [140, 86, 75, 180],
    [227, 119, 194, 180],
    [127, 127, 127, 180],
    [188, 189, 34, 180],
    [23, 190, 207, 180],
];

/// 輸入給各圖層計算的共同資料
pub struct AggregationInput<'a> {
    pub dataset: &'a Dataset,
    pub mapping: &'a ColumnMapping,
    pub points: &'a [GeoPoint],
    pub viewport: &'a Viewport,
}

pub fn aggregate_layer(layer: &LayerSpec, input: &AggregationInput<'_>) -> Result<LayerOutput> {
    let features = match layer.layer_type {
        LayerType::ScatterplotLayer => scatterplot(&layer.config, input),
        LayerType::HexagonLayer => hexagon(&layer.config, input)?,
        LayerType::ScreenGridLayer => screen_grid(&layer.config, input)?,
        LayerType::HeatmapLayer => heatmap(&layer.config, input)?,
        LayerType::ColumnLayer => columns(&layer.config, input),
    };

    tracing::debug!(
        "Layer {} produced {} features from {} points",
        layer.id,
        features.len(),
        input.points.len()
    );

    let mut layer_meta = Map::new();
    layer_meta.insert("layer".to_string(), serde_json::to_value(layer)?);

    Ok(LayerOutput {
        layer_id: layer.id.clone(),
        layer_type: layer.layer_type,
        input_points: input.points.len(),
        features: FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(layer_meta),
        },
    })
}

fn feature(geometry: geojson::Value, properties: Map<String, Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn record_properties(dataset: &Dataset, row: usize) -> Map<String, Value> {
    let mut properties = Map::new();
    if let Some(record) = dataset.records.get(row) {
        for column in &dataset.columns {
            let value = record.data.get(column).cloned().unwrap_or(Value::Null);
            properties.insert(column.clone(), value);
        }
    }
    properties
}

fn positive(config: &LayerConfig, key: &str, default: f64) -> Result<f64> {
    let value = config.number_or(key, default);
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(InsightError::LayerError {
            message: format!("'{}' must be a positive number, got {}", key, value),
        })
    }
}

fn ramp(config: &LayerConfig) -> Vec<Rgb> {
    config
        .color_range("colorRange")
        .unwrap_or_else(|| CLASSIC_RAMP.to_vec())
}

/// quantize：等寬切分值域；值域退化時取最後一色
pub fn quantize_color(value: f64, min: f64, max: f64, ramp: &[Rgb]) -> Rgb {
    let last = ramp.len().saturating_sub(1);
    if ramp.is_empty() {
        return [0, 0, 0];
    }
    if max <= min {
        return ramp[last];
    }
    let index = (((value - min) / (max - min)) * ramp.len() as f64).floor() as usize;
    ramp[index.min(last)]
}

/// 在相鄰兩個色階之間逐通道線性內插
fn linear_color(normalized: f64, ramp: &[Rgb]) -> Rgb {
    let Some(last) = ramp.len().checked_sub(1) else {
        return [0, 0, 0];
    };
    let position = normalized.clamp(0.0, 1.0) * last as f64;
    let lower = (position.floor() as usize).min(last);
    let upper = (position.ceil() as usize).min(last);
    let t = position - lower as f64;

    let mut color = [0u8; 3];
    for (channel, out) in color.iter_mut().enumerate() {
        let from = ramp[lower][channel] as f64;
        let to = ramp[upper][channel] as f64;
        *out = (from + (to - from) * t).round().clamp(0.0, 255.0) as u8;
    }
    color
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        (value - min) / (max - min)
    } else {
        1.0
    }
}

fn scatterplot(config: &LayerConfig, input: &AggregationInput<'_>) -> Vec<Feature> {
    let radius_scale = config.number_or("radiusScale", 1.0);
    let fill = config.rgba("getFillColor").unwrap_or([255, 140, 0, 180]);
    let line = config.rgba("getLineColor").unwrap_or([0, 0, 0, 255]);
    let opacity = config.number_or("opacity", 1.0);

    let mut category_colors: HashMap<String, Rgba> = HashMap::new();
    let category_column = input.mapping.category.as_deref();

    input
        .points
        .iter()
        .map(|p| {
            let color = category_column
                .and_then(|column| input.dataset.records.get(p.row)?.get(column))
                .and_then(category_key)
                .map(|key| {
                    let next = category_colors.len();
                    *category_colors
                        .entry(key)
                        .or_insert(CATEGORY_PALETTE[next % CATEGORY_PALETTE.len()])
                })
                .unwrap_or(fill);

            let radius = match p.value {
                Some(v) if input.mapping.value.is_some() => radius_scale * v.abs().sqrt(),
                _ => radius_scale,
            };

            let mut properties = record_properties(input.dataset, p.row);
            properties.insert(
                "style".to_string(),
                json!({
                    "fillColor": color,
                    "lineColor": line,
                    "radius": radius,
                    "opacity": opacity,
                }),
            );
            feature(geojson::Value::Point(vec![p.lon, p.lat]), properties)
        })
        .collect()
}

/// d3-hexbin 的尖頂六角格座標
pub fn hexbin_index(x: f64, y: f64, radius: f64) -> (i64, i64) {
    let dx = radius * 2.0 * (PI / 3.0).sin();
    let dy = radius * 1.5;

    let py = y / dy;
    let mut pj = js_round(py);
    let px = x / dx - odd(pj) / 2.0;
    let mut pi = js_round(px);
    let py1 = py - pj;

    if py1.abs() * 3.0 > 1.0 {
        let px1 = px - pi;
        let pi2 = pi + (if px < pi { -1.0 } else { 1.0 }) / 2.0;
        let pj2 = pj + if py < pj { -1.0 } else { 1.0 };
        let px2 = px - pi2;
        let py2 = py - pj2;
        if px1 * px1 + py1 * py1 > px2 * px2 + py2 * py2 {
            pi = pi2 + (if odd(pj) == 1.0 { 1.0 } else { -1.0 }) / 2.0;
            pj = pj2;
        }
    }

    (pi as i64, pj as i64)
}

pub fn hexbin_center(index: (i64, i64), radius: f64) -> (f64, f64) {
    let dx = radius * 2.0 * (PI / 3.0).sin();
    let dy = radius * 1.5;
    let (pi, pj) = (index.0 as f64, index.1 as f64);
    ((pi + odd(pj) / 2.0) * dx, pj * dy)
}

fn js_round(v: f64) -> f64 {
    (v + 0.5).floor()
}

fn odd(v: f64) -> f64 {
    ((v as i64) & 1) as f64
}

fn hexagon_ring(center: (f64, f64), radius: f64) -> Vec<Vec<f64>> {
    let mut ring: Vec<Vec<f64>> = (0..6)
        .map(|k| {
            let angle = k as f64 * PI / 3.0;
            let (lon, lat) = unproject(
                center.0 + radius * angle.sin(),
                center.1 + radius * angle.cos(),
            );
            vec![lon, lat]
        })
        .collect();
    ring.push(ring[0].clone());
    ring
}

fn square_ring(min_x: f64, min_y: f64, size: f64) -> Vec<Vec<f64>> {
    [
        (min_x, min_y),
        (min_x + size, min_y),
        (min_x + size, min_y + size),
        (min_x, min_y + size),
        (min_x, min_y),
    ]
    .iter()
    .map(|(x, y)| {
        let (lon, lat) = unproject(*x, *y);
        vec![lon, lat]
    })
    .collect()
}

#[derive(Debug, Default, Clone, Copy)]
struct Bin {
    count: usize,
    value_sum: f64,
}

impl Bin {
    fn add(&mut self, point: &GeoPoint) {
        self.count += 1;
        self.value_sum += point.value.unwrap_or(0.0);
    }

    fn weight(&self, by_value: bool) -> f64 {
        if by_value {
            self.value_sum
        } else {
            self.count as f64
        }
    }
}

fn sorted_bins(bins: HashMap<(i64, i64), Bin>) -> Vec<((i64, i64), Bin)> {
    let mut bins: Vec<_> = bins.into_iter().collect();
    bins.sort_by_key(|((i, j), _)| (*j, *i));
    bins
}

fn hexagon(config: &LayerConfig, input: &AggregationInput<'_>) -> Result<Vec<Feature>> {
    let radius = positive(config, "radius", 1000.0)?;
    let elevation_scale = config.number_or("elevationScale", 1.0);
    let extruded = config.bool_or("extruded", false);
    let colors = ramp(config);
    let by_value = input.mapping.value.is_some();

    let mut bins: HashMap<(i64, i64), Bin> = HashMap::new();
    for p in input.points {
        let (x, y) = project(p.lon, p.lat);
        bins.entry(hexbin_index(x, y, radius)).or_default().add(p);
    }
    let bins = sorted_bins(bins);
    let (min_w, max_w) = min_max(bins.iter().map(|(_, b)| b.weight(by_value)));

    Ok(bins
        .into_iter()
        .map(|(index, bin)| {
            let center = hexbin_center(index, radius);
            let (lon, lat) = unproject(center.0, center.1);
            let weight = bin.weight(by_value);

            let mut properties = Map::new();
            properties.insert("count".to_string(), json!(bin.count));
            if by_value {
                properties.insert("valueSum".to_string(), json!(bin.value_sum));
            }
            properties.insert("weight".to_string(), json!(weight));
            properties.insert("position".to_string(), json!([lon, lat]));
            properties.insert(
                "color".to_string(),
                json!(quantize_color(weight, min_w, max_w, &colors)),
            );
            if extruded {
                let elevation =
                    normalize(weight, min_w, max_w) * ELEVATION_RANGE_MAX * elevation_scale;
                properties.insert("elevation".to_string(), json!(elevation));
            }
            feature(
                geojson::Value::Polygon(vec![hexagon_ring(center, radius)]),
                properties,
            )
        })
        .collect())
}

fn screen_grid(config: &LayerConfig, input: &AggregationInput<'_>) -> Result<Vec<Feature>> {
    let cell_pixels = positive(config, "cellSizePixels", 100.0)?;
    let cell = cell_pixels * meters_per_pixel(input.viewport.zoom);
    let colors = ramp(config);
    let by_value = input.mapping.value.is_some();

    let mut bins: HashMap<(i64, i64), Bin> = HashMap::new();
    for p in input.points {
        let (x, y) = project(p.lon, p.lat);
        let key = ((x / cell).floor() as i64, (y / cell).floor() as i64);
        bins.entry(key).or_default().add(p);
    }
    let bins = sorted_bins(bins);
    let (min_w, max_w) = min_max(bins.iter().map(|(_, b)| b.weight(by_value)));

    Ok(bins
        .into_iter()
        .map(|((i, j), bin)| {
            let weight = bin.weight(by_value);
            let mut properties = Map::new();
            properties.insert("count".to_string(), json!(bin.count));
            properties.insert("weight".to_string(), json!(weight));
            properties.insert(
                "color".to_string(),
                json!(quantize_color(weight, min_w, max_w, &colors)),
            );
            feature(
                geojson::Value::Polygon(vec![square_ring(i as f64 * cell, j as f64 * cell, cell)]),
                properties,
            )
        })
        .collect())
}

fn heatmap(config: &LayerConfig, input: &AggregationInput<'_>) -> Result<Vec<Feature>> {
    let radius_pixels = positive(config, "radiusPixels", 50.0)?;
    let intensity = config.number_or("intensity", 1.0);
    let threshold = config.number_or("threshold", 0.05);
    let colors = ramp(config);

    let radius = radius_pixels * meters_per_pixel(input.viewport.zoom);
    let cell = radius / 4.0;
    let sigma = radius / 3.0;
    let reach = (radius / cell).ceil() as i64;

    let mut density: HashMap<(i64, i64), f64> = HashMap::new();
    for p in input.points {
        let weight = match (input.mapping.value.as_ref(), p.value) {
            (Some(_), Some(v)) => v.max(0.0),
            (Some(_), None) => 0.0,
            (None, _) => 1.0,
        };
        if weight == 0.0 {
            continue;
        }

        let (x, y) = project(p.lon, p.lat);
        let (ci, cj) = ((x / cell).floor() as i64, (y / cell).floor() as i64);
        for i in (ci - reach)..=(ci + reach) {
            for j in (cj - reach)..=(cj + reach) {
                let cx = (i as f64 + 0.5) * cell;
                let cy = (j as f64 + 0.5) * cell;
                let d2 = (cx - x).powi(2) + (cy - y).powi(2);
                if d2 <= radius * radius {
                    *density.entry((i, j)).or_insert(0.0) +=
                        weight * (-d2 / (2.0 * sigma * sigma)).exp();
                }
            }
        }
    }

    let max_density = density.values().fold(0.0_f64, |m, v| m.max(*v * intensity));
    if max_density <= 0.0 {
        return Ok(Vec::new());
    }

    let mut cells: Vec<((i64, i64), f64)> = density
        .into_iter()
        .map(|(key, d)| (key, d * intensity / max_density))
        .filter(|(_, normalized)| *normalized >= threshold)
        .collect();
    cells.sort_by_key(|((i, j), _)| (*j, *i));

    Ok(cells
        .into_iter()
        .map(|((i, j), normalized)| {
            let mut properties = Map::new();
            properties.insert("density".to_string(), json!(normalized));
            properties.insert("color".to_string(), json!(linear_color(normalized, &colors)));
            feature(
                geojson::Value::Polygon(vec![square_ring(i as f64 * cell, j as f64 * cell, cell)]),
                properties,
            )
        })
        .collect())
}

fn columns(config: &LayerConfig, input: &AggregationInput<'_>) -> Vec<Feature> {
    let elevation_scale = config.number_or("elevationScale", 1.0);
    let radius = config.number_or("radius", 1000.0);
    let disk_resolution = config.number_or("diskResolution", 20.0);
    let fill = config.rgba("getFillColor").unwrap_or([255, 0, 255, 255]);

    if input.mapping.value.is_none() {
        tracing::warn!("⚠️ ColumnLayer without a value column, all columns will be flat");
    }

    input
        .points
        .iter()
        .map(|p| {
            let mut properties = record_properties(input.dataset, p.row);
            properties.insert(
                "style".to_string(),
                json!({
                    "fillColor": fill,
                    "radius": radius,
                    "diskResolution": disk_resolution,
                    "elevation": p.value.unwrap_or(0.0) * elevation_scale,
                }),
            );
            feature(geojson::Value::Point(vec![p.lon, p.lat]), properties)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::parse_dataset;
    use crate::core::layers::default_config;
    use crate::core::mapping::extract_points;

    fn fixture(csv: &str, with_value: bool) -> (Dataset, ColumnMapping) {
        let dataset = parse_dataset("t.csv", csv.as_bytes()).unwrap();
        let mapping = ColumnMapping {
            latitude: Some("lat".to_string()),
            longitude: Some("lon".to_string()),
            value: with_value.then(|| "v".to_string()),
            category: Some("kind".to_string()),
        };
        (dataset, mapping)
    }

    fn run(layer_type: LayerType, config: LayerConfig, csv: &str, with_value: bool) -> LayerOutput {
        let (dataset, mapping) = fixture(csv, with_value);
        let points = extract_points(&dataset, &mapping).unwrap().points;
        let viewport = Viewport::default();
        let layer = LayerSpec {
            id: "test".to_string(),
            layer_type,
            config,
        };
        aggregate_layer(
            &layer,
            &AggregationInput {
                dataset: &dataset,
                mapping: &mapping,
                points: &points,
                viewport: &viewport,
            },
        )
        .unwrap()
    }

    const CLUSTER: &str = "lat,lon,v,kind\n40.0,-74.0,4,a\n40.0001,-74.0001,9,b\n40.0002,-74.0,1,a\n10.0,10.0,16,c\n";

    #[test]
    fn test_hexbin_center_contains_point() {
        let radius = 1000.0;
        for (x, y) in [(0.0, 0.0), (1234.5, -987.6), (-5000.0, 7321.0), (866.0, 750.0)] {
            let center = hexbin_center(hexbin_index(x, y, radius), radius);
            let distance = ((center.0 - x).powi(2) + (center.1 - y).powi(2)).sqrt();
            assert!(distance <= radius + 1e-6, "({}, {}) -> {:?}", x, y, center);
        }
    }

    #[test]
    fn test_quantize_color() {
        let ramp = [[0, 0, 0], [1, 1, 1], [2, 2, 2]];
        assert_eq!(quantize_color(0.0, 0.0, 3.0, &ramp), [0, 0, 0]);
        assert_eq!(quantize_color(1.5, 0.0, 3.0, &ramp), [1, 1, 1]);
        assert_eq!(quantize_color(3.0, 0.0, 3.0, &ramp), [2, 2, 2]);
        assert_eq!(quantize_color(5.0, 5.0, 5.0, &ramp), [2, 2, 2]);
    }

    #[test]
    fn test_linear_color_blends_neighbouring_stops() {
        let ramp = [[0, 0, 0], [100, 200, 50], [200, 0, 250]];
        assert_eq!(linear_color(0.0, &ramp), [0, 0, 0]);
        assert_eq!(linear_color(0.25, &ramp), [50, 100, 25]);
        assert_eq!(linear_color(0.5, &ramp), [100, 200, 50]);
        assert_eq!(linear_color(0.75, &ramp), [150, 100, 150]);
        assert_eq!(linear_color(1.0, &ramp), [200, 0, 250]);
        assert_eq!(linear_color(0.4, &[[10, 20, 30]]), [10, 20, 30]);
        assert_eq!(linear_color(0.4, &[]), [0, 0, 0]);
    }

    #[test]
    fn test_hexagon_bins_points() {
        let output = run(
            LayerType::HexagonLayer,
            default_config(LayerType::HexagonLayer),
            CLUSTER,
            false,
        );
        assert_eq!(output.input_points, 4);
        assert_eq!(output.features.features.len(), 2);

        let counts: Vec<u64> = output
            .features
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["count"].as_u64().unwrap())
            .collect();
        assert_eq!(counts.iter().sum::<u64>(), 4);
        assert!(counts.contains(&3));

        let dense = output
            .features
            .features
            .iter()
            .find(|f| f.properties.as_ref().unwrap()["count"] == json!(3))
            .unwrap();
        let props = dense.properties.as_ref().unwrap();
        assert_eq!(props["elevation"], json!(4000.0));
        assert_eq!(props["color"], json!([189, 0, 38]));
        assert!(output.features.foreign_members.as_ref().unwrap().contains_key("layer"));
    }

    #[test]
    fn test_hexagon_weights_by_value() {
        let output = run(
            LayerType::HexagonLayer,
            default_config(LayerType::HexagonLayer),
            CLUSTER,
            true,
        );
        let weights: Vec<f64> = output
            .features
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["weight"].as_f64().unwrap())
            .collect();
        assert!(weights.contains(&14.0));
        assert!(weights.contains(&16.0));
    }

    #[test]
    fn test_hexagon_rejects_non_positive_radius() {
        let (dataset, mapping) = fixture(CLUSTER, false);
        let points = extract_points(&dataset, &mapping).unwrap().points;
        let mut config = default_config(LayerType::HexagonLayer);
        config.set("radius", json!(0));
        let layer = LayerSpec {
            id: "hex".to_string(),
            layer_type: LayerType::HexagonLayer,
            config,
        };
        let viewport = Viewport::default();
        let result = aggregate_layer(
            &layer,
            &AggregationInput {
                dataset: &dataset,
                mapping: &mapping,
                points: &points,
                viewport: &viewport,
            },
        );
        assert!(matches!(result, Err(InsightError::LayerError { .. })));
    }

    #[test]
    fn test_screen_grid_counts() {
        let output = run(
            LayerType::ScreenGridLayer,
            default_config(LayerType::ScreenGridLayer),
            CLUSTER,
            false,
        );
        let total: u64 = output
            .features
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["count"].as_u64().unwrap())
            .sum();
        assert_eq!(total, 4);
        assert_eq!(output.features.features.len(), 2);
    }

    #[test]
    fn test_heatmap_normalizes_and_thresholds() {
        let output = run(
            LayerType::HeatmapLayer,
            default_config(LayerType::HeatmapLayer),
            CLUSTER,
            false,
        );
        let densities: Vec<f64> = output
            .features
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["density"].as_f64().unwrap())
            .collect();
        assert!(!densities.is_empty());
        assert!(densities.iter().all(|d| *d >= 0.03 && *d <= 1.0 + 1e-12));
        assert!(densities.iter().any(|d| (*d - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_scatterplot_colors_by_category() {
        let output = run(
            LayerType::ScatterplotLayer,
            default_config(LayerType::ScatterplotLayer),
            CLUSTER,
            true,
        );
        let features = &output.features.features;
        assert_eq!(features.len(), 4);

        let style = |i: usize| features[i].properties.as_ref().unwrap()["style"].clone();
        assert_eq!(style(0)["fillColor"], style(2)["fillColor"]);
        assert_ne!(style(0)["fillColor"], style(1)["fillColor"]);
        assert_eq!(style(3)["radius"], json!(24.0));
        assert_eq!(features[0].properties.as_ref().unwrap()["kind"], json!("a"));
    }

    #[test]
    fn test_column_elevation() {
        let mut config = default_config(LayerType::ColumnLayer);
        config.set("elevationScale", json!(10));
        let output = run(LayerType::ColumnLayer, config, CLUSTER, true);
        let style = &output.features.features[1].properties.as_ref().unwrap()["style"];
        assert_eq!(style["elevation"], json!(90.0));
        assert_eq!(style["radius"], json!(2500.0));
    }
}
