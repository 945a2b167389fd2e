use crate::core::{ColumnMapping, LayerConfig, LayerSpec, LayerSuggestion, LayerType, Rgb, Rgba};
use crate::utils::error::{InsightError, Result};
use serde_json::{json, Value};

pub const DEFAULT_OPACITY: f64 = 0.8;

pub const FILL_COLOR_OPTIONS: [(&str, Rgba); 4] = [
    ("Orange", [255, 140, 0, 180]),
    ("Blue", [50, 130, 255, 180]),
    ("Green", [0, 200, 100, 180]),
    ("Purple", [138, 43, 226, 180]),
];

pub const CLASSIC_RAMP: &[Rgb] = &[
    [255, 255, 178],
    [254, 217, 118],
    [254, 178, 76],
    [253, 141, 60],
    [240, 59, 32],
    [189, 0, 38],
];

pub const VIRIDIS_RAMP: &[Rgb] = &[
    [68, 1, 84],
    [72, 40, 120],
    [62, 74, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [109, 205, 89],
    [180, 222, 44],
    [253, 231, 37],
];

pub const MAGMA_RAMP: &[Rgb] = &[
    [0, 0, 3],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 128],
    [181, 54, 122],
    [229, 81, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

pub const BLUES_RAMP: &[Rgb] = &[
    [247, 251, 255],
    [222, 235, 247],
    [198, 219, 239],
    [158, 202, 225],
    [107, 174, 214],
    [66, 146, 198],
    [33, 113, 181],
    [8, 81, 156],
    [8, 48, 107],
];

pub const COLOR_RAMPS: [(&str, &[Rgb]); 4] = [
    ("Classic", CLASSIC_RAMP),
    ("Viridis", VIRIDIS_RAMP),
    ("Magma", MAGMA_RAMP),
    ("Blues", BLUES_RAMP),
];

pub fn fill_color(name: &str) -> Option<Rgba> {
    FILL_COLOR_OPTIONS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, c)| *c)
}

pub fn color_ramp(name: &str) -> Option<&'static [Rgb]> {
    COLOR_RAMPS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, r)| *r)
}

fn ramp_value(ramp: &[Rgb]) -> Value {
    Value::Array(ramp.iter().map(|c| json!(c)).collect())
}

/// 每種圖層新增時的預設設定
pub fn default_config(layer_type: LayerType) -> LayerConfig {
    let value = match layer_type {
        LayerType::ScatterplotLayer => json!({
            "opacity": DEFAULT_OPACITY,
            "stroked": true,
            "filled": true,
            "radiusScale": 6,
            "radiusMinPixels": 3,
            "radiusMaxPixels": 100,
            "lineWidthMinPixels": 1,
            "getFillColor": [255, 140, 0, 180],
            "getLineColor": [0, 0, 0],
        }),
        LayerType::HeatmapLayer => json!({
            "opacity": DEFAULT_OPACITY,
            "intensity": 1,
            "threshold": 0.03,
            "radiusPixels": 30,
            "colorRange": ramp_value(CLASSIC_RAMP),
        }),
        LayerType::HexagonLayer => json!({
            "opacity": DEFAULT_OPACITY,
            "extruded": true,
            "radius": 2000,
            "elevationScale": 4,
        }),
        LayerType::ScreenGridLayer => json!({
            "opacity": DEFAULT_OPACITY,
            "cellSizePixels": 40,
            "colorRange": ramp_value(CLASSIC_RAMP),
        }),
        LayerType::ColumnLayer => json!({
            "opacity": DEFAULT_OPACITY,
            "diskResolution": 12,
            "radius": 2500,
            "extruded": true,
            "getFillColor": [255, 140, 0, 180],
        }),
    };

    match value {
        Value::Object(map) => LayerConfig(map),
        _ => LayerConfig::default(),
    }
}

/// "ScatterplotLayer" → "Scatterplot Layer"
pub fn display_name(layer_type: LayerType) -> String {
    layer_type.as_str().replace("Layer", " Layer")
}

/// 目前地圖上的圖層
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerStack {
    layers: Vec<LayerSpec>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn get(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn contains_type(&self, layer_type: LayerType) -> bool {
        self.layers.iter().any(|l| l.layer_type == layer_type)
    }

    /// 需要先對應經緯度欄位
    pub fn add(&mut self, layer_type: LayerType, mapping: &ColumnMapping) -> Result<&LayerSpec> {
        self.add_with_config(layer_type, default_config(layer_type), mapping)
    }

    pub fn add_with_config(
        &mut self,
        layer_type: LayerType,
        config: LayerConfig,
        mapping: &ColumnMapping,
    ) -> Result<&LayerSpec> {
        if !mapping.has_lat_lng() {
            return Err(InsightError::MappingIncomplete {
                missing: mapping
                    .missing_spatial_roles()
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let id = self.next_id(layer_type);
        tracing::info!("➕ Added {} ({})", display_name(layer_type), id);
        self.layers.push(LayerSpec {
            id,
            layer_type,
            config,
        });
        Ok(&self.layers[self.layers.len() - 1])
    }

    /// 同類型圖層已存在時不可再加入建議
    pub fn add_suggested(
        &mut self,
        suggestion: &LayerSuggestion,
        mapping: &ColumnMapping,
    ) -> Result<&LayerSpec> {
        if self.contains_type(suggestion.layer_type) {
            return Err(InsightError::LayerError {
                message: format!("a {} has already been added", display_name(suggestion.layer_type)),
            });
        }
        self.add_with_config(
            suggestion.layer_type,
            suggestion.initial_configuration.clone(),
            mapping,
        )
    }

    pub fn remove(&mut self, id: &str) -> Result<LayerSpec> {
        let index = self.index_of(id)?;
        let removed = self.layers.remove(index);
        tracing::info!("🗑️ Removed layer {}", removed.id);
        Ok(removed)
    }

    pub fn update_config(&mut self, id: &str, patch: &LayerConfig) -> Result<()> {
        let index = self.index_of(id)?;
        self.layers[index].config.merge(patch);
        Ok(())
    }

    /// 0..=1，步進 0.01
    pub fn set_opacity(&mut self, id: &str, opacity: f64) -> Result<()> {
        if !opacity.is_finite() {
            return Err(InsightError::LayerError {
                message: format!("invalid opacity {}", opacity),
            });
        }
        let stepped = (opacity.clamp(0.0, 1.0) * 100.0).round() / 100.0;
        let index = self.index_of(id)?;
        self.layers[index].config.set("opacity", json!(stepped));
        Ok(())
    }

    pub fn set_fill_color(&mut self, id: &str, palette_name: &str) -> Result<()> {
        let color = fill_color(palette_name).ok_or_else(|| InsightError::LayerError {
            message: format!("unknown fill color '{}'", palette_name),
        })?;
        let index = self.index_of(id)?;
        let layer = &mut self.layers[index];
        if !layer.config.contains("getFillColor") {
            return Err(InsightError::LayerError {
                message: format!("{} has no fill color", display_name(layer.layer_type)),
            });
        }
        layer.config.set("getFillColor", json!(color));
        Ok(())
    }

    pub fn set_color_range(&mut self, id: &str, ramp_name: &str) -> Result<()> {
        let ramp = color_ramp(ramp_name).ok_or_else(|| InsightError::LayerError {
            message: format!("unknown color ramp '{}'", ramp_name),
        })?;
        let index = self.index_of(id)?;
        let layer = &mut self.layers[index];
        if !layer.config.contains("colorRange") {
            return Err(InsightError::LayerError {
                message: format!("{} has no color ramp", display_name(layer.layer_type)),
            });
        }
        layer.config.set("colorRange", ramp_value(ramp));
        Ok(())
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| InsightError::LayerError {
                message: format!("layer '{}' not found", id),
            })
    }

    fn next_id(&self, layer_type: LayerType) -> String {
        let base = format!(
            "{}-{}",
            layer_type.as_str().to_lowercase(),
            chrono::Utc::now().timestamp_millis()
        );
        if self.get(&base).is_none() {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if self.get(&candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }
}
