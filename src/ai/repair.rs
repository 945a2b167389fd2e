//! 模型回應的淺層修補。只處理形狀，不驗證語意。

use crate::core::layers::{default_config, DEFAULT_OPACITY};
use crate::core::{
    ColumnMapping, LatLngSuggestion, LayerConfig, LayerSuggestion, LayerType, MappingRole,
};
use serde_json::{json, Map, Value};

pub const MAX_LAYER_SUGGESTIONS: usize = 3;

/// 去掉 code fence 與前後說明文字，取出第一段 JSON
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = strip_fences(text.trim());
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find(['{', '['])?;
    let closing = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(closing)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // ```json\n...\n```
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn unwrap_object<'a>(value: &'a Value, wrappers: &[&str]) -> Option<&'a Map<String, Value>> {
    let object = value.as_object()?;
    for key in wrappers {
        if let Some(inner) = object.get(*key).and_then(Value::as_object) {
            return Some(inner);
        }
    }
    Some(object)
}

pub fn parse_mapping(value: &Value) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let Some(object) = unwrap_object(value, &["mapping", "mappings", "mappedColumns"]) else {
        return mapping;
    };
    for role in MappingRole::ALL {
        mapping.set(role, non_empty_string(object.get(role.as_str())));
    }
    mapping
}

pub fn parse_lat_lng(value: &Value) -> LatLngSuggestion {
    let mapping = parse_mapping(value);
    LatLngSuggestion {
        latitude: mapping.latitude,
        longitude: mapping.longitude,
    }
}

/// 字串本身，或物件中的指定欄位
pub fn parse_text_field(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::String(_) => non_empty_string(Some(value)),
        Value::Object(object) => non_empty_string(object.get(key)),
        _ => None,
    }
}

/// 接受陣列、{suggestions: [...]}、{layers: [...]} 或單一物件
pub fn parse_layer_suggestions(value: &Value) -> Vec<LayerSuggestion> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(object) => match ["suggestions", "layers", "layerSuggestions"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
        {
            Some(items) => items.iter().collect(),
            None => vec![value],
        },
        _ => Vec::new(),
    };

    items.into_iter().filter_map(parse_layer_suggestion).collect()
}

fn parse_layer_suggestion(item: &Value) -> Option<LayerSuggestion> {
    let object = item.as_object()?;
    let first = |keys: &[&str]| keys.iter().find_map(|k| object.get(*k));

    let type_name = first(&["layerType", "layer_type", "type"])?.as_str()?;
    let Some(layer_type) = LayerType::parse(type_name) else {
        tracing::debug!("Dropping suggestion with unknown layer type '{}'", type_name);
        return None;
    };

    let config = first(&["initialConfiguration", "initial_configuration", "config"])
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let rationale = first(&["rationale", "reason"])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(LayerSuggestion {
        layer_type,
        initial_configuration: LayerConfig(config),
        rationale,
    })
}

/// 經緯度已對應時強制放在第一位的預設建議
pub fn fallback_layer_suggestion() -> LayerSuggestion {
    LayerSuggestion {
        layer_type: LayerType::ScatterplotLayer,
        initial_configuration: default_config(LayerType::ScatterplotLayer),
        rationale: "Plots every row as a point at its coordinates, a reliable starting view for any point dataset."
            .to_string(),
    }
}

fn needs_value(layer_type: LayerType) -> bool {
    matches!(layer_type, LayerType::HeatmapLayer | LayerType::ColumnLayer)
}

/// 預設為正數的尺寸欄位，模型給了零、負數或非數字就退回預設
fn restore_positive_defaults(config: &mut LayerConfig, defaults: &LayerConfig) {
    for (key, default) in &defaults.0 {
        if !default.as_f64().is_some_and(|d| d > 0.0) {
            continue;
        }
        let usable = config.number(key).is_some_and(|v| v.is_finite() && v > 0.0);
        if !usable {
            tracing::debug!("Replacing unusable '{}' in suggested config", key);
            config.set(key, default.clone());
        }
    }
}

pub fn normalize_layer_suggestions(
    suggestions: Vec<LayerSuggestion>,
    mapping: &ColumnMapping,
) -> Vec<LayerSuggestion> {
    let mut normalized: Vec<LayerSuggestion> = Vec::new();

    for suggestion in suggestions {
        if normalized.iter().any(|s| s.layer_type == suggestion.layer_type) {
            continue;
        }
        if needs_value(suggestion.layer_type) && mapping.value.is_none() {
            tracing::debug!(
                "Dropping {} suggestion, no value column is mapped",
                suggestion.layer_type
            );
            continue;
        }

        let defaults = default_config(suggestion.layer_type);
        let mut config = defaults.clone();
        config.merge(&suggestion.initial_configuration);
        restore_positive_defaults(&mut config, &defaults);
        config.set("opacity", json!(DEFAULT_OPACITY));
        normalized.push(LayerSuggestion {
            initial_configuration: config,
            ..suggestion
        });
    }

    if mapping.has_lat_lng() {
        match normalized
            .iter()
            .position(|s| s.layer_type == LayerType::ScatterplotLayer)
        {
            Some(0) => {}
            Some(index) => {
                let scatter = normalized.remove(index);
                normalized.insert(0, scatter);
            }
            None => normalized.insert(0, fallback_layer_suggestion()),
        }
    }

    normalized.truncate(MAX_LAYER_SUGGESTIONS);
    normalized
}
