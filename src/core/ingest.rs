use crate::core::{Dataset, FileFormat, Record};
use crate::utils::error::{InsightError, Result};
use geojson::GeoJson;
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// 與上傳介面相同的 10 MB 上限
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const SAMPLE_DATA_NAME: &str = "sample-data.csv";
const SAMPLE_DATA: &str = include_str!("../../data/sample-data.csv");

const JSON_ARRAY_KEYS: [&str; 5] = ["data", "records", "rows", "items", "features"];

pub fn detect_format(name: &str) -> Result<FileFormat> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "tsv" | "txt" => Ok(FileFormat::Csv),
        "json" => Ok(FileFormat::Json),
        "geojson" => Ok(FileFormat::GeoJson),
        _ => Err(InsightError::UnsupportedFormat { extension }),
    }
}

/// 解析上傳檔案；失敗時不會產生部分資料
pub fn parse_dataset(name: &str, bytes: &[u8]) -> Result<Dataset> {
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(InsightError::FileTooLarge {
            size: bytes.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }

    let format = detect_format(name)?;
    let text = std::str::from_utf8(bytes).map_err(|e| InsightError::ParseError {
        file: name.to_string(),
        message: format!("file is not valid UTF-8: {}", e),
    })?;
    let text = text.trim_start_matches('\u{feff}');

    let dataset = match format {
        FileFormat::Csv => parse_csv(name, text)?,
        FileFormat::Json | FileFormat::GeoJson => {
            let value: Value =
                serde_json::from_str(text).map_err(|e| InsightError::ParseError {
                    file: name.to_string(),
                    message: format!("invalid JSON: {}", e),
                })?;
            if is_geojson(&value) {
                parse_geojson(name, value)?
            } else if format == FileFormat::GeoJson {
                return Err(InsightError::ParseError {
                    file: name.to_string(),
                    message: "not a GeoJSON Feature, FeatureCollection or Geometry".to_string(),
                });
            } else {
                parse_json(name, value)?
            }
        }
    };

    if dataset.is_empty() {
        return Err(InsightError::ParseError {
            file: name.to_string(),
            message: "file contains no data rows".to_string(),
        });
    }

    tracing::debug!(
        "Parsed {} ({:?}): {} rows, {} columns",
        name,
        dataset.format,
        dataset.len(),
        dataset.columns.len()
    );
    Ok(dataset)
}

pub fn sample_dataset() -> Result<Dataset> {
    parse_dataset(SAMPLE_DATA_NAME, SAMPLE_DATA.as_bytes())
}

fn parse_csv(name: &str, text: &str) -> Result<Dataset> {
    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(InsightError::ParseError {
            file: name.to_string(),
            message: "missing header row".to_string(),
        });
    }
    let columns = unique_headers(headers.iter());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        // 完全空白的列略過
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let mut data = HashMap::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let cell = row.get(index).unwrap_or("");
            data.insert(column.clone(), coerce_cell(cell));
        }
        records.push(Record { data });
    }

    Ok(Dataset {
        name: name.to_string(),
        format: FileFormat::Csv,
        columns,
        records,
    })
}

fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    if header.contains('\t') && !header.contains(',') {
        b'\t'
    } else if header.contains(';') && !header.contains(',') {
        b';'
    } else {
        b','
    }
}

/// 重複的標題加上 `_2`、`_3`…，且不會撞到其他原始標題
fn unique_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let bases: Vec<String> = headers
        .enumerate()
        .map(|(index, header)| {
            if header.is_empty() {
                format!("column_{}", index + 1)
            } else {
                header.to_string()
            }
        })
        .collect();
    let reserved: HashSet<&str> = bases.iter().map(String::as_str).collect();

    let mut emitted: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(bases.len());
    for base in &bases {
        let name = if emitted.contains(base) {
            (2..)
                .map(|n| format!("{}_{}", base, n))
                .find(|candidate| {
                    !emitted.contains(candidate) && !reserved.contains(candidate.as_str())
                })
                .unwrap_or_else(|| base.clone())
        } else {
            base.clone()
        };
        emitted.insert(name.clone());
        columns.push(name);
    }
    columns
}

/// CSV 儲存格轉換：空白→null，數字→number，true/false→bool
pub fn coerce_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if cell.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if looks_like_code(cell) {
        return Value::String(cell.to_string());
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(cell.to_string())
}

// 郵遞區號之類前導 0 的代碼保持字串
fn looks_like_code(cell: &str) -> bool {
    let digits = cell.strip_prefix('-').unwrap_or(cell);
    digits.len() > 1
        && digits.starts_with('0')
        && !digits.starts_with("0.")
        && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_geojson(value: &Value) -> bool {
    matches!(
        value.get("type").and_then(Value::as_str),
        Some(
            "FeatureCollection"
                | "Feature"
                | "Point"
                | "MultiPoint"
                | "LineString"
                | "MultiLineString"
                | "Polygon"
                | "MultiPolygon"
                | "GeometryCollection"
        )
    )
}

fn parse_json(name: &str, value: Value) -> Result<Dataset> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            let key = JSON_ARRAY_KEYS
                .iter()
                .find(|k| obj.get(**k).map(Value::is_array).unwrap_or(false))
                .map(|k| k.to_string())
                .or_else(|| {
                    obj.iter()
                        .find(|(_, v)| v.is_array())
                        .map(|(k, _)| k.clone())
                });
            match key.and_then(|k| obj.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(InsightError::ParseError {
                        file: name.to_string(),
                        message: "expected an array of objects".to_string(),
                    })
                }
            }
        }
        _ => {
            return Err(InsightError::ParseError {
                file: name.to_string(),
                message: "expected an array of objects".to_string(),
            })
        }
    };

    let mut columns: Vec<String> = Vec::new();
    let mut records = Vec::new();
    for item in items {
        if let Value::Object(obj) = item {
            for key in obj.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
            records.push(Record {
                data: obj.into_iter().collect(),
            });
        }
    }

    Ok(Dataset {
        name: name.to_string(),
        format: FileFormat::Json,
        columns,
        records,
    })
}

fn parse_geojson(name: &str, value: Value) -> Result<Dataset> {
    let geojson = GeoJson::from_json_value(value)?;
    let features: Vec<(Option<geojson::Geometry>, Option<Map<String, Value>>)> = match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .map(|f| (f.geometry, f.properties))
            .collect(),
        GeoJson::Feature(f) => vec![(f.geometry, f.properties)],
        GeoJson::Geometry(g) => vec![(Some(g), None)],
    };

    let mut columns: Vec<String> = Vec::new();
    for (_, properties) in &features {
        if let Some(props) = properties {
            for key in props.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let lon_column = synthetic_column(&columns, "longitude");
    let lat_column = synthetic_column(&columns, "latitude");
    columns.push(lon_column.clone());
    columns.push(lat_column.clone());

    let mut records = Vec::with_capacity(features.len());
    for (geometry, properties) in features {
        let mut data: HashMap<String, Value> =
            properties.unwrap_or_default().into_iter().collect();
        let point = geometry.as_ref().and_then(|g| representative_point(&g.value));
        let (lon, lat) = match point {
            Some((lon, lat)) => (number_value(lon), number_value(lat)),
            None => (Value::Null, Value::Null),
        };
        data.insert(lon_column.clone(), lon);
        data.insert(lat_column.clone(), lat);
        records.push(Record { data });
    }

    Ok(Dataset {
        name: name.to_string(),
        format: FileFormat::GeoJson,
        columns,
        records,
    })
}

fn synthetic_column(columns: &[String], base: &str) -> String {
    if columns.iter().any(|c| c == base) {
        format!("geom_{}", base)
    } else {
        base.to_string()
    }
}

fn number_value(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Point 直接使用，其它幾何取所有座標的平均
pub fn representative_point(geometry: &geojson::Value) -> Option<(f64, f64)> {
    if let geojson::Value::Point(position) = geometry {
        return (position.len() >= 2).then(|| (position[0], position[1]));
    }

    let mut positions = Vec::new();
    collect_positions(geometry, &mut positions);
    if positions.is_empty() {
        return None;
    }
    let count = positions.len() as f64;
    let (sum_lon, sum_lat) = positions
        .iter()
        .fold((0.0, 0.0), |(x, y), (lon, lat)| (x + lon, y + lat));
    Some((sum_lon / count, sum_lat / count))
}

fn collect_positions(geometry: &geojson::Value, out: &mut Vec<(f64, f64)>) {
    match geometry {
        geojson::Value::Point(p) => push_position(p, out),
        geojson::Value::MultiPoint(ps) | geojson::Value::LineString(ps) => {
            ps.iter().for_each(|p| push_position(p, out))
        }
        geojson::Value::MultiLineString(lines) | geojson::Value::Polygon(lines) => lines
            .iter()
            .flatten()
            .for_each(|p| push_position(p, out)),
        geojson::Value::MultiPolygon(polygons) => polygons
            .iter()
            .flatten()
            .flatten()
            .for_each(|p| push_position(p, out)),
        geojson::Value::GeometryCollection(geometries) => {
            for g in geometries {
                collect_positions(&g.value, out);
            }
        }
    }
}

fn push_position(position: &[f64], out: &mut Vec<(f64, f64)>) {
    if position.len() >= 2 {
        out.push((position[0], position[1]));
    }
}
