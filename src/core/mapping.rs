use crate::core::schema::coerce_number;
use crate::core::{ColumnMapping, ColumnType, ColumnTypes, Dataset, GeoPoint, MappingRole};
use crate::utils::error::{InsightError, Result};

const LATITUDE_NAMES: &[&str] = &["latitude", "lat", "y", "y_coord", "latitude_deg", "lat_num"];
const LONGITUDE_NAMES: &[&str] = &[
    "longitude",
    "lon",
    "lng",
    "long",
    "x",
    "x_coord",
    "longitude_deg",
    "long_num",
];
const VALUE_NAMES: &[&str] = &[
    "value",
    "metric",
    "population",
    "magnitude",
    "mag",
    "size",
    "count",
    "amount",
    "price",
];
const CATEGORY_NAMES: &[&str] = &["category", "type", "group", "class", "name", "label", "id"];

/// 依欄位名稱猜測對應（AI 停用或失敗時使用）
pub fn heuristic_mapping(columns: &[String], types: &ColumnTypes) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let mut taken: Vec<String> = Vec::new();

    for role in MappingRole::ALL {
        let candidates = candidate_names(role);
        let accepts = |column: &str| role_accepts(role, types.get(column));
        let chosen = find_by_name(columns, candidates, &taken, &accepts).or_else(|| match role {
            MappingRole::Value => first_of_type(columns, types, ColumnType::Number, &taken),
            MappingRole::Category => first_of_type(columns, types, ColumnType::String, &taken),
            _ => None,
        });

        if let Some(column) = chosen {
            taken.push(column.clone());
            mapping.set(role, Some(column));
        }
    }

    mapping
}

fn candidate_names(role: MappingRole) -> &'static [&'static str] {
    match role {
        MappingRole::Latitude => LATITUDE_NAMES,
        MappingRole::Longitude => LONGITUDE_NAMES,
        MappingRole::Value => VALUE_NAMES,
        MappingRole::Category => CATEGORY_NAMES,
    }
}

// 型別未知時不設限
fn role_accepts(role: MappingRole, column_type: Option<&ColumnType>) -> bool {
    match (role, column_type) {
        (_, None) => true,
        (_, Some(ColumnType::Empty)) => false,
        (MappingRole::Latitude | MappingRole::Longitude | MappingRole::Value, Some(t)) => {
            *t == ColumnType::Number
        }
        (MappingRole::Category, Some(_)) => true,
    }
}

fn find_by_name(
    columns: &[String],
    candidates: &[&str],
    taken: &[String],
    accepts: &dyn Fn(&str) -> bool,
) -> Option<String> {
    let available = || {
        columns
            .iter()
            .filter(|c| !taken.contains(c))
            .filter(|c| accepts(c.as_str()))
    };

    // 先找完全相同，再找名稱片段
    for candidate in candidates {
        if let Some(column) = available().find(|c| c.eq_ignore_ascii_case(candidate)) {
            return Some(column.clone());
        }
    }
    for candidate in candidates {
        if let Some(column) = available().find(|c| name_tokens(c).iter().any(|t| t == candidate)) {
            return Some(column.clone());
        }
    }
    None
}

fn first_of_type(
    columns: &[String],
    types: &ColumnTypes,
    wanted: ColumnType,
    taken: &[String],
) -> Option<String> {
    columns
        .iter()
        .filter(|c| !taken.contains(c))
        .find(|c| types.get(*c) == Some(&wanted))
        .cloned()
}

/// "pickupLat" → ["pickup", "lat"], "Y_COORD" → ["y", "coord"]
fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if ch.is_ascii_uppercase() && previous_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        previous_lower = ch.is_ascii_lowercase();
        current.push(ch.to_ascii_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// 修補 AI 給的對應：未知欄位設為 null，同一欄位只保留優先角色
pub fn repair_mapping(raw: &ColumnMapping, columns: &[String]) -> ColumnMapping {
    let mut repaired = ColumnMapping::default();
    let mut used: Vec<String> = Vec::new();

    for role in MappingRole::ALL {
        let Some(suggested) = raw.get(role) else {
            continue;
        };
        match resolve_column(suggested, columns) {
            Some(column) if !used.contains(&column) => {
                used.push(column.clone());
                repaired.set(role, Some(column));
            }
            Some(column) => {
                tracing::debug!("Dropping duplicate mapping of '{}' to {}", column, role.as_str());
            }
            None => {
                tracing::debug!(
                    "Dropping unknown column '{}' suggested for {}",
                    suggested,
                    role.as_str()
                );
            }
        }
    }

    repaired
}

fn resolve_column(name: &str, columns: &[String]) -> Option<String> {
    if let Some(exact) = columns.iter().find(|c| c.as_str() == name) {
        return Some(exact.clone());
    }
    let mut matches = columns.iter().filter(|c| c.eq_ignore_ascii_case(name.trim()));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

/// 確認每個角色指向的欄位都存在
pub fn validate_mapping(mapping: &ColumnMapping, columns: &[String]) -> Result<()> {
    for role in MappingRole::ALL {
        if let Some(column) = mapping.get(role) {
            if !columns.iter().any(|c| c == column) {
                return Err(InsightError::UnknownColumn {
                    column: column.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointExtraction {
    pub points: Vec<GeoPoint>,
    pub skipped: usize,
}

pub fn extract_points(dataset: &Dataset, mapping: &ColumnMapping) -> Result<PointExtraction> {
    let (Some(lat_column), Some(lon_column)) = (mapping.latitude.as_deref(), mapping.longitude.as_deref())
    else {
        let missing: Vec<&str> = mapping
            .missing_spatial_roles()
            .iter()
            .map(MappingRole::as_str)
            .collect();
        return Err(InsightError::MappingIncomplete {
            missing: missing.join(", "),
        });
    };

    let mut extraction = PointExtraction::default();
    for (row, record) in dataset.records.iter().enumerate() {
        let lat = record.get(lat_column).and_then(coerce_number);
        let lon = record.get(lon_column).and_then(coerce_number);
        match (lat, lon) {
            (Some(lat), Some(lon)) if lat.abs() <= 90.0 && lon.abs() <= 180.0 => {
                let value = mapping
                    .value
                    .as_deref()
                    .and_then(|column| record.get(column))
                    .and_then(coerce_number);
                extraction.points.push(GeoPoint { lon, lat, value, row });
            }
            _ => extraction.skipped += 1,
        }
    }

    if extraction.skipped > 0 {
        tracing::warn!(
            "⚠️ Skipped {} rows with missing or out-of-range coordinates",
            extraction.skipped
        );
    }
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::parse_dataset;
    use crate::core::schema::infer_column_types;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_heuristic_mapping_common_names() {
        let csv = "Station Name,LAT,lng,magnitude,type\nA,1,2,3.5,quake\n";
        let dataset = parse_dataset("q.csv", csv.as_bytes()).unwrap();
        let types = infer_column_types(&dataset);

        let mapping = heuristic_mapping(&dataset.columns, &types);
        assert_eq!(mapping.latitude.as_deref(), Some("LAT"));
        assert_eq!(mapping.longitude.as_deref(), Some("lng"));
        assert_eq!(mapping.value.as_deref(), Some("magnitude"));
        assert_eq!(mapping.category.as_deref(), Some("type"));
    }

    #[test]
    fn test_heuristic_mapping_tokens_and_fallbacks() {
        let csv = "pickupLat,pickup_long,fare,zone\n40.1,-73.9,12.5,Midtown\n";
        let dataset = parse_dataset("taxi.csv", csv.as_bytes()).unwrap();
        let types = infer_column_types(&dataset);

        let mapping = heuristic_mapping(&dataset.columns, &types);
        assert_eq!(mapping.latitude.as_deref(), Some("pickupLat"));
        assert_eq!(mapping.longitude.as_deref(), Some("pickup_long"));
        assert_eq!(mapping.value.as_deref(), Some("fare"));
        assert_eq!(mapping.category.as_deref(), Some("zone"));
    }

    #[test]
    fn test_heuristic_mapping_requires_numeric_coordinates() {
        let csv = "lat,lon\nnorth,west\n";
        let dataset = parse_dataset("bad.csv", csv.as_bytes()).unwrap();
        let types = infer_column_types(&dataset);

        let mapping = heuristic_mapping(&dataset.columns, &types);
        assert!(!mapping.has_lat_lng());
        assert_eq!(mapping.category.as_deref(), Some("lat"));
    }

    #[test]
    fn test_repair_mapping_drops_unknown_and_duplicates() {
        let raw = ColumnMapping {
            latitude: Some("Latitude".to_string()),
            longitude: Some("lon".to_string()),
            value: Some("lon".to_string()),
            category: Some("does_not_exist".to_string()),
        };
        let repaired = repair_mapping(&raw, &columns(&["latitude", "lon", "pop"]));

        assert_eq!(repaired.latitude.as_deref(), Some("latitude"));
        assert_eq!(repaired.longitude.as_deref(), Some("lon"));
        assert_eq!(repaired.value, None);
        assert_eq!(repaired.category, None);
    }

    #[test]
    fn test_validate_mapping_unknown_column() {
        let mapping = ColumnMapping {
            value: Some("ghost".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_mapping(&mapping, &columns(&["a"])),
            Err(InsightError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_extract_points_skips_bad_rows() {
        let csv = "lat,lon,v\n10,20,1\n95,20,2\n,20,3\nabc,1,4\n-5,170,x\n";
        let dataset = parse_dataset("p.csv", csv.as_bytes()).unwrap();
        let mapping = ColumnMapping {
            latitude: Some("lat".to_string()),
            longitude: Some("lon".to_string()),
            value: Some("v".to_string()),
            category: None,
        };

        let extraction = extract_points(&dataset, &mapping).unwrap();
        assert_eq!(extraction.points.len(), 2);
        assert_eq!(extraction.skipped, 3);
        assert_eq!(extraction.points[0].value, Some(1.0));
        assert_eq!(extraction.points[1].value, None);
        assert_eq!(extraction.points[1].row, 4);
    }

    #[test]
    fn test_extract_points_requires_lat_lng() {
        let dataset = parse_dataset("p.csv", b"lat,lon\n1,2\n").unwrap();
        let mapping = ColumnMapping {
            latitude: Some("lat".to_string()),
            ..Default::default()
        };
        let err = extract_points(&dataset, &mapping).unwrap_err();
        assert!(matches!(err, InsightError::MappingIncomplete { missing } if missing == "longitude"));
    }
}
