use crate::core::{ColumnType, ColumnTypes, Dataset};
use serde_json::Value;

pub fn infer_column_types(dataset: &Dataset) -> ColumnTypes {
    dataset
        .columns
        .iter()
        .map(|column| {
            let values = dataset.records.iter().filter_map(|r| r.get(column));
            (column.clone(), infer_type(values))
        })
        .collect()
}

fn infer_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut seen_any = false;
    let mut all_numeric = true;
    let mut all_bool = true;

    for value in values {
        seen_any = true;
        all_numeric &= coerce_number(value).is_some();
        all_bool &= value.is_boolean();
        if !all_numeric && !all_bool {
            return ColumnType::String;
        }
    }

    if !seen_any {
        ColumnType::Empty
    } else if all_numeric {
        ColumnType::Number
    } else {
        ColumnType::Boolean
    }
}

/// 數字或可解析為數字的字串
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// 圖表分類用的字串鍵；null 與空字串不算
pub fn category_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn numeric_columns(columns: &[String], types: &ColumnTypes) -> Vec<String> {
    columns
        .iter()
        .filter(|c| types.get(*c) == Some(&ColumnType::Number))
        .cloned()
        .collect()
}

pub fn categorical_columns(columns: &[String], types: &ColumnTypes) -> Vec<String> {
    columns
        .iter()
        .filter(|c| types.get(*c) != Some(&ColumnType::Number))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::parse_dataset;
    use serde_json::json;

    #[test]
    fn test_infer_column_types() {
        let csv = "name,lat,flag,blank,mixed\nA,1.5,true,,1\nB,2,false,,x\n";
        let dataset = parse_dataset("t.csv", csv.as_bytes()).unwrap();
        let types = infer_column_types(&dataset);

        assert_eq!(types["name"], ColumnType::String);
        assert_eq!(types["lat"], ColumnType::Number);
        assert_eq!(types["flag"], ColumnType::Boolean);
        assert_eq!(types["blank"], ColumnType::Empty);
        assert_eq!(types["mixed"], ColumnType::String);
    }

    #[test]
    fn test_numeric_strings_count_as_numbers() {
        let body = json!([{"v": "12.5"}, {"v": 3}]);
        let dataset = parse_dataset("t.json", body.to_string().as_bytes()).unwrap();
        assert_eq!(infer_column_types(&dataset)["v"], ColumnType::Number);
    }

    #[test]
    fn test_column_filters() {
        let columns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut types = ColumnTypes::new();
        types.insert("a".to_string(), ColumnType::Number);
        types.insert("b".to_string(), ColumnType::String);
        types.insert("c".to_string(), ColumnType::Boolean);

        assert_eq!(numeric_columns(&columns, &types), vec!["a"]);
        assert_eq!(categorical_columns(&columns, &types), vec!["b", "c"]);
    }

    #[test]
    fn test_coerce_number_and_category_key() {
        assert_eq!(coerce_number(&json!(" 4.25 ")), Some(4.25));
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!(true)), None);
        assert_eq!(category_key(&json!("")), None);
        assert_eq!(category_key(&json!(7)), Some("7".to_string()));
    }
}
