use geo_insight::utils::error::{ErrorSeverity, InsightError};
use geo_insight::{CliConfig, InsightEngine, InsightPipeline, LocalStorage};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::io::Read;
use tempfile::TempDir;

const QUAKES_CSV: &str = "\
latitude,longitude,mag,place
35.68,139.69,5.1,Tokyo
-33.45,-70.66,6.3,Santiago
61.22,-149.90,4.4,Anchorage
-41.29,174.78,5.8,Wellington
";

fn gemini_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

fn base_config(output_path: &str) -> CliConfig {
    CliConfig {
        input: None,
        output_path: output_path.to_string(),
        archive_name: "geo_insight.zip".to_string(),
        project_name: None,
        ai_endpoint: "https://generativelanguage.googleapis.com".to_string(),
        ai_model: "test-model".to_string(),
        ai_api_key: None,
        ai_timeout: 5,
        ai_temperature: 0.2,
        no_ai: true,
        debounce_ms: 0,
        lat: None,
        lng: None,
        value: None,
        category: None,
        layers: vec![],
        chart: None,
        x_axis: None,
        y_axis: None,
        map_token: None,
        base_map: "dark".to_string(),
        fit_to_data: false,
        insights: false,
        verbose: false,
        monitor: false,
    }
}

fn write_input(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

fn open_archive(path: &std::path::Path) -> zip::ZipArchive<std::io::Cursor<Vec<u8>>> {
    let data = std::fs::read(path).unwrap();
    zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap()
}

fn read_entry(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>, name: &str) -> String {
    let mut file = archive.by_name(name).unwrap();
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    content
}

fn entry_names(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>) -> Vec<String> {
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[tokio::test]
async fn test_end_to_end_with_mocked_ai() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("out");
    let output_path = output_path.to_str().unwrap().to_string();
    let input = write_input(&temp_dir, "quakes.csv", QUAKES_CSV);

    let server = MockServer::start();
    let mapping_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/test-model:generateContent")
            .header("x-goog-api-key", "test-key")
            .body_contains("automatically identify the most likely columns");
        then.status(200).json_body(gemini_reply(
            r#"```json
{"latitude": "latitude", "longitude": "longitude", "value": "mag", "category": "place"}
```"#,
        ));
    });
    let layers_mock = server.mock(|when, then| {
        when.method(POST)
            .body_contains("suggest up to 3 suitable Deck.GL layer types");
        then.status(200).json_body(gemini_reply(
            r#"[{"layerType": "HeatmapLayer", "initialConfiguration": {"radiusPixels": 40}, "rationale": "Shows where quakes concentrate"}]"#,
        ));
    });
    server.mock(|when, then| {
        when.method(POST).body_contains("expert project naming assistant");
        then.status(200)
            .json_body(gemini_reply(r#"{"projectName": "Pacific Quakes"}"#));
    });
    let insights_mock = server.mock(|when, then| {
        when.method(POST).body_contains("summarizing the key insights");
        then.status(200).json_body(gemini_reply(
            r#"{"summary": "Strong quakes cluster around the Pacific rim."}"#,
        ));
    });

    let mut config = base_config(&output_path);
    config.input = Some(input);
    config.ai_endpoint = server.base_url();
    config.ai_api_key = Some("test-key".to_string());
    config.no_ai = false;
    config.chart = Some("histogram".to_string());
    config.x_axis = Some("mag".to_string());
    config.map_token = Some("pk.test".to_string());
    config.fit_to_data = true;
    config.insights = true;

    let pipeline = InsightPipeline::new(
        LocalStorage::new("."),
        LocalStorage::new(output_path.clone()),
        config,
    )
    .unwrap();
    let engine = InsightEngine::new_with_monitoring(pipeline, false);
    let result = engine.run().await.unwrap();
    assert!(result.ends_with("geo_insight.zip"));

    mapping_mock.assert();
    layers_mock.assert();
    insights_mock.assert();

    let mut archive = open_archive(&std::path::Path::new(&output_path).join("geo_insight.zip"));
    let names = entry_names(&mut archive);
    assert!(names.contains(&"project.json".to_string()));
    assert!(names.contains(&"points.csv".to_string()));
    assert!(names.contains(&"chart.json".to_string()));
    assert!(names.contains(&"map.json".to_string()));
    assert!(names.contains(&"insights.md".to_string()));
    assert!(!names.contains(&"warnings.txt".to_string()));
    // 散佈圖被補在第一位，熱度圖保留
    assert_eq!(names.iter().filter(|n| n.starts_with("layers/")).count(), 2);

    let project: Value = serde_json::from_str(&read_entry(&mut archive, "project.json")).unwrap();
    assert_eq!(project["projectName"], "Pacific Quakes");
    assert_eq!(project["rowCount"], 4);
    assert_eq!(project["mappedColumns"]["value"], "mag");
    assert_eq!(project["layers"][0]["type"], "ScatterplotLayer");
    assert_eq!(project["layers"][1]["type"], "HeatmapLayer");
    assert_eq!(project["activeView"], "chart");

    let points = read_entry(&mut archive, "points.csv");
    assert!(points.starts_with("lat,lon,value,category\n35.68,139.69,5.1,Tokyo"));
    assert_eq!(points.lines().count(), 5);

    let map: Value = serde_json::from_str(&read_entry(&mut archive, "map.json")).unwrap();
    assert_eq!(map["style_url"], "mapbox://styles/mapbox/dark-v11");
    assert!(!read_entry(&mut archive, "map.json").contains("pk.test"));

    let insights = read_entry(&mut archive, "insights.md");
    assert!(insights.starts_with("# Pacific Quakes"));
    assert!(insights.contains("Pacific rim"));
}

#[tokio::test]
async fn test_ai_outage_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let input = write_input(&temp_dir, "quakes.csv", QUAKES_CSV);

    let server = MockServer::start();
    let outage = server.mock(|when, then| {
        when.method(POST);
        then.status(503).body("model overloaded");
    });

    let mut config = base_config(&output_path);
    config.input = Some(input);
    config.ai_endpoint = server.base_url();
    config.ai_api_key = Some("test-key".to_string());
    config.no_ai = false;
    config.insights = true;

    let pipeline = InsightPipeline::new(
        LocalStorage::new("."),
        LocalStorage::new(output_path.clone()),
        config,
    )
    .unwrap();
    let result = InsightEngine::new(pipeline).run().await;
    assert!(result.is_ok());
    assert!(outage.hits() >= 3);

    let mut archive = open_archive(&temp_dir.path().join("geo_insight.zip"));
    let names = entry_names(&mut archive);
    assert!(!names.contains(&"insights.md".to_string()));

    let project: Value = serde_json::from_str(&read_entry(&mut archive, "project.json")).unwrap();
    assert_eq!(project["projectName"], "Untitled Project");
    assert_eq!(project["mappedColumns"]["latitude"], "latitude");
    assert_eq!(project["mappedColumns"]["longitude"], "longitude");
    assert_eq!(project["layers"][0]["type"], "ScatterplotLayer");
    assert!(project["aiError"].is_object());

    let warnings = read_entry(&mut archive, "warnings.txt");
    assert!(warnings.contains("AI module failure"));
    assert!(warnings.contains("Configuration Error"));
}

#[tokio::test]
async fn test_offline_run_on_sample_data() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let mut config = base_config(&output_path);
    config.archive_name = "cities.zip".to_string();
    config.layers = vec!["hexagon".to_string(), "screen-grid".to_string()];
    config.chart = Some("bar".to_string());
    config.x_axis = Some("region".to_string());
    config.y_axis = Some("population".to_string());
    config.map_token = Some("pk.test".to_string());

    let pipeline = InsightPipeline::new(
        LocalStorage::new("."),
        LocalStorage::new(output_path.clone()),
        config,
    )
    .unwrap();
    let output = InsightEngine::new(pipeline).run().await.unwrap();
    assert!(output.ends_with("cities.zip"));

    let mut archive = open_archive(&temp_dir.path().join("cities.zip"));
    let project: Value = serde_json::from_str(&read_entry(&mut archive, "project.json")).unwrap();
    assert_eq!(project["source"], "sample-data.csv");
    assert_eq!(project["rowCount"], 32);
    assert_eq!(project["layers"].as_array().unwrap().len(), 2);
    assert_eq!(project["layers"][0]["type"], "HexagonLayer");
    assert_eq!(project["layers"][1]["type"], "ScreenGridLayer");

    let chart: Value = serde_json::from_str(&read_entry(&mut archive, "chart.json")).unwrap();
    assert!(chart.to_string().contains("Northeast"));
}

#[tokio::test]
async fn test_xlsx_input_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let input = write_input(&temp_dir, "book.xlsx", "PK\u{3}\u{4}");

    let mut config = base_config(&output_path);
    config.input = Some(input);

    let pipeline = InsightPipeline::new(
        LocalStorage::new("."),
        LocalStorage::new(output_path),
        config,
    )
    .unwrap();
    let err = InsightEngine::new(pipeline).run().await.unwrap_err();
    assert!(matches!(err, InsightError::UnsupportedFormat { .. }));
    assert_eq!(err.severity(), ErrorSeverity::High);
    assert!(!temp_dir.path().join("geo_insight.zip").exists());
}
