use crate::core::schema::{category_key, coerce_number};
use crate::core::{
    CategoryDatum, ChartAxis, ChartConfig, ChartData, ChartOutput, ChartType, ColumnType,
    ColumnTypes, Dataset, HistogramBin, SeriesPoint, SummaryStats,
};
use crate::utils::error::{InsightError, Result};
use serde_json::Value;
use std::collections::HashMap;

pub const HISTOGRAM_BINS: usize = 10;

fn not_configured(reason: &str) -> InsightError {
    InsightError::ChartError {
        message: format!("No chart configured: {}", reason),
    }
}

/// 依圖表設定計算要畫的資料
pub fn build_chart(dataset: &Dataset, config: &ChartConfig) -> Result<ChartOutput> {
    let chart_type = config
        .chart_type
        .ok_or_else(|| not_configured("select a chart type"))?;
    let x_axis = config
        .x_axis
        .as_deref()
        .ok_or_else(|| not_configured("select an x axis"))?;
    let y_axis = match (chart_type.needs_y_axis(), config.y_axis.as_deref()) {
        (true, None) => return Err(not_configured("select a y axis")),
        (true, Some(y)) => Some(y),
        (false, _) => None,
    };

    for column in std::iter::once(x_axis).chain(y_axis) {
        if !dataset.has_column(column) {
            return Err(InsightError::UnknownColumn {
                column: column.to_string(),
            });
        }
    }

    let data = match (chart_type, y_axis) {
        (ChartType::Bar | ChartType::Pie, Some(y)) => {
            ChartData::Categories(sum_by_category(dataset, x_axis, y))
        }
        (ChartType::Line | ChartType::Scatter, Some(y)) => {
            ChartData::Series(series(dataset, x_axis, y))
        }
        (ChartType::Histogram, _) => ChartData::Histogram(histogram(&numeric_values(dataset, x_axis))),
        (ChartType::Summary, _) => {
            let stats = summary(&numeric_values(dataset, x_axis)).ok_or_else(|| {
                InsightError::ChartError {
                    message: format!("column '{}' has no numeric values to summarize", x_axis),
                }
            })?;
            ChartData::Summary(stats)
        }
        _ => return Err(not_configured("select a y axis")),
    };

    tracing::debug!("📈 Built {:?} chart over '{}'", chart_type, x_axis);
    Ok(ChartOutput {
        chart_type,
        x_axis: x_axis.to_string(),
        y_axis: y_axis.map(str::to_string),
        data,
    })
}

fn numeric_values(dataset: &Dataset, column: &str) -> Vec<f64> {
    dataset
        .records
        .iter()
        .filter_map(|r| r.get(column).and_then(coerce_number))
        .collect()
}

fn sum_by_category(dataset: &Dataset, x: &str, y: &str) -> Vec<CategoryDatum> {
    let mut order: Vec<CategoryDatum> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in &dataset.records {
        let Some(name) = record.get(x).and_then(category_key) else {
            continue;
        };
        let Some(value) = record.get(y).and_then(coerce_number) else {
            continue;
        };
        match index.get(&name) {
            Some(&i) => order[i].value += value,
            None => {
                index.insert(name.clone(), order.len());
                order.push(CategoryDatum { name, value });
            }
        }
    }
    order
}

fn series(dataset: &Dataset, x: &str, y: &str) -> Vec<SeriesPoint> {
    dataset
        .records
        .iter()
        .filter_map(|record| {
            let y = record.get(y).and_then(coerce_number)?;
            let x = record.get(x).cloned().unwrap_or(Value::Null);
            Some(SeriesPoint { x, y })
        })
        .collect()
}

/// 10 個等寬區間；最大值歸入最後一格
pub fn histogram(values: &[f64]) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max <= min {
        return vec![HistogramBin {
            name: format!("{:.2}-{:.2}", min, max),
            start: min,
            end: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / HISTOGRAM_BINS as f64;
    let mut bins: Vec<HistogramBin> = (0..HISTOGRAM_BINS)
        .map(|i| {
            let start = min + i as f64 * width;
            let end = start + width;
            HistogramBin {
                name: format!("{:.2}-{:.2}", start, end),
                start,
                end,
                count: 0,
            }
        })
        .collect();

    for v in values {
        let index = (((v - min) / width).floor() as usize).min(HISTOGRAM_BINS - 1);
        bins[index].count += 1;
    }
    bins
}

pub fn summary(values: &[f64]) -> Option<SummaryStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let sum: f64 = sorted.iter().sum();
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };

    Some(SummaryStats {
        count,
        sum,
        mean: sum / count as f64,
        median,
        min: sorted[0],
        max: sorted[count - 1],
    })
}

/// 面板上的軸選擇限制：bar/pie 的 x 要是分類欄位，y 一律要是數值
pub fn validate_axis(
    chart_type: ChartType,
    axis: ChartAxis,
    column: &str,
    types: &ColumnTypes,
) -> Result<()> {
    let column_type = types.get(column).ok_or_else(|| InsightError::UnknownColumn {
        column: column.to_string(),
    })?;
    let numeric = *column_type == ColumnType::Number;

    let allowed = match (chart_type, axis) {
        (_, ChartAxis::Y) => numeric && chart_type.needs_y_axis(),
        (ChartType::Bar | ChartType::Pie, ChartAxis::X) => !numeric,
        (ChartType::Histogram | ChartType::Summary, ChartAxis::X) => numeric,
        (ChartType::Line | ChartType::Scatter, ChartAxis::X) => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(InsightError::ChartError {
            message: format!(
                "column '{}' ({}) cannot be used as {:?} axis of a {:?} chart",
                column, column_type, axis, chart_type
            ),
        })
    }
}

/// 給 AI 說明用的一行圖表摘要
pub fn describe_chart(chart: &ChartOutput) -> String {
    let y = chart
        .y_axis
        .as_deref()
        .map(|y| format!(" vs {}", y))
        .unwrap_or_default();
    let detail = match &chart.data {
        ChartData::Categories(rows) => {
            let top = rows
                .iter()
                .max_by(|a, b| a.value.total_cmp(&b.value))
                .map(|d| format!(", largest '{}' = {}", d.name, d.value))
                .unwrap_or_default();
            format!("{} categories{}", rows.len(), top)
        }
        ChartData::Series(points) => format!("{} points", points.len()),
        ChartData::Histogram(bins) => {
            let total: usize = bins.iter().map(|b| b.count).sum();
            format!("{} values in {} bins", total, bins.len())
        }
        ChartData::Summary(s) => format!(
            "count {}, mean {:.2}, median {:.2}, min {}, max {}",
            s.count, s.mean, s.median, s.min, s.max
        ),
    };
    format!("{:?} chart of {}{}: {}", chart.chart_type, chart.x_axis, y, detail)
}
