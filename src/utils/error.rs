use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJsonError(#[from] Box<geojson::Error>),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Unsupported file format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("Could not parse '{file}': {message}")]
    ParseError { file: String, message: String },

    #[error("File is too large ({size} bytes, limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Column mapping incomplete: missing {missing}")]
    MappingIncomplete { missing: String },

    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("Layer error: {message}")]
    LayerError { message: String },

    #[error("Chart error: {message}")]
    ChartError { message: String },

    #[error("AI flow '{flow}' failed: {message}")]
    AiError { flow: String, message: String },

    #[error("AI flow '{flow}' returned an unexpected response: {message}")]
    AiResponseError { flow: String, message: String },

    #[error("Map access token is not configured")]
    MissingMapToken,

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

impl From<geojson::Error> for InsightError {
    fn from(err: geojson::Error) -> Self {
        InsightError::GeoJsonError(Box::new(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Network,
    Data,
    Configuration,
    Ai,
    Map,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl InsightError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            InsightError::IoError(_) | InsightError::ZipError(_) => ErrorCategory::Io,
            InsightError::ApiError(_) => ErrorCategory::Network,
            InsightError::CsvError(_)
            | InsightError::SerializationError(_)
            | InsightError::GeoJsonError(_)
            | InsightError::UnsupportedFormat { .. }
            | InsightError::ParseError { .. }
            | InsightError::FileTooLarge { .. }
            | InsightError::UnknownColumn { .. } => ErrorCategory::Data,
            InsightError::ConfigError { .. }
            | InsightError::ConfigValidationError { .. }
            | InsightError::InvalidConfigValueError { .. }
            | InsightError::MissingConfigError { .. } => ErrorCategory::Configuration,
            InsightError::AiError { .. } | InsightError::AiResponseError { .. } => {
                ErrorCategory::Ai
            }
            InsightError::MissingMapToken => ErrorCategory::Map,
            InsightError::MappingIncomplete { .. }
            | InsightError::LayerError { .. }
            | InsightError::ChartError { .. }
            | InsightError::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // AI 失敗會以後備建議修補，不影響結果
            InsightError::AiError { .. } | InsightError::AiResponseError { .. } => {
                ErrorSeverity::Low
            }
            InsightError::MissingMapToken | InsightError::ChartError { .. } => ErrorSeverity::Low,
            InsightError::ApiError(_) => ErrorSeverity::Medium,
            InsightError::IoError(_) | InsightError::ZipError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            InsightError::UnsupportedFormat { extension } => {
                format!("Files of type .{} cannot be loaded", extension)
            }
            InsightError::ParseError { file, .. } => {
                format!("The file '{}' could not be read as a dataset", file)
            }
            InsightError::FileTooLarge { limit, .. } => {
                format!("The file exceeds the {} MB upload limit", limit / (1024 * 1024))
            }
            InsightError::MappingIncomplete { .. } => {
                "Please select latitude and longitude columns first".to_string()
            }
            InsightError::MissingMapToken => {
                "Map access token is not configured, the map cannot be displayed".to_string()
            }
            InsightError::AiError { .. } | InsightError::AiResponseError { .. } => {
                "AI suggestion failed, default suggestions were used instead".to_string()
            }
            InsightError::ApiError(_) => "Could not reach the AI service".to_string(),
            InsightError::IoError(_) => "A file could not be read or written".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Io => "Check that the input file exists and the output directory is writable",
            ErrorCategory::Network => "Check your network connection and the AI endpoint, then retry",
            ErrorCategory::Data => match self {
                InsightError::UnsupportedFormat { .. } => {
                    "Export the data as CSV, JSON or GeoJSON and upload it again"
                }
                InsightError::FileTooLarge { .. } => "Reduce the dataset below 10 MB",
                _ => "Check that the file has a header row and well-formed content",
            },
            ErrorCategory::Configuration => "Review the configuration file or command line flags",
            ErrorCategory::Ai => "Set GEMINI_API_KEY or run with --no-ai to use built-in heuristics",
            ErrorCategory::Map => "Set MAPBOX_ACCESS_TOKEN in your environment",
            ErrorCategory::Processing => "Map the latitude and longitude columns and try again",
        }
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_errors_are_low_severity() {
        let err = InsightError::AiError {
            flow: "suggestLayersFlow".to_string(),
            message: "503".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Ai);
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_unsupported_format_recovery() {
        let err = InsightError::UnsupportedFormat {
            extension: "xlsx".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Data);
        assert!(err.recovery_suggestion().contains("CSV"));
        assert!(err.user_friendly_message().contains(".xlsx"));
    }

    #[test]
    fn test_io_error_is_critical() {
        let err: InsightError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
