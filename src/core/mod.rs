pub mod aggregate;
pub mod charts;
pub mod engine;
pub mod ingest;
pub mod layers;
pub mod mapping;
pub mod pipeline;
pub mod schema;
pub mod session;
pub mod viewport;

pub use crate::domain::model::*;
pub use crate::domain::ports::{
    ConfigProvider, InsightRequest, LatLngSuggestion, LayerSuggestionRequest, Pipeline, Storage,
    SuggestionProvider,
};
pub use crate::domain::settings::{AiSettings, LayerRequest, MapSettings};
pub use crate::utils::error::Result;
