// Infrastructure adapters for the external engines
pub mod http_entities;
pub mod http_sentiment;

pub use http_entities::HttpEntityExtractor;
pub use http_sentiment::HttpSentimentEngine;
