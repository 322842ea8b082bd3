// Observability: metrics recorded by every phase

pub mod metrics;

pub use metrics::init as init_metrics;
