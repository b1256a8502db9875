pub mod metrics;

pub use metrics::track_http_metrics;
