pub mod metrics;
pub mod tracing;

pub use metrics::Metrics;
pub use tracing::init_tracing;
