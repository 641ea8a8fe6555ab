pub mod correlation;
pub mod logging;

// Re-export commonly used items
pub use correlation::{generate_correlation_id, CorrelationId, X_REQUEST_ID};
pub use logging::{init_structured_logging, LogConfig, LogFormat};
