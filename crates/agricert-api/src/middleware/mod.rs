//! Tower middleware: request metrics and trace spans.

pub mod metrics;
pub mod tracing_layer;
