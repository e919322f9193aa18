pub mod http_handler;
pub mod middleware;
pub mod pipeline;

/// Re-export commonly used types from adapters
pub use http_handler::{StatusResponse, router};
pub use pipeline::{Pipeline, PipelineError, PipelineSettings, Stage};
