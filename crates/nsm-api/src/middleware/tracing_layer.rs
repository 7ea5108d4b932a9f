//! # Request/Response Tracing
//!
//! Configures `tower_http::trace::TraceLayer` for structured request logging.

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Build the request tracing layer.
///
/// Each request gets an `INFO` span with method, URI and HTTP version, and a
/// completion event with status and latency. Headers are never recorded, so
/// bearer tokens stay out of the logs.
pub fn layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
