//! Middleware for observability.
//!
//! Request logging with latency tracking, reused by the health/metrics
//! HTTP surface (C13).

pub mod logging;

pub use logging::{request_logging, request_logging_simple};
