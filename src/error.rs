//! Error taxonomy for the surveillance engine.
//!
//! Kinds mirror the failure-handling design: transient I/O is retried,
//! upstream rejections are surfaced, malformed data is skipped, statistical
//! insufficiency is not an error at all (callers get a neutral result
//! instead), internal numeric faults are recovered from, and only a
//! handful of startup failures are fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient I/O failure in {component}: {source}")]
    TransientIO {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("upstream rejected request in {component}: {reason}")]
    UpstreamRejection {
        component: &'static str,
        reason: String,
    },

    #[error("malformed data in {component}: {reason}")]
    DataShape {
        component: &'static str,
        reason: String,
    },

    #[error("internal fault in {component}: {reason}")]
    Internal {
        component: &'static str,
        reason: String,
    },

    #[error("fatal startup failure: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn transient(component: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::TransientIO {
            component,
            source: source.into(),
        }
    }

    pub fn data_shape(component: &'static str, reason: impl Into<String>) -> Self {
        Self::DataShape {
            component,
            reason: reason.into(),
        }
    }

    pub fn internal(component: &'static str, reason: impl Into<String>) -> Self {
        Self::Internal {
            component,
            reason: reason.into(),
        }
    }

    pub fn upstream_rejection(component: &'static str, reason: impl Into<String>) -> Self {
        Self::UpstreamRejection {
            component,
            reason: reason.into(),
        }
    }

    /// Whether a loop (`scan`, `ws-consume`, `delivery`) should abort on this
    /// error. Only `Fatal` halts initialization; every other kind is
    /// recorded and the loop continues with the next item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
