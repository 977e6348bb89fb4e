use std::fmt;

use thiserror::Error;

/// Upstream debug-session calls, named the way the protocol names them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolCall {
    EnableAccessibility,
    GetFullAxTree,
    CaptureSnapshot,
    Evaluate,
    ResolveNode,
}

impl fmt::Display for ProtocolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolCall::EnableAccessibility => "Accessibility.enable",
            ProtocolCall::GetFullAxTree => "Accessibility.getFullAXTree",
            ProtocolCall::CaptureSnapshot => "DOMSnapshot.captureSnapshot",
            ProtocolCall::Evaluate => "Runtime.evaluate",
            ProtocolCall::ResolveNode => "DOM.resolveNode",
        };
        f.write_str(name)
    }
}

/// A failed round-trip against the debug session
#[derive(Debug, Clone, Error)]
#[error("{call} failed: {message}")]
pub struct ProtocolError {
    pub call: ProtocolCall,
    pub message: String,
}

impl ProtocolError {
    pub fn new(call: ProtocolCall, message: impl Into<String>) -> Self {
        Self {
            call,
            message: message.into(),
        }
    }
}

/// Custom error type that includes exit codes
#[derive(Debug, Error)]
pub enum PerceptionError {
    /// Debug-session call failed (exit code 4)
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Backend handle has no live counterpart (exit code 2)
    #[error("Could not resolve backend node {backend_node_id} to a live element")]
    Resolution { backend_node_id: i64 },
    /// Extracted payload exceeds the size ceiling (exit code 3)
    #[error(
        "Extracted page data is too large ({actual_size} bytes, limit {max_size} bytes). \
         Try reducing the scope of the request, refreshing the page, or simplifying the page before retrying."
    )]
    PayloadTooLarge { actual_size: usize, max_size: usize },
    /// A command-line wait ran out (exit code 5)
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// Generic error (exit code 1)
    #[error(transparent)]
    Other(anyhow::Error),
}

impl PerceptionError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PerceptionError::Resolution { .. } => 2,
            PerceptionError::PayloadTooLarge { .. } => 3,
            PerceptionError::Protocol(_) => 4,
            PerceptionError::Timeout(_) => 5,
            PerceptionError::Other(_) => 1,
        }
    }

    /// Whether the orchestrator may retry on the fallback path
    pub fn is_protocol_failure(&self) -> bool {
        matches!(self, PerceptionError::Protocol(_))
    }
}

impl From<anyhow::Error> for PerceptionError {
    fn from(err: anyhow::Error) -> Self {
        // Errors that crossed an anyhow boundary keep their typed form
        match err.downcast::<PerceptionError>() {
            Ok(typed) => typed,
            Err(err) => match err.downcast::<ProtocolError>() {
                Ok(protocol) => PerceptionError::Protocol(protocol),
                Err(err) => PerceptionError::Other(err),
            },
        }
    }
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
