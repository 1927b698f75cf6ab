//! Error types for network construction, cleaning and analysis
//!
//! Structural and configuration errors abort the operation that raised them.
//! Unassignable data points and disconnected components are non-fatal: they
//! are collected into reports, and only surface as errors when a caller asks
//! for strict handling.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    /// Geometry or topology that violates a graph invariant
    #[error("Structural error at '{id}': {reason}")]
    Structural { id: String, reason: String },

    /// Invalid parameters (negative distances, empty threshold lists, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data point '{id}' has no edge within {max_dist}")]
    Unassignable { id: String, max_dist: f64 },

    #[error("Disconnected component of {size} nodes (first: {first})")]
    DisconnectedComponent { first: String, size: usize },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl NetworkError {
    pub fn structural<I: Into<String>, R: std::fmt::Display>(id: I, reason: R) -> Self {
        Self::Structural {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Configuration(e.to_string())
    }

    /// Whether the error aborts the operation (as opposed to being recorded)
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            NetworkError::Unassignable { .. } | NetworkError::DisconnectedComponent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_message_names_offender() {
        let err = NetworkError::structural("a-b", "geometry start is 3.2 from node 'a'");
        assert_eq!(
            err.to_string(),
            "Structural error at 'a-b': geometry start is 3.2 from node 'a'"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_non_fatal_variants() {
        let err = NetworkError::Unassignable {
            id: "shop-1".to_string(),
            max_dist: 400.0,
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("shop-1"));
    }
}
