//! Typed error taxonomy for the dispatch core.
//!
//! One enum covers the whole pipeline: intake validation, missing
//! records, and store access. HTTP status mapping lives in
//! `dispatch::api`; credential failures never leave the handler layer.

use thiserror::Error;

/// Errors from the incident dispatch pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Incident {id} not found")]
    IncidentNotFound { id: i64 },

    #[error("Persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl DispatchError {
    /// Wrap a store error. Store operations are not idempotent, so callers
    /// must not retry on this variant.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = DispatchError::MissingField("phoneNumber");
        assert!(err.to_string().contains("phoneNumber"));
    }

    #[test]
    fn incident_not_found_carries_id() {
        let err = DispatchError::IncidentNotFound { id: 42 };
        match &err {
            DispatchError::IncidentNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected IncidentNotFound"),
        }
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn persistence_preserves_source_message() {
        let err = DispatchError::persistence(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn implements_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&DispatchError::MissingField("alarmLevel"));
        assert_std_error(&DispatchError::IncidentNotFound { id: 1 });
    }
}
