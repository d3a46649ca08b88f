use thiserror::Error;

/// Errors from repository operations (used by trait definitions in scholarflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised while parsing identifiers persisted as plain strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseIdError {
    #[error("unknown node id: '{0}'")]
    UnknownNode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_parse_id_error_display() {
        let err = ParseIdError::UnknownNode("teleport".to_string());
        assert_eq!(err.to_string(), "unknown node id: 'teleport'");
    }
}
