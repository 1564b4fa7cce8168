//! Error types for the dump/load library.

use thiserror::Error;

/// Main error type for dump, load and script-generation operations.
#[derive(Error, Debug)]
pub enum FerryError {
    /// Configuration error (invalid YAML, missing fields, bad offsets, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No registered dialect matches the detected engine. Fatal; the job
    /// does not start.
    #[error("Unsupported database engine: {0}")]
    UnsupportedEngine(String),

    /// A column's type has no registered value format. Aborts the current
    /// entry only; never silently coerced.
    #[error("Unsupported SQL type {type_name}, code {type_code}")]
    UnsupportedType { type_name: String, type_code: i32 },

    /// Text-to-value conversion failed (e.g. a corrupt catalog on load).
    /// Aborts the current entry, surfaced with column context.
    #[error("Malformed value for column {column}: {message}")]
    MalformedValue { column: String, message: String },

    /// The session to the engine was lost. Fatal; aborts the whole job.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// No script generator or naming strategy matches the object kind.
    #[error("Generator not found for {0}")]
    GeneratorNotFound(String),

    /// The engine does not support the requested session operation.
    /// Used internally for silent fallback during isolation negotiation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An entry-scoped failure with the entry identity attached.
    #[error("Entry {entry} failed: {message}")]
    Entry { entry: String, message: String },

    /// Session-level error reported by a driver behind the session boundary.
    #[error("Session error: {0}")]
    Session(String),

    /// IO error (catalog files, chunk sinks).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (catalog manifest).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error (config files).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Delimited-text framing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The job was cancelled through its control surface.
    #[error("Job cancelled")]
    Cancelled,
}

impl FerryError {
    /// Create an entry-scoped error.
    pub fn entry(entry: impl Into<String>, message: impl Into<String>) -> Self {
        FerryError::Entry {
            entry: entry.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-value error with column context.
    pub fn malformed(column: impl Into<String>, message: impl Into<String>) -> Self {
        FerryError::MalformedValue {
            column: column.into(),
            message: message.into(),
        }
    }

    /// True for errors that abort the whole job rather than one entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FerryError::ConnectionLost(_) | FerryError::UnsupportedEngine(_) | FerryError::Cancelled
        )
    }

    /// Format the error with its full source chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for dump/load operations.
pub type Result<T> = std::result::Result<T, FerryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_helper() {
        let err = FerryError::entry("users", "stream closed");
        assert_eq!(err.to_string(), "Entry users failed: stream closed");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(FerryError::ConnectionLost("timeout".into()).is_fatal());
        assert!(!FerryError::malformed("id", "not a number").is_fatal());
        assert!(!FerryError::UnsupportedType {
            type_name: "geometry".into(),
            type_code: 255
        }
        .is_fatal());
    }
}
