use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the SmartVoz system.
///
/// The first five variants are the operational taxonomy shared by every
/// component. Each variant reports a stable [`kind`](SmartvozError::kind) name
/// that operators see in rebuild reports and that the retrieval layer embeds
/// in its sentinel text.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmartvozError {
    /// Missing credentials or connection parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Corpus, index, or a referenced record is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An embedding or LLM provider call failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A single table query failed while exporting.
    #[error("Data integrity error in {entity}: {reason}")]
    DataIntegrity { entity: String, reason: String },

    /// No confident identity or issue match could be established.
    #[error("Validation outcome unknown: {0}")]
    ValidationOutcomeUnknown(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Another export or index build holds the rebuild lock.
    #[error("Busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SmartvozError {
    /// Stable, caller-independent name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            SmartvozError::Configuration(_) => "ConfigurationError",
            SmartvozError::NotFound(_) => "NotFoundError",
            SmartvozError::Provider(_) => "ProviderError",
            SmartvozError::DataIntegrity { .. } => "DataIntegrityError",
            SmartvozError::ValidationOutcomeUnknown(_) => "ValidationOutcomeUnknown",
            SmartvozError::Storage(_) => "StorageError",
            SmartvozError::Timeout(_) => "TimeoutError",
            SmartvozError::Busy(_) => "BusyError",
            SmartvozError::Io(_) => "IoError",
            SmartvozError::Serialization(_) => "SerializationError",
        }
    }

    pub fn data_integrity(entity: impl Into<String>, reason: impl ToString) -> Self {
        SmartvozError::DataIntegrity {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for SmartvozError {
    fn from(err: toml::de::Error) -> Self {
        SmartvozError::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for SmartvozError {
    fn from(err: toml::ser::Error) -> Self {
        SmartvozError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for SmartvozError {
    fn from(err: serde_json::Error) -> Self {
        SmartvozError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for SmartVoz operations.
pub type Result<T> = std::result::Result<T, SmartvozError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SmartvozError::Configuration("OPENAI_API_KEY missing".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY missing"
        );
    }

    #[test]
    fn test_data_integrity_display() {
        let err = SmartvozError::data_integrity("clients", "no such table: clients");
        assert_eq!(
            err.to_string(),
            "Data integrity error in clients: no such table: clients"
        );
    }

    #[test]
    fn test_kind_names() {
        let cases: Vec<(SmartvozError, &str)> = vec![
            (SmartvozError::Configuration("x".into()), "ConfigurationError"),
            (SmartvozError::NotFound("x".into()), "NotFoundError"),
            (SmartvozError::Provider("x".into()), "ProviderError"),
            (SmartvozError::data_integrity("x", "y"), "DataIntegrityError"),
            (
                SmartvozError::ValidationOutcomeUnknown("x".into()),
                "ValidationOutcomeUnknown",
            ),
            (SmartvozError::Timeout(Duration::from_secs(1)), "TimeoutError"),
            (SmartvozError::Busy("x".into()), "BusyError"),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SmartvozError = io_err.into();
        assert!(matches!(err, SmartvozError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: SmartvozError = err.unwrap_err().into();
        assert!(matches!(converted, SmartvozError::Configuration(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let converted: SmartvozError = err.unwrap_err().into();
        assert!(matches!(converted, SmartvozError::Serialization(_)));
    }
}
