//! Error types for connectors and the workbook exporter.

use std::time::Duration;

/// Errors a jurisdiction connector can report.
///
/// Every variant is non-fatal for a search as a whole: the aggregator turns
/// it into an error status for the one jurisdiction that raised it.
#[derive(thiserror::Error, Debug)]
pub enum ConnectorError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("rate limited by {url}")]
    RateLimited { url: String },

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("no connector configured")]
    NotConfigured,
}

impl ConnectorError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(format!("invalid JSON: {e}"))
    }
}

impl From<tokio::task::JoinError> for ConnectorError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Parse(format!("background task failed: {e}"))
    }
}

/// Convenience result type for connector code.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors raised while building an XLSX workbook.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason_is_short() {
        let err = ConnectorError::Status {
            url: "https://example.org/x".into(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP 503 from https://example.org/x");
    }

    #[test]
    fn test_timeout_reason() {
        let err = ConnectorError::Timeout(Duration::from_secs(120));
        assert_eq!(err.to_string(), "timed out after 120s");
    }
}
