//! Error types for the metrics crawler
//!
//! Every error surfaces synchronously to the caller of the mutating
//! operation. Nothing is retried internally.

use thiserror::Error;

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Main error type for crawler operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlerError {
    /// A metric was configured with a window that cannot hold any sample
    #[error("Invalid sampling size for metric {metric}: {size} (must be at least 1)")]
    InvalidSamplingSize { metric: String, size: usize },

    /// A measure does not match the type the metric was created with
    #[error("Type mismatch for metric {metric}: holds {original}, got {offending}")]
    IncorrectMeasureType {
        metric: String,
        original: &'static str,
        offending: &'static str,
    },

    /// Metric name or name template is empty
    #[error("Invalid metric name: {0}")]
    InvalidName(String),
}

impl CrawlerError {
    /// Name of the metric the error refers to, if any
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::InvalidSamplingSize { metric, .. } | Self::IncorrectMeasureType { metric, .. } => {
                Some(metric.as_str())
            }
            Self::InvalidName(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrawlerError::IncorrectMeasureType {
            metric: "db.query".to_string(),
            original: "core::time::Duration",
            offending: "f64",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("db.query"));
        assert!(msg.contains("f64"));
        assert!(msg.contains("core::time::Duration"));
    }

    #[test]
    fn test_sampling_size_display() {
        let err = CrawlerError::InvalidSamplingSize {
            metric: "cache.hits".to_string(),
            size: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("cache.hits"));
        assert_eq!(
            msg,
            "Invalid sampling size for metric cache.hits: 0 (must be at least 1)"
        );
    }

    #[test]
    fn test_error_metric() {
        let err = CrawlerError::InvalidSamplingSize {
            metric: "m".to_string(),
            size: 0,
        };
        assert_eq!(err.metric(), Some("m"));
        assert_eq!(CrawlerError::InvalidName(String::new()).metric(), None);
    }
}
