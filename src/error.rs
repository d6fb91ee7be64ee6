use thiserror::Error;

use crate::bot::BotError;
use crate::collector::CollectorError;

/// Process-level error. Everything that can stop startup or end a
/// conversation task ends up here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),
    #[error("bot error: {0}")]
    Bot(#[from] BotError),
    #[error("logging error: {0}")]
    Logging(#[from] flexi_logger::FlexiLoggerError),
    #[error("{0}")]
    Other(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_error_is_wrapped() {
        let err: AppError = CollectorError::Api("boom".to_string()).into();
        assert_eq!(err.to_string(), "collector error: API error: boom");
    }

    #[test]
    fn test_string_becomes_other() {
        let err: AppError = "plain failure".to_string().into();
        assert!(matches!(err, AppError::Other(_)));
        assert_eq!(err.to_string(), "plain failure");
    }
}
