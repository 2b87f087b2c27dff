use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Store(String),
    NotFound(String),
    Validation(String),
    TimeoutError(String),
    InFlight(String),
    ConfigurationError(String),
    Internal(String),
    Other(anyhow::Error),
}

impl AppError {
    /// Store and timeout failures may succeed on retry; everything else will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::TimeoutError(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Store(msg) => write!(f, "Store error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::TimeoutError(msg) => write!(f, "Timeout error: {}", msg),
            AppError::InFlight(msg) => write!(f, "Operation in flight: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Other(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Store("unavailable".into()).is_transient());
        assert!(AppError::TimeoutError("get".into()).is_transient());
        assert!(!AppError::Validation("empty".into()).is_transient());
        assert!(!AppError::InFlight("like".into()).is_transient());
        assert!(!AppError::ConfigurationError("timeout".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = AppError::NotFound("posts/abc".to_string());
        assert_eq!(err.to_string(), "Not found: posts/abc");
    }
}
