use std::fmt;

/// Error types for the engine pool and the UCI protocol client
#[derive(Debug, Clone, PartialEq)]
pub enum PoolError {
    /// Engine subprocess could not be spawned, wired or configured
    Initialization(String),
    /// A protocol expectation was not met (usually the engine exited mid-command)
    Protocol(String),
    /// No idle engine and the pool is already at its cap
    PoolExhausted { size: usize, threshold: usize },
    /// Position rejected before any engine was contacted
    Validation(String),
    /// Client exceeded its request rate
    Throttled { client: String },
    /// Configuration error
    Configuration(String),
    /// Dispatch attempted after the pool was shut down
    ShutDown,
    /// File I/O operation failed
    Io(String),
    /// Background dispatch task failed to complete
    Join(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Initialization(msg) => write!(f, "Engine initialization error: {}", msg),
            PoolError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PoolError::PoolExhausted { size, threshold } => write!(
                f,
                "Number of maximum open instances exceeded: {} actual vs {} threshold",
                size, threshold
            ),
            PoolError::Validation(msg) => write!(f, "Invalid position: {}", msg),
            PoolError::Throttled { client } => write!(f, "Too many requests from {}", client),
            PoolError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            PoolError::ShutDown => write!(f, "Engine pool has been shut down"),
            PoolError::Io(msg) => write!(f, "I/O error: {}", msg),
            PoolError::Join(msg) => write!(f, "Dispatch task failed: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

impl PoolError {
    /// Whether the caller should simply try again later ("service busy")
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::PoolExhausted { .. } | PoolError::Throttled { .. })
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, PoolError>;

impl From<std::io::Error> for PoolError {
    fn from(error: std::io::Error) -> Self {
        PoolError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(error: serde_json::Error) -> Self {
        PoolError::Configuration(format!("JSON configuration error: {}", error))
    }
}

impl From<csv::Error> for PoolError {
    fn from(error: csv::Error) -> Self {
        PoolError::Io(format!("CSV error: {}", error))
    }
}

impl From<tokio::task::JoinError> for PoolError {
    fn from(error: tokio::task::JoinError) -> Self {
        PoolError::Join(error.to_string())
    }
}

// Helper macros for error creation
#[macro_export]
macro_rules! protocol_error {
    ($msg:expr) => {
        $crate::errors::PoolError::Protocol($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::PoolError::Protocol(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! init_error {
    ($msg:expr) => {
        $crate::errors::PoolError::Initialization($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::PoolError::Initialization(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::PoolError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::PoolError::Configuration(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PoolError::PoolExhausted {
            size: 4,
            threshold: 4,
        };
        assert_eq!(
            error.to_string(),
            "Number of maximum open instances exceeded: 4 actual vs 4 threshold"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let pool_error: PoolError = io_error.into();

        match pool_error {
            PoolError::Io(msg) => assert!(msg.contains("pipe closed")),
            _ => panic!("Expected Io"),
        }
    }

    #[test]
    fn test_error_macros() {
        let error = protocol_error!("Can not find expected line: {}", "readyok");
        match error {
            PoolError::Protocol(msg) => assert!(msg.contains("readyok")),
            _ => panic!("Expected Protocol"),
        }

        let error = init_error!("spawn failed");
        assert_eq!(error, PoolError::Initialization("spawn failed".to_string()));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(PoolError::PoolExhausted {
            size: 1,
            threshold: 1
        }
        .is_retryable());
        assert!(PoolError::Throttled {
            client: "127.0.0.1".to_string()
        }
        .is_retryable());
        assert!(!protocol_error!("eof").is_retryable());
        assert!(!PoolError::ShutDown.is_retryable());
    }
}
