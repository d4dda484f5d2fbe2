use std::error::Error as StdError;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum UcotronError {
    /// The server rejected the request with a 4xx status. Never retried.
    #[error(transparent)]
    Server(ServerError),
    /// Every allowed attempt failed with a 5xx status or a transport error.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of transport attempts made (`max_retries + 1`).
        attempts: usize,
        /// Failure of the final attempt.
        #[source]
        last_error: AttemptError,
    },
    /// The caller cancelled the call through a [`CancelToken`](crate::CancelToken).
    #[error("request cancelled")]
    Cancelled,
    /// A successful response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request could not be built (bad namespace header, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl UcotronError {
    /// HTTP status of the server error behind this failure, if any.
    pub fn status(&self) -> Option<u16> {
        self.server_error().map(|err| err.status)
    }

    /// The server error behind this failure, looking through `RetriesExhausted`.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            Self::RetriesExhausted {
                last_error: AttemptError::Server(err),
                ..
            } => Some(err),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Error response returned by the server.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("server error {status} ({code}): {message}")]
pub struct ServerError {
    /// HTTP status code.
    pub status: u16,
    /// Error code from the response body, or the HTTP reason phrase.
    pub code: String,
    /// Error message from the response body, or the raw body text.
    pub message: String,
}

impl ServerError {
    /// 4xx errors are final; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }
}

/// Network-level failure of a single attempt: connect, timeout, DNS, or body read.
#[derive(Debug, thiserror::Error)]
#[error("{message}: {source}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    pub fn new(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true when the underlying cause is a `reqwest` timeout.
    pub fn is_timeout(&self) -> bool {
        self.source
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_timeout)
    }
}

/// Failure of one retryable attempt.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Server(ServerError),
    #[error(transparent)]
    Transport(TransportError),
}

/// Returns false for 4xx statuses, which must never be retried.
pub fn is_retryable_status(status: u16) -> bool {
    !(400..=499).contains(&status)
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::{is_retryable_status, AttemptError, ServerError, TransportError, UcotronError};

    fn server_error(status: u16) -> ServerError {
        ServerError {
            status,
            code: "internal".to_owned(),
            message: "boom".to_owned(),
        }
    }

    #[test]
    fn server_error_display_includes_code_and_message() {
        let err = UcotronError::Server(ServerError {
            status: 404,
            code: "NOT_FOUND".to_owned(),
            message: "memory 7 not found".to_owned(),
        });
        assert_eq!(
            err.to_string(),
            "server error 404 (NOT_FOUND): memory 7 not found"
        );
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn exhausted_display_states_attempts_and_cause() {
        let err = UcotronError::RetriesExhausted {
            attempts: 4,
            last_error: AttemptError::Server(server_error(503)),
        };
        assert_eq!(
            err.to_string(),
            "retries exhausted after 4 attempts: server error 503 (internal): boom"
        );
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn exhausted_transport_error_chains_to_underlying_cause() {
        let cause = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err = UcotronError::RetriesExhausted {
            attempts: 2,
            last_error: AttemptError::Transport(TransportError::new(
                "request to GET /api/v1/health failed",
                cause,
            )),
        };

        assert_eq!(err.status(), None);
        let transport = err.source().expect("exhausted error must expose last error");
        assert_eq!(
            transport.to_string(),
            "request to GET /api/v1/health failed: connection refused"
        );
        let io_error = transport
            .source()
            .and_then(|source| source.downcast_ref::<io::Error>())
            .expect("transport error must chain to io error");
        assert_eq!(io_error.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn only_4xx_statuses_are_final() {
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(429));
        assert!(!is_retryable_status(499));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(302));
        assert!(server_error(502).is_retryable());
    }

    #[test]
    fn cancelled_is_distinct_from_other_failures() {
        assert!(UcotronError::Cancelled.is_cancelled());
        assert!(!UcotronError::Decode("bad".to_owned()).is_cancelled());
        assert_eq!(UcotronError::Cancelled.status(), None);
    }
}
