/*!
 * Error types for the notary daemon
 */

use notary_connect::ClientError;
use notary_core_envelope::EnvelopeError;
use notary_core_signer::SignerError;
use notary_outbox::QueueError;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, NotaryError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum NotaryError {
    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Span could not be encoded or decoded
    Encoding(EnvelopeError),

    /// Key vault or signing failure
    Signing(SignerError),

    /// Outbox storage failure
    Queue(QueueError),

    /// Ledger communication failure
    Client(ClientError),

    /// Operation needs a device token
    NotEnrolled,

    /// Caller supplied malformed input
    InvalidInput(String),

    /// Generic error with message
    Other(String),
}

impl NotaryError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Fatal errors: nothing will work until the operator intervenes
            NotaryError::Config(_)
            | NotaryError::Signing(_)
            | NotaryError::NotEnrolled
            | NotaryError::InvalidInput(_) => EXIT_FATAL,
            NotaryError::Queue(QueueError::Corrupt(_)) => EXIT_FATAL,
            // Partial failures: spans stay queued and will be retried
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            NotaryError::Client(err) => err.is_transient(),
            NotaryError::Io(io_err) => Self::is_io_transient(io_err),
            _ => false,
        }
    }

    /// Check if an I/O error is transient
    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            NotaryError::Config(_) => ErrorCategory::Configuration,
            NotaryError::Io(_) => ErrorCategory::IoError,
            NotaryError::Encoding(_) => ErrorCategory::Codec,
            NotaryError::Signing(_) => ErrorCategory::Security,
            NotaryError::Queue(_) => ErrorCategory::Storage,
            NotaryError::Client(_) => ErrorCategory::Network,
            NotaryError::NotEnrolled => ErrorCategory::Enrollment,
            NotaryError::InvalidInput(_) => ErrorCategory::Validation,
            NotaryError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration errors
    Configuration,
    /// I/O operation errors
    IoError,
    /// Span encoding errors
    Codec,
    /// Key and signature errors
    Security,
    /// Outbox database errors
    Storage,
    /// Network/ledger errors
    Network,
    /// Device not enrolled
    Enrollment,
    /// Bad caller input
    Validation,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Codec => write!(f, "codec"),
            ErrorCategory::Security => write!(f, "security"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Enrollment => write!(f, "enrollment"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for NotaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotaryError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            NotaryError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            NotaryError::Encoding(err) => {
                write!(f, "Encoding error: {}", err)
            }
            NotaryError::Signing(err) => {
                write!(f, "Signing error: {}", err)
            }
            NotaryError::Queue(err) => {
                write!(f, "Outbox error: {}", err)
            }
            NotaryError::Client(err) => {
                write!(f, "Ledger error: {}", err)
            }
            NotaryError::NotEnrolled => {
                write!(f, "Device is not enrolled; run `notaryd enroll` first")
            }
            NotaryError::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            NotaryError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for NotaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotaryError::Io(err) => Some(err),
            NotaryError::Encoding(err) => Some(err),
            NotaryError::Signing(err) => Some(err),
            NotaryError::Queue(err) => Some(err),
            NotaryError::Client(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for NotaryError {
    fn from(err: io::Error) -> Self {
        NotaryError::Io(err)
    }
}

impl From<serde_json::Error> for NotaryError {
    fn from(err: serde_json::Error) -> Self {
        NotaryError::InvalidInput(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for NotaryError {
    fn from(err: toml::de::Error) -> Self {
        NotaryError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for NotaryError {
    fn from(err: toml::ser::Error) -> Self {
        NotaryError::Config(format!("TOML write error: {}", err))
    }
}

impl From<EnvelopeError> for NotaryError {
    fn from(err: EnvelopeError) -> Self {
        NotaryError::Encoding(err)
    }
}

impl From<SignerError> for NotaryError {
    fn from(err: SignerError) -> Self {
        NotaryError::Signing(err)
    }
}

impl From<QueueError> for NotaryError {
    fn from(err: QueueError) -> Self {
        NotaryError::Queue(err)
    }
}

impl From<ClientError> for NotaryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotEnrolled => NotaryError::NotEnrolled,
            ClientError::Encoding(e) => NotaryError::Encoding(e),
            ClientError::Signing(e) => NotaryError::Signing(e),
            ClientError::Queue(e) => NotaryError::Queue(e),
            other => NotaryError::Client(other),
        }
    }
}
