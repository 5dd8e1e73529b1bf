//! Gattlink errors

/// The error type for transport operations
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    message: String,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
        message: String,
    ) -> Self {
        Error { kind, source, message }
    }

    /// Creates an error of the given kind carrying a message.
    ///
    /// Useful for [`bus`][crate::bus] implementations reporting failures of their own.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::new(kind, None, message.into())
    }

    /// Returns the corresponding [ErrorKind] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.message.is_empty(), &self.source) {
            (true, None) => write!(f, "{}", &self.kind),
            (false, None) => write!(f, "{}: {}", &self.kind, &self.message),
            (true, Some(err)) => write!(f, "{}: {}", &self.kind, err),
            (false, Some(err)) => write!(f, "{}: {} ({})", &self.kind, &self.message, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = &**x;
            x
        })
    }
}

/// A list of general categories of transport error.
///
/// The variants follow the status codes reported to the connectivity layer above the transport.
#[non_exhaustive]
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// the Bluetooth adapter is not enabled
    AdapterNotEnabled,
    /// no Bluetooth hardware adapter was found
    NoHardware,
    /// the role was already started
    AlreadyStarted,
    /// invalid parameter
    InvalidParameter,
    /// the operation is unsupported
    NotSupported,
    /// not found
    NotFound,
    /// no client is subscribed to notifications
    NotSubscribed,
    /// the operation is not valid in the current state
    InvalidState,
    /// timed out
    Timeout,
    /// connection failed
    ConnectionFailed,
    /// D-Bus call failed
    DBus,
    /// an internal error has occured
    Internal,
    /// error
    Other,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            source: None,
            message: String::new(),
        }
    }
}
