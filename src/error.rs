use std::fmt;

#[derive(Debug)]
pub enum IcwError {
    /// Saved data missing, in an unknown format, or unreadable.
    Load(String),
    /// Saved data parsed but breaks the identifier/index bijection.
    InvalidSnapshot(String),
    /// A single shared-match lookup failed; the whole run fails with it.
    Fetch(String),
    /// The matrix cannot fit in the sink even after splitting.
    Capacity(String),
    Serialization(Box<bincode::error::EncodeError>),
    Deserialization(Box<bincode::error::DecodeError>),
    Json(serde_json::Error),
    Csv(csv::Error),
    Io(std::io::Error),
    Task(String),
    Other(String),
}

impl fmt::Display for IcwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcwError::Load(e) => write!(f, "Load error: {}", e),
            IcwError::InvalidSnapshot(e) => write!(f, "Invalid snapshot: {}", e),
            IcwError::Fetch(e) => write!(f, "Fetch error: {}", e),
            IcwError::Capacity(e) => write!(f, "Capacity error: {}", e),
            IcwError::Serialization(e) => write!(f, "Serialization error: {}", e),
            IcwError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
            IcwError::Json(e) => write!(f, "JSON error: {}", e),
            IcwError::Csv(e) => write!(f, "CSV error: {}", e),
            IcwError::Io(e) => write!(f, "IO error: {}", e),
            IcwError::Task(e) => write!(f, "Task error: {}", e),
            IcwError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for IcwError {}

impl From<bincode::error::EncodeError> for IcwError {
    fn from(err: bincode::error::EncodeError) -> Self {
        IcwError::Serialization(Box::new(err))
    }
}

impl From<bincode::error::DecodeError> for IcwError {
    fn from(err: bincode::error::DecodeError) -> Self {
        IcwError::Deserialization(Box::new(err))
    }
}

impl From<serde_json::Error> for IcwError {
    fn from(err: serde_json::Error) -> Self {
        IcwError::Json(err)
    }
}

impl From<csv::Error> for IcwError {
    fn from(err: csv::Error) -> Self {
        IcwError::Csv(err)
    }
}

impl From<std::io::Error> for IcwError {
    fn from(err: std::io::Error) -> Self {
        IcwError::Io(err)
    }
}

impl From<tokio::task::JoinError> for IcwError {
    fn from(err: tokio::task::JoinError) -> Self {
        IcwError::Task(err.to_string())
    }
}

impl From<String> for IcwError {
    fn from(err: String) -> Self {
        IcwError::Other(err)
    }
}

impl From<&str> for IcwError {
    fn from(err: &str) -> Self {
        IcwError::Other(err.to_string())
    }
}
