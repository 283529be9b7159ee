//! Error types for network setup and status reconciliation.

use thiserror::Error;

/// Errors that can occur while preparing or tracking VM networking.
#[derive(Error, Debug)]
pub enum NetError {
    /// A cache record (or other looked-up object) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache record encoding/decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A cache node was used as both a leaf and a container.
    #[error("Cache error: {0}")]
    Cache(String),

    /// The pod-side link for a network could not be resolved.
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    /// The OS networking collaborator reported a failure.
    #[error("Network handler failed: {0}")]
    Handler(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network is in an invalid state for the requested operation.
    #[error("Invalid network state: {0}")]
    InvalidState(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Non-retryable networking failure. The VM cannot proceed and the
    /// host daemon must surface this to the control plane.
    #[error("Critical network error: {0}")]
    Critical(#[source] Box<NetError>),

    /// Process-fatal failure, e.g. a DHCP server that could not be started.
    /// The top-level VM supervisor tears the VM process down on this.
    #[error("Fatal: {0}")]
    Fatal(String),

    /// Several independent failures collected from one pass.
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<NetError>),
}

fn join_errors(errors: &[NetError]) -> String {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} error(s): {}", errors.len(), messages.join("; "))
}

impl NetError {
    /// Escalate an error to a critical network error. Already-critical
    /// errors are returned as is.
    pub fn critical(err: NetError) -> Self {
        match err {
            NetError::Critical(_) => err,
            other => NetError::Critical(Box::new(other)),
        }
    }

    /// Collapse a list of errors: `None` when empty, the single error
    /// when there is one, `Aggregate` otherwise.
    pub fn aggregate(mut errors: Vec<NetError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(NetError::Aggregate(errors)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            NetError::NotFound(_) => true,
            NetError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, NetError::Critical(_))
    }

    /// True if this error, or any error it aggregates, is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            NetError::Fatal(_) => true,
            NetError::Critical(inner) => inner.is_fatal(),
            NetError::Aggregate(errors) => errors.iter().any(NetError::is_fatal),
            _ => false,
        }
    }

    /// The error a `Critical` escalated, or `self` for any other variant.
    pub fn root_cause(&self) -> &NetError {
        match self {
            NetError::Critical(inner) => inner.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_does_not_nest() {
        let err = NetError::critical(NetError::critical(NetError::LinkNotFound("eth0".into())));
        assert!(err.is_critical());
        assert!(matches!(err.root_cause(), NetError::LinkNotFound(name) if name == "eth0"));
        assert_eq!(err.to_string(), "Critical network error: Link not found: eth0");
    }

    #[test]
    fn test_aggregate_collapses() {
        assert!(NetError::aggregate(vec![]).is_none());

        let single = NetError::aggregate(vec![NetError::Handler("boom".into())]).unwrap();
        assert!(matches!(single, NetError::Handler(_)));

        let many = NetError::aggregate(vec![
            NetError::Handler("a".into()),
            NetError::Fatal("b".into()),
        ])
        .unwrap();
        assert!(many.is_fatal());
        assert_eq!(
            many.to_string(),
            "2 error(s): Network handler failed: a; Fatal: b"
        );
    }

    #[test]
    fn test_io_not_found() {
        let err: NetError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(err.is_not_found());
        assert!(!NetError::Cache("x".into()).is_not_found());
    }
}
