//! Error types and result types for collection operations.
//!
//! Every fallible call in this crate returns [`DocumentStoreResult<T>`]. Transport
//! faults raised while writing are wrapped in [`DocumentStoreError::Operation`] so the
//! caller can see which operation on which namespace failed; command failures are
//! surfaced as [`DocumentStoreError::Command`] unless the collection facade absorbs
//! them as a benign outcome.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

use crate::transport::Namespace;

/// The kind of wire operation a fault was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Query,
    Command,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Query => "query",
            OperationKind::Command => "command",
        })
    }
}

/// Represents all possible errors raised by a connection, its collections and cursors.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Conversion between a typed entity and a BSON document failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The transport could not be created or configured.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A value that had to be a document was something else.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A command envelope could not be built from the supplied parts.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    /// An I/O level failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),
    /// A fault raised while executing an operation against a namespace.
    #[error("{operation} on {namespace} failed: {source}")]
    Operation {
        operation: OperationKind,
        namespace: String,
        #[source]
        source: Box<DocumentStoreError>,
    },
    /// The store rejected an administrative command.
    #[error("Command {command} failed: {message}")]
    Command {
        command: String,
        code: Option<i32>,
        message: String,
    },
    /// A safe-mode check found a unique index violation.
    #[error("Duplicate key in {namespace}: {message}")]
    DuplicateKey { namespace: String, message: String },
    /// A safe-mode check found any other write error.
    #[error("Write to {namespace} failed: {message}")]
    Safemode {
        namespace: String,
        code: Option<i32>,
        message: String,
    },
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Wraps `source` with the operation and namespace it was raised from.
    pub fn operation(operation: OperationKind, namespace: &Namespace, source: DocumentStoreError) -> Self {
        DocumentStoreError::Operation {
            operation,
            namespace: namespace.to_string(),
            source: Box::new(source),
        }
    }

    /// Builds a command failure.
    pub fn command(command: impl Into<String>, code: impl Into<Option<i32>>, message: impl Into<String>) -> Self {
        DocumentStoreError::Command {
            command: command.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for collection operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_fault_names_namespace_and_kind() {
        let namespace = Namespace::new("shop", "orders");
        let err = DocumentStoreError::operation(
            OperationKind::Insert,
            &namespace,
            DocumentStoreError::Transport("connection reset".into()),
        );

        assert_eq!(
            err.to_string(),
            "insert on shop.orders failed: Transport error: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
