//! Transport abstraction: the wire collaborator a connection talks through.
//!
//! A [`Transport`] carries three kinds of traffic:
//!
//! - **Writes** ([`WriteOp`]) addressed to a fully qualified [`Namespace`]. The store's
//!   verdict on each logical operation comes back as an [`ErrorDescriptor`]; a failed
//!   insert or update is an outcome, not an `Err`. Only I/O level faults are errors.
//! - **Commands** sent to a database's administrative channel. A command the store
//!   rejects is returned as [`DocumentStoreError::Command`](crate::error::DocumentStoreError::Command).
//! - **Queries** fetching one batch of documents for a cursor.
//!
//! Message framing, connection lifecycle and authentication all live behind this trait.
//!
//! # Example
//!
//! ```ignore
//! use docwire::transport::{Namespace, Transport, WriteOp};
//! use bson::doc;
//!
//! let namespace = Namespace::new("shop", "orders");
//! let outcomes = transport
//!     .send_write(&namespace, WriteOp::Delete { selector: doc! { "status": "void" } })
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::{self, Debug};

use crate::{
    error::{DocumentStoreResult, OperationKind},
    session::ErrorDescriptor,
    update::UpdateFlags,
};

/// A fully qualified collection name: `database.collection`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A single wire write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a batch of documents, each already carrying an identifier.
    Insert { documents: Vec<Document> },
    /// Apply `update` to the documents matching `selector`.
    Update {
        selector: Document,
        update: Document,
        flags: UpdateFlags,
    },
    /// Delete every document matching `selector`.
    Delete { selector: Document },
}

impl WriteOp {
    pub fn kind(&self) -> OperationKind {
        match self {
            WriteOp::Insert { .. } => OperationKind::Insert,
            WriteOp::Update { .. } => OperationKind::Update,
            WriteOp::Delete { .. } => OperationKind::Delete,
        }
    }
}

/// Parameters for fetching one batch of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// Filter the documents must match. Empty matches everything.
    pub selector: Document,
    /// Sort specification, `{ field: 1 | -1, ... }`.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return in this batch.
    pub limit: Option<u64>,
    /// Hint for how many documents the transport should pull per round trip.
    pub batch_size: Option<u32>,
}

/// Wire collaborator used by a [`Connection`](crate::session::Connection).
///
/// Implementations must be `Send + Sync`; the connection holding them is shared by
/// every collection derived from it.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Sends a write to `namespace`.
    ///
    /// # Returns
    ///
    /// One [`ErrorDescriptor`] per logical operation executed, in execution order. A
    /// batched insert yields one outcome per document it attempted.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Transport`](crate::error::DocumentStoreError::Transport)
    /// when the write could not be delivered.
    async fn send_write(
        &self,
        namespace: &Namespace,
        op: WriteOp,
    ) -> DocumentStoreResult<Vec<ErrorDescriptor>>;

    /// Sends an administrative command to `database` and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Command`](crate::error::DocumentStoreError::Command)
    /// when the store rejects the command, or a transport error on I/O failure.
    async fn send_command(
        &self,
        database: &str,
        command: Document,
    ) -> DocumentStoreResult<Document>;

    /// Fetches one batch of documents matching `request`.
    async fn query(
        &self,
        namespace: &Namespace,
        request: QueryRequest,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Releases the transport's resources. The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory for transports that need asynchronous setup.
#[async_trait]
pub trait TransportBuilder {
    type Transport: Transport;

    async fn build(self) -> DocumentStoreResult<Self::Transport>;
}
