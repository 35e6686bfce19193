//! Connections and the session-scoped error state.
//!
//! A [`Connection`] owns a transport and the two error slots every write updates:
//!
//! - **last-error**: the outcome of the most recent logical operation.
//! - **previous-error**: the most recent *failed* outcome since the slots were last
//!   reset. Batched inserts and multi-document updates are checked against this slot,
//!   since a failure in the middle of a batch may be followed by successes.
//!
//! The slots belong to the connection, not to a collection: every collection and
//! cursor derived from a connection shares them. Interleaving operations from
//! different logical callers on one connection means a safe-mode check may observe
//! somebody else's error. Callers that mutate concurrently should hold one
//! connection each.

use bson::{Bson, Document};
use mea::rwlock::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::{
    command::command_name,
    database::Database,
    error::{DocumentStoreError, DocumentStoreResult, OperationKind},
    example::{ExampleConverter, FieldEqualityConverter},
    gate::{DefaultErrorTranslator, ErrorTranslator},
    transport::{Namespace, QueryRequest, Transport, WriteOp},
};

/// Default number of documents a cursor pulls per round trip.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// The store's verdict on one logical write operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDescriptor {
    /// Store-specific error code, when one was reported.
    pub code: Option<i32>,
    /// Error message; its presence is what makes the descriptor an error.
    pub message: Option<String>,
    /// Number of documents the operation touched.
    pub affected: u64,
    /// Whether an update modified an existing document rather than upserting.
    pub updated_existing: bool,
    /// Identifier of the document created by an upsert.
    pub upserted: Option<Bson>,
}

impl ErrorDescriptor {
    /// A successful outcome touching `affected` documents.
    pub fn success(affected: u64) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }

    /// A failed outcome.
    pub fn failure(code: impl Into<Option<i32>>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_updated_existing(mut self, updated_existing: bool) -> Self {
        self.updated_existing = updated_existing;
        self
    }

    pub fn with_upserted(mut self, id: Bson) -> Self {
        self.upserted = Some(id);
        self
    }

    /// Returns `true` when this outcome reports an error.
    pub fn is_error(&self) -> bool {
        self.message.is_some()
    }
}

/// The two error slots of a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorState {
    last: ErrorDescriptor,
    previous: ErrorDescriptor,
}

impl ErrorState {
    /// Applies the outcome of one logical operation.
    pub fn record(&mut self, outcome: ErrorDescriptor) {
        if outcome.is_error() {
            self.previous = outcome.clone();
        }
        self.last = outcome;
    }

    /// Clears both slots.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn last_error(&self) -> &ErrorDescriptor {
        &self.last
    }

    pub fn previous_error(&self) -> &ErrorDescriptor {
        &self.previous
    }
}

/// Settings supplied to a connection when it is created.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Documents a cursor pulls per round trip.
    pub batch_size: u32,
    /// Turns error descriptors found by safe-mode checks into faults.
    pub translator: Arc<dyn ErrorTranslator>,
    /// Turns example values into equality selectors.
    pub example_converter: Arc<dyn ExampleConverter>,
}

impl ConnectionOptions {
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::default()
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            translator: Arc::new(DefaultErrorTranslator),
            example_converter: Arc::new(FieldEqualityConverter),
        }
    }
}

/// Builder for [`ConnectionOptions`].
#[derive(Debug, Default)]
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    /// Sets the cursor batch size. Zero is treated as one.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = batch_size.max(1);
        self
    }

    pub fn translator(mut self, translator: impl ErrorTranslator + 'static) -> Self {
        self.options.translator = Arc::new(translator);
        self
    }

    pub fn example_converter(mut self, converter: impl ExampleConverter + 'static) -> Self {
        self.options.example_converter = Arc::new(converter);
        self
    }

    pub fn build(self) -> ConnectionOptions {
        self.options
    }
}

/// A logical connection to a document store.
///
/// # Example
///
/// ```ignore
/// use docwire::{session::Connection, memory::InMemoryTransport};
///
/// let connection = Connection::new(InMemoryTransport::new());
/// let orders = connection.database("shop").collection::<bson::Document>("orders");
/// ```
#[derive(Debug)]
pub struct Connection<B: Transport> {
    transport: B,
    errors: RwLock<ErrorState>,
    options: ConnectionOptions,
}

impl<B: Transport> Connection<B> {
    /// Creates a connection with default options.
    pub fn new(transport: B) -> Self {
        Self::with_options(transport, ConnectionOptions::default())
    }

    pub fn with_options(transport: B, options: ConnectionOptions) -> Self {
        Self {
            transport,
            errors: RwLock::new(ErrorState::default()),
            options,
        }
    }

    /// Returns a handle to the named database.
    pub fn database(&self, name: &str) -> Database<'_, B> {
        Database::new(name.to_string(), self)
    }

    pub fn transport(&self) -> &B {
        &self.transport
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Returns the outcome of the most recent logical write.
    pub async fn last_error(&self) -> ErrorDescriptor {
        self.errors.read().await.last_error().clone()
    }

    /// Returns the most recent failure recorded since the last reset.
    pub async fn previous_error(&self) -> ErrorDescriptor {
        self.errors.read().await.previous_error().clone()
    }

    /// Clears both error slots.
    pub async fn reset_error(&self) {
        debug!("resetting connection error state");
        self.errors.write().await.reset();
    }

    /// Sends a write and folds its outcomes into the error state.
    pub(crate) async fn write(&self, namespace: &Namespace, op: WriteOp) -> DocumentStoreResult<()> {
        let operation = op.kind();
        let outcomes = self
            .transport
            .send_write(namespace, op)
            .await
            .map_err(|source| DocumentStoreError::operation(operation, namespace, source))?;

        let mut errors = self.errors.write().await;
        for outcome in outcomes {
            if let Some(message) = &outcome.message {
                debug!(%namespace, %operation, code = ?outcome.code, message = %message, "write reported an error");
            }
            errors.record(outcome);
        }

        Ok(())
    }

    /// Sends a command to `database`. Failures propagate unchanged.
    pub(crate) async fn command(&self, database: &str, command: Document) -> DocumentStoreResult<Document> {
        debug!(database, command = %command_name(&command), "sending command");
        self.transport
            .send_command(database, command)
            .await
    }

    pub(crate) async fn query(
        &self,
        namespace: &Namespace,
        request: QueryRequest,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.transport
            .query(namespace, request)
            .await
            .map_err(|source| DocumentStoreError::operation(OperationKind::Query, namespace, source))
    }

    /// Shuts the connection down and releases the transport.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.transport.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_replaces_last_but_keeps_previous_failure() {
        let mut state = ErrorState::default();
        state.record(ErrorDescriptor::failure(11000, "E11000 duplicate key"));
        state.record(ErrorDescriptor::success(1));

        assert!(!state.last_error().is_error());
        assert_eq!(state.previous_error().code, Some(11000));
    }

    #[test]
    fn newer_failure_replaces_previous() {
        let mut state = ErrorState::default();
        state.record(ErrorDescriptor::failure(11000, "first"));
        state.record(ErrorDescriptor::failure(14, "second"));

        assert_eq!(state.previous_error().message.as_deref(), Some("second"));
        assert_eq!(state.last_error().code, Some(14));
    }

    #[test]
    fn reset_clears_both_slots() {
        let mut state = ErrorState::default();
        state.record(ErrorDescriptor::failure(2, "bad"));
        state.reset();

        assert_eq!(state, ErrorState::default());
    }

    #[test]
    fn batch_size_is_never_zero() {
        assert_eq!(ConnectionOptions::builder().batch_size(0).build().batch_size, 1);
        assert_eq!(ConnectionOptions::default().batch_size, DEFAULT_BATCH_SIZE);
    }
}
