//! The mutation pipeline: identifier assignment, wire writes and safe-mode checks.
//!
//! Which error slot a write is checked against depends on its shape:
//!
//! | write                 | reset before | checked slot   |
//! |-----------------------|--------------|----------------|
//! | insert (any size)     | if safe      | previous-error |
//! | update, single        | no           | last-error     |
//! | update, multi         | if safe      | previous-error |
//! | remove                | no           | last-error     |
//! | save, no identifier   | if safe      | previous-error |
//! | save, with identifier | no           | last-error     |

use bson::Document;
use tracing::debug;

use crate::{
    document::{DocumentExt, Record},
    error::DocumentStoreResult,
    gate::ErrorGate,
    identity::{assign_identifier, identifier_selector},
    session::Connection,
    transport::{Namespace, Transport, WriteOp},
    update::{UpdateFlags, normalize_update},
};

#[derive(Debug)]
pub(crate) struct MutationPipeline<'a, B: Transport> {
    connection: &'a Connection<B>,
    namespace: &'a Namespace,
}

impl<'a, B: Transport> MutationPipeline<'a, B> {
    pub(crate) fn new(connection: &'a Connection<B>, namespace: &'a Namespace) -> Self {
        Self { connection, namespace }
    }

    fn gate(&self) -> ErrorGate<'a, B> {
        ErrorGate::new(self.connection, self.namespace)
    }

    /// Assigns missing identifiers in place, then inserts every record in one batch.
    ///
    /// In safe mode the error state is reset first, so the check afterwards only sees
    /// failures caused by this batch.
    pub(crate) async fn insert<T: Record>(&self, records: &mut [T], safe_mode: bool) -> DocumentStoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let documents = records
            .iter_mut()
            .map(|record| {
                assign_identifier(record)?;
                record.to_document()
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        if safe_mode {
            self.connection.reset_error().await;
        }

        debug!(namespace = %self.namespace, count = documents.len(), safe_mode, "inserting documents");
        self.connection
            .write(self.namespace, WriteOp::Insert { documents })
            .await?;

        self.gate()
            .check_previous_error(safe_mode)
            .await
    }

    /// Updates the first matching document; literal updates are wrapped in `$set`.
    pub(crate) async fn update(
        &self,
        update: Document,
        selector: Document,
        flags: UpdateFlags,
        safe_mode: bool,
    ) -> DocumentStoreResult<()> {
        self.send_update(selector, normalize_update(update), flags, safe_mode)
            .await
    }

    /// Updates every matching document.
    ///
    /// In safe mode the error state is reset first, so the check afterwards only sees
    /// failures caused by this call.
    pub(crate) async fn update_all(
        &self,
        update: Document,
        selector: Document,
        flags: UpdateFlags,
        safe_mode: bool,
    ) -> DocumentStoreResult<()> {
        if safe_mode {
            self.connection.reset_error().await;
        }

        let flags = flags | UpdateFlags::MULTI_UPDATE;
        debug!(namespace = %self.namespace, ?flags, safe_mode, "updating all matching documents");
        self.connection
            .write(
                self.namespace,
                WriteOp::Update {
                    selector,
                    update: normalize_update(update),
                    flags,
                },
            )
            .await?;

        self.gate()
            .check_previous_error(safe_mode)
            .await
    }

    /// Deletes every document matching `selector`.
    pub(crate) async fn remove(&self, selector: Document, safe_mode: bool) -> DocumentStoreResult<()> {
        debug!(namespace = %self.namespace, safe_mode, "removing documents");
        self.connection
            .write(self.namespace, WriteOp::Delete { selector })
            .await?;

        self.gate()
            .check_last_error(safe_mode)
            .await
    }

    /// Inserts a record without an identifier; otherwise replaces the stored document
    /// with the same identifier, creating it if absent.
    pub(crate) async fn save<T: Record>(&self, record: &mut T, safe_mode: bool) -> DocumentStoreResult<()> {
        let Some(id) = record.identifier() else {
            return self
                .insert(std::slice::from_mut(record), safe_mode)
                .await;
        };

        let replacement = record.to_document()?;
        self.send_update(
            identifier_selector::<T>(id),
            replacement,
            UpdateFlags::UPSERT,
            safe_mode,
        )
        .await
    }

    async fn send_update(
        &self,
        selector: Document,
        update: Document,
        flags: UpdateFlags,
        safe_mode: bool,
    ) -> DocumentStoreResult<()> {
        debug!(namespace = %self.namespace, ?flags, safe_mode, "updating document");
        self.connection
            .write(self.namespace, WriteOp::Update { selector, update, flags })
            .await?;

        self.gate()
            .check_last_error(safe_mode)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DocumentStoreError, session::ErrorDescriptor, testing::RecordingTransport};
    use bson::{Bson, doc};

    fn namespace() -> Namespace {
        Namespace::new("app", "people")
    }

    #[tokio::test]
    async fn insert_assigns_identifiers_before_sending() {
        let connection = Connection::new(RecordingTransport::new());
        let namespace = namespace();
        let mut records = vec![doc! { "name": "a" }, doc! { "_id": 5, "name": "b" }];

        MutationPipeline::new(&connection, &namespace)
            .insert(&mut records, true)
            .await
            .unwrap();

        assert!(matches!(records[0].get("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(records[1].get("_id"), Some(&Bson::Int32(5)));
        let writes = connection.transport().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, WriteOp::Insert { documents: records.clone() });
    }

    #[tokio::test]
    async fn empty_insert_sends_nothing() {
        let connection = Connection::new(RecordingTransport::new());
        let namespace = namespace();
        let mut records: Vec<Document> = Vec::new();

        MutationPipeline::new(&connection, &namespace)
            .insert(&mut records, true)
            .await
            .unwrap();

        assert!(connection.transport().writes().is_empty());
    }

    #[tokio::test]
    async fn batch_failure_followed_by_success_still_raises() {
        let transport = RecordingTransport::new();
        transport.push_outcomes(vec![
            ErrorDescriptor::failure(11000, "E11000 duplicate key"),
            ErrorDescriptor::success(1),
        ]);
        let connection = Connection::new(transport);
        let namespace = namespace();
        let mut records = vec![doc! { "_id": 1 }, doc! { "_id": 2 }];

        let result = MutationPipeline::new(&connection, &namespace)
            .insert(&mut records, true)
            .await;

        assert!(matches!(result, Err(DocumentStoreError::DuplicateKey { .. })));
        assert!(!connection.last_error().await.is_error());
    }

    #[tokio::test]
    async fn single_update_checks_last_error_only() {
        let transport = RecordingTransport::new();
        transport.push_outcomes(vec![ErrorDescriptor::failure(11000, "E11000 duplicate key")]);
        let connection = Connection::new(transport);
        let namespace = namespace();
        let pipeline = MutationPipeline::new(&connection, &namespace);

        assert!(pipeline.insert(&mut [doc! { "_id": 1 }], false).await.is_ok());
        pipeline
            .update(doc! { "n": 1 }, doc! { "_id": 1 }, UpdateFlags::empty(), true)
            .await
            .unwrap();

        assert!(connection.previous_error().await.is_error());
        let writes = connection.transport().writes();
        assert_eq!(
            writes[1].1,
            WriteOp::Update {
                selector: doc! { "_id": 1 },
                update: doc! { "$set": { "n": 1 } },
                flags: UpdateFlags::empty(),
            }
        );
    }

    #[tokio::test]
    async fn update_all_resets_stale_errors_in_safe_mode() {
        let transport = RecordingTransport::new();
        transport.push_outcomes(vec![ErrorDescriptor::failure(11000, "E11000 duplicate key")]);
        let connection = Connection::new(transport);
        let namespace = namespace();
        let pipeline = MutationPipeline::new(&connection, &namespace);

        pipeline.insert(&mut [doc! { "_id": 1 }], false).await.unwrap();
        pipeline
            .update_all(doc! { "$inc": { "n": 1 } }, doc! {}, UpdateFlags::empty(), true)
            .await
            .unwrap();

        let writes = connection.transport().writes();
        assert!(matches!(
            &writes[1].1,
            WriteOp::Update { flags, .. } if flags.contains(UpdateFlags::MULTI_UPDATE)
        ));
        assert!(!connection.previous_error().await.is_error());
    }

    #[tokio::test]
    async fn save_with_identifier_upserts_the_raw_document() {
        let connection = Connection::new(RecordingTransport::new());
        let namespace = namespace();
        let mut record = doc! { "_id": 9, "name": "kept" };

        MutationPipeline::new(&connection, &namespace)
            .save(&mut record, true)
            .await
            .unwrap();

        let writes = connection.transport().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].1,
            WriteOp::Update {
                selector: doc! { "_id": 9 },
                update: doc! { "_id": 9, "name": "kept" },
                flags: UpdateFlags::UPSERT,
            }
        );
    }

    #[tokio::test]
    async fn save_without_identifier_inserts() {
        let connection = Connection::new(RecordingTransport::new());
        let namespace = namespace();
        let mut record = doc! { "name": "new" };

        MutationPipeline::new(&connection, &namespace)
            .save(&mut record, true)
            .await
            .unwrap();

        assert!(record.get("_id").is_some());
        let writes = connection.transport().writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(writes[0].1, WriteOp::Insert { .. }));
    }

    #[tokio::test]
    async fn safe_insert_ignores_an_earlier_failure() {
        let transport = RecordingTransport::new();
        transport.push_outcomes(vec![ErrorDescriptor::failure(11000, "E11000 duplicate key")]);
        let connection = Connection::new(transport);
        let namespace = namespace();
        let pipeline = MutationPipeline::new(&connection, &namespace);

        let stale = pipeline.insert(&mut [doc! { "_id": 1 }], true).await;
        assert!(matches!(stale, Err(DocumentStoreError::DuplicateKey { .. })));

        pipeline.insert(&mut [doc! { "_id": 2 }], true).await.unwrap();
        pipeline.save(&mut doc! { "name": "fresh" }, true).await.unwrap();

        assert!(!connection.previous_error().await.is_error());
        assert_eq!(connection.transport().writes().len(), 3);
    }

    #[tokio::test]
    async fn unsafe_insert_keeps_the_earlier_failure() {
        let transport = RecordingTransport::new();
        transport.push_outcomes(vec![ErrorDescriptor::failure(11000, "E11000 duplicate key")]);
        let connection = Connection::new(transport);
        let namespace = namespace();
        let pipeline = MutationPipeline::new(&connection, &namespace);

        pipeline.insert(&mut [doc! { "_id": 1 }], false).await.unwrap();
        pipeline.insert(&mut [doc! { "_id": 2 }], false).await.unwrap();

        assert_eq!(connection.previous_error().await.code, Some(11000));
    }

    #[tokio::test]
    async fn transport_faults_are_wrapped() {
        let transport = RecordingTransport::new();
        transport.fail_next_write("connection reset");
        let connection = Connection::new(transport);
        let namespace = namespace();

        let result = MutationPipeline::new(&connection, &namespace)
            .remove(doc! {}, false)
            .await;

        assert!(matches!(
            result,
            Err(DocumentStoreError::Operation { operation: crate::error::OperationKind::Delete, .. })
        ));
    }
}
