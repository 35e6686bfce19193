use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use tracing::{debug, trace};

use docwire_core::{
    command::command_name,
    error::{DocumentStoreError, DocumentStoreResult},
    session::ErrorDescriptor,
    transport::{Namespace, QueryRequest, Transport, TransportBuilder, WriteOp},
    update::{UpdateFlags, is_operator_document},
};

/// Driver call used to carry an update write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateShape {
    Many,
    One,
    Replace,
}

fn update_shape(update: &Document, flags: UpdateFlags) -> UpdateShape {
    if flags.contains(UpdateFlags::MULTI_UPDATE) {
        UpdateShape::Many
    } else if is_operator_document(update) {
        UpdateShape::One
    } else {
        UpdateShape::Replace
    }
}

/// Errors meaning the server could not be reached, as opposed to the server
/// rejecting the operation.
fn is_transport_failure(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
    )
}

/// Turns a driver error raised by a write into the operation's outcome.
fn write_outcome(err: MongoError) -> DocumentStoreResult<ErrorDescriptor> {
    if is_transport_failure(&err) {
        return Err(DocumentStoreError::Transport(err.to_string()));
    }

    Ok(match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            ErrorDescriptor::failure(write_error.code, write_error.message.clone())
        }
        ErrorKind::Command(command_error) => {
            ErrorDescriptor::failure(command_error.code, command_error.message.clone())
        }
        _ => ErrorDescriptor::failure(None::<i32>, err.to_string()),
    })
}

/// Outcomes of an ordered batch insert: successes up to the first failed index,
/// then that failure. Later documents were never attempted.
fn ordered_insert_outcomes(attempted: usize, failures: &[(usize, i32, String)]) -> Vec<ErrorDescriptor> {
    let mut outcomes = Vec::with_capacity(attempted);

    for index in 0..attempted {
        match failures.iter().find(|(failed, _, _)| *failed == index) {
            Some((_, code, message)) => {
                outcomes.push(ErrorDescriptor::failure(*code, message.clone()));
                break;
            }
            None => outcomes.push(ErrorDescriptor::success(1)),
        }
    }

    outcomes
}

/// Turns a driver error raised by a batch insert into one outcome per attempted document.
fn insert_outcomes(attempted: usize, err: MongoError) -> DocumentStoreResult<Vec<ErrorDescriptor>> {
    if is_transport_failure(&err) {
        return Err(DocumentStoreError::Transport(err.to_string()));
    }

    let (failures, concern) = match err.kind.as_ref() {
        ErrorKind::InsertMany(failure) => (
            failure
                .write_errors
                .iter()
                .flatten()
                .map(|write_error| (write_error.index, write_error.code, write_error.message.clone()))
                .collect::<Vec<_>>(),
            failure
                .write_concern_error
                .as_ref()
                .map(|concern| ErrorDescriptor::failure(concern.code, concern.message.clone())),
        ),
        _ => return Ok(vec![write_outcome(err)?]),
    };

    let mut outcomes = ordered_insert_outcomes(attempted, &failures);
    outcomes.extend(concern);

    Ok(outcomes)
}

fn command_error(name: &str, err: MongoError) -> DocumentStoreError {
    if is_transport_failure(&err) {
        return DocumentStoreError::Transport(err.to_string());
    }

    match err.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            DocumentStoreError::command(name, command_error.code, command_error.message.clone())
        }
        _ => DocumentStoreError::command(name, None::<i32>, err.to_string()),
    }
}

fn update_descriptor(matched_count: u64, upserted_id: Option<Bson>) -> ErrorDescriptor {
    let affected = match upserted_id {
        Some(_) => 1,
        None => matched_count,
    };

    let descriptor = ErrorDescriptor::success(affected).with_updated_existing(matched_count > 0);
    match upserted_id {
        Some(id) => descriptor.with_upserted(id),
        None => descriptor,
    }
}

/// Transport backed by the official MongoDB driver.
#[derive(Debug, Clone)]
pub struct MongoTransport {
    client: Client,
}

impl MongoTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn builder(dsn: &str) -> MongoTransportBuilder {
        MongoTransportBuilder::new(dsn)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(namespace.database())
            .collection(namespace.collection())
    }

    /// Inserts the batch in one ordered write, reporting one outcome per attempted document.
    async fn insert(&self, namespace: &Namespace, documents: Vec<Document>) -> DocumentStoreResult<Vec<ErrorDescriptor>> {
        let attempted = documents.len();

        match self
            .get_collection(namespace)
            .insert_many(documents)
            .ordered(true)
            .await
        {
            Ok(_) => Ok(vec![ErrorDescriptor::success(1); attempted]),
            Err(err) => insert_outcomes(attempted, err),
        }
    }

    async fn update(
        &self,
        namespace: &Namespace,
        selector: Document,
        update: Document,
        flags: UpdateFlags,
    ) -> DocumentStoreResult<ErrorDescriptor> {
        let collection = self.get_collection(namespace);
        let upsert = flags.contains(UpdateFlags::UPSERT);

        let result = match update_shape(&update, flags) {
            UpdateShape::Many => collection.update_many(selector, update).upsert(upsert).await,
            UpdateShape::One => collection.update_one(selector, update).upsert(upsert).await,
            UpdateShape::Replace => collection.replace_one(selector, update).upsert(upsert).await,
        };

        match result {
            Ok(result) => Ok(update_descriptor(result.matched_count, result.upserted_id)),
            Err(err) => write_outcome(err),
        }
    }

    async fn delete(&self, namespace: &Namespace, selector: Document) -> DocumentStoreResult<ErrorDescriptor> {
        match self.get_collection(namespace).delete_many(selector).await {
            Ok(result) => Ok(ErrorDescriptor::success(result.deleted_count)),
            Err(err) => write_outcome(err),
        }
    }
}

#[async_trait]
impl Transport for MongoTransport {
    async fn send_write(&self, namespace: &Namespace, op: WriteOp) -> DocumentStoreResult<Vec<ErrorDescriptor>> {
        trace!(%namespace, operation = %op.kind(), "sending write");

        match op {
            WriteOp::Insert { documents } => self.insert(namespace, documents).await,
            WriteOp::Update { selector, update, flags } => Ok(vec![self.update(namespace, selector, update, flags).await?]),
            WriteOp::Delete { selector } => Ok(vec![self.delete(namespace, selector).await?]),
        }
    }

    async fn send_command(&self, database: &str, command: Document) -> DocumentStoreResult<Document> {
        let name = command_name(&command);

        self.client
            .database(database)
            .run_command(command)
            .await
            .map_err(|err| command_error(&name, err))
    }

    async fn query(&self, namespace: &Namespace, request: QueryRequest) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.sort = request.sort;
        options.batch_size = request.batch_size;
        if request.skip > 0 {
            options.skip = Some(request.skip);
        }
        if let Some(limit) = request.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        self.get_collection(namespace)
            .find(request.selector)
            .with_options(options)
            .await
            .map_err(|err| command_error("find", err))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|err| command_error("find", err))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoTransportBuilder {
    dsn: String,
}

impl MongoTransportBuilder {
    pub fn new(dsn: &str) -> Self {
        Self { dsn: dsn.to_string() }
    }
}

#[async_trait]
impl TransportBuilder for MongoTransportBuilder {
    type Transport = MongoTransport;

    async fn build(self) -> DocumentStoreResult<Self::Transport> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        debug!(hosts = ?options.hosts, "connecting to mongodb");

        Ok(MongoTransport::new(
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        ))
    }
}
