//! Administrative command envelopes and their special-case responses.
//!
//! Two command failures are treated as ordinary outcomes rather than faults:
//!
//! - `count` against a namespace that does not exist answers `0`; a missing
//!   collection behaves like an empty one.
//! - `findandmodify` that matches nothing answers `None`.
//!
//! Every other command failure propagates unchanged.

use bson::{Bson, Document, doc};
use tracing::debug;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    session::Connection,
    transport::{Namespace, Transport},
    update::normalize_update,
};

/// Server code for a namespace that does not exist.
const NAMESPACE_NOT_FOUND: i32 = 26;

const NAMESPACE_MISSING_MESSAGES: [&str; 3] = ["ns missing", "ns not found", "ns does not exist"];

const NO_MATCH_MESSAGE: &str = "No matching object found";

/// Returns the name of a command: the first key of its envelope.
pub fn command_name(command: &Document) -> String {
    command
        .keys()
        .next()
        .cloned()
        .unwrap_or_default()
}

/// Options for a find-and-modify command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    /// Which matching document to pick when several match.
    pub sort: Option<Document>,
    /// Return the document as it is after the update instead of before.
    pub return_new: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
    /// Projection applied to the returned document.
    pub fields: Option<Document>,
}

impl FindAndModifyOptions {
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn return_new(mut self, return_new: bool) -> Self {
        self.return_new = return_new;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn fields(mut self, fields: Document) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// `{ count: <collection>, query: <selector> }`
pub fn count_envelope(collection: &str, selector: Document) -> Document {
    doc! {
        "count": collection,
        "query": selector,
    }
}

/// `{ findandmodify: <collection>, query, update, sort, new }`, with `upsert` and
/// `fields` added when requested. The update is normalized first.
pub fn find_and_modify_envelope(
    collection: &str,
    update: Document,
    selector: Document,
    options: &FindAndModifyOptions,
) -> Document {
    let mut command = doc! {
        "findandmodify": collection,
        "query": selector,
        "update": normalize_update(update),
        "sort": options.sort.clone().unwrap_or_default(),
        "new": options.return_new,
    };

    if options.upsert {
        command.insert("upsert", true);
    }
    if let Some(fields) = &options.fields {
        command.insert("fields", fields.clone());
    }

    command
}

/// `{ findandmodify: <collection>, query, sort, remove: true }`
pub fn find_and_remove_envelope(collection: &str, selector: Document, sort: Option<Document>) -> Document {
    doc! {
        "findandmodify": collection,
        "query": selector,
        "sort": sort.unwrap_or_default(),
        "remove": true,
    }
}

/// Reads the `n` field of a count response.
pub fn read_count(response: &Document) -> DocumentStoreResult<u64> {
    match response.get("n") {
        Some(Bson::Int32(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
        Some(Bson::Int64(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
        Some(Bson::Double(n)) => Ok(*n as u64),
        _ => Err(DocumentStoreError::InvalidDocument(
            "count response carries no numeric `n`".to_string(),
        )),
    }
}

fn is_namespace_missing(err: &DocumentStoreError) -> bool {
    match err {
        DocumentStoreError::Command { code, message, .. } => {
            *code == Some(NAMESPACE_NOT_FOUND)
                || NAMESPACE_MISSING_MESSAGES
                    .iter()
                    .any(|needle| message.contains(needle))
        }
        _ => false,
    }
}

fn is_no_match(err: &DocumentStoreError) -> bool {
    matches!(err, DocumentStoreError::Command { message, .. } if message.contains(NO_MATCH_MESSAGE))
}

/// Sends command envelopes for one namespace and interprets their responses.
#[derive(Debug)]
pub(crate) struct CommandBuilder<'a, B: Transport> {
    connection: &'a Connection<B>,
    namespace: &'a Namespace,
}

impl<'a, B: Transport> CommandBuilder<'a, B> {
    pub(crate) fn new(connection: &'a Connection<B>, namespace: &'a Namespace) -> Self {
        Self { connection, namespace }
    }

    pub(crate) async fn run(&self, command: Document) -> DocumentStoreResult<Document> {
        self.connection
            .command(self.namespace.database(), command)
            .await
    }

    pub(crate) async fn count(&self, selector: Document) -> DocumentStoreResult<u64> {
        match self
            .run(count_envelope(self.namespace.collection(), selector))
            .await
        {
            Ok(response) => read_count(&response),
            Err(err) if is_namespace_missing(&err) => {
                debug!(namespace = %self.namespace, "count on missing namespace, answering 0");
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Sends a find-and-modify envelope and returns the `value` it answers with.
    pub(crate) async fn find_and_modify(&self, command: Document) -> DocumentStoreResult<Option<Document>> {
        match self.run(command).await {
            Ok(mut response) => match response.remove("value") {
                Some(Bson::Document(value)) => Ok(Some(value)),
                _ => Ok(None),
            },
            Err(err) if is_no_match(&err) => {
                debug!(namespace = %self.namespace, "findandmodify matched nothing");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
