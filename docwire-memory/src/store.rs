//! In-memory transport implementation.
//!
//! Documents live in insertion-ordered vectors keyed by fully qualified namespace,
//! behind an async-aware read-write lock. Writes report their outcomes as error
//! descriptors the way a real store does, so the safe-mode protocol behaves the same
//! against this transport as against a server.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace};

use docwire_core::{
    command::command_name,
    error::{DocumentStoreError, DocumentStoreResult},
    session::ErrorDescriptor,
    transport::{Namespace, QueryRequest, Transport, TransportBuilder, WriteOp},
    update::{UpdateFlags, is_operator_document},
};

use crate::{
    apply::{apply_update, ensure_identifier, upsert_document},
    evaluator::{compare_by, matching_indices, project, truthy, values_equal},
    fault::{COMMAND_NOT_FOUND, DUPLICATE_KEY, FAILED_TO_PARSE, Fault, NAMESPACE_NOT_FOUND},
};

type CollectionVec = Vec<Document>;
type StoreMap = HashMap<String, CollectionVec>;

const NO_MATCH: &str = "No matching object found";

/// Thread-safe in-memory transport.
///
/// `InMemoryTransport` is cloneable and uses an `Arc`-wrapped internal state; clones
/// share the same data. Queries scan every document of a namespace.
///
/// # Example
///
/// ```ignore
/// use docwire_memory::InMemoryTransport;
/// use docwire_core::session::Connection;
/// use bson::doc;
///
/// let connection = Connection::new(InMemoryTransport::new());
/// let people = connection.database("app").collection::<bson::Document>("people");
/// people.insert(&mut doc! { "name": "Ada" }, true).await?;
/// assert_eq!(people.count().await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryTransport {
    store: Arc<RwLock<StoreMap>>,
    fault: Arc<RwLock<Option<String>>>,
}

impl InMemoryTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryTransportBuilder {
        InMemoryTransportBuilder::default()
    }

    /// Makes the next transport call fail with a [`DocumentStoreError::Transport`] error.
    pub async fn inject_fault(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "injecting transport fault");
        *self.fault.write().await = Some(message);
    }

    /// Returns a snapshot of the documents stored in `namespace`.
    pub async fn documents(&self, namespace: &Namespace) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(&namespace.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the namespaces that currently exist.
    pub async fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    async fn take_fault(&self) -> DocumentStoreResult<()> {
        match self.fault.write().await.take() {
            Some(message) => Err(DocumentStoreError::Transport(message)),
            None => Ok(()),
        }
    }
}

fn duplicate_key(namespace: &str, id: &Bson) -> Fault {
    Fault::new(
        DUPLICATE_KEY,
        format!("E11000 duplicate key error collection: {namespace} index: _id_ dup key: {{ _id: {id} }}"),
    )
}

fn contains_id(collection: &[Document], id: &Bson) -> bool {
    collection
        .iter()
        .any(|document| document.get("_id").is_some_and(|existing| values_equal(existing, id)))
}

/// Inserts documents in order, stopping at the first duplicate identifier.
fn insert(collection: &mut CollectionVec, namespace: &str, documents: Vec<Document>) -> Vec<ErrorDescriptor> {
    let mut outcomes = Vec::with_capacity(documents.len());

    for mut document in documents {
        let id = match ensure_identifier(&mut document) {
            Ok(id) => id,
            Err(fault) => {
                outcomes.push(fault.into_descriptor());
                break;
            }
        };
        if contains_id(collection, &id) {
            outcomes.push(duplicate_key(namespace, &id).into_descriptor());
            break;
        }

        collection.push(document);
        outcomes.push(ErrorDescriptor::success(1));
    }

    outcomes
}

fn update(
    store: &mut StoreMap,
    namespace: &str,
    selector: &Document,
    update: &Document,
    flags: UpdateFlags,
) -> Result<ErrorDescriptor, Fault> {
    let multi = flags.contains(UpdateFlags::MULTI_UPDATE);
    if multi && !is_operator_document(update) {
        return Err(Fault::new(FAILED_TO_PARSE, "multi update only works with $ operators"));
    }

    let mut matched = match store.get(namespace) {
        Some(collection) => matching_indices(collection, selector)?,
        None => Vec::new(),
    };

    if matched.is_empty() {
        if !flags.contains(UpdateFlags::UPSERT) {
            return Ok(ErrorDescriptor::success(0));
        }

        let mut created = upsert_document(selector, update)?;
        let id = ensure_identifier(&mut created)?;
        let collection = store.entry(namespace.to_string()).or_default();
        if contains_id(collection, &id) {
            return Err(duplicate_key(namespace, &id));
        }
        collection.push(created);

        return Ok(ErrorDescriptor::success(1).with_upserted(id));
    }

    if !multi {
        matched.truncate(1);
    }
    if let Some(collection) = store.get_mut(namespace) {
        for index in &matched {
            collection[*index] = apply_update(&collection[*index], update)?;
        }
    }

    Ok(ErrorDescriptor::success(matched.len() as u64).with_updated_existing(true))
}

fn delete(store: &mut StoreMap, namespace: &str, selector: &Document) -> Result<ErrorDescriptor, Fault> {
    let Some(collection) = store.get_mut(namespace) else {
        return Ok(ErrorDescriptor::success(0));
    };

    let removed = matching_indices(collection, selector)?;
    let mut index = 0;
    collection.retain(|_| {
        let keep = removed.binary_search(&index).is_err();
        index += 1;
        keep
    });

    Ok(ErrorDescriptor::success(removed.len() as u64))
}

fn collection_argument<'c>(command: &'c Document, name: &str) -> DocumentStoreResult<&'c str> {
    match command.get(name) {
        Some(Bson::String(collection)) => Ok(collection),
        _ => Err(DocumentStoreError::command(
            name,
            FAILED_TO_PARSE,
            format!("{name} requires a collection name"),
        )),
    }
}

fn document_argument(command: &Document, key: &str) -> Document {
    match command.get(key) {
        Some(Bson::Document(document)) => document.clone(),
        _ => Document::new(),
    }
}

fn flag_argument(command: &Document, key: &str) -> bool {
    command.get(key).is_some_and(truthy)
}

fn count(store: &StoreMap, database: &str, name: &str, command: &Document) -> DocumentStoreResult<Document> {
    let namespace = format!("{database}.{}", collection_argument(command, name)?);
    let Some(collection) = store.get(&namespace) else {
        return Err(DocumentStoreError::command(name, NAMESPACE_NOT_FOUND, "ns missing"));
    };

    let selector = document_argument(command, "query");
    let n = matching_indices(collection, &selector)
        .map_err(|fault| fault.into_command_error(name))?
        .len();

    Ok(doc! { "n": n as i64, "ok": 1.0 })
}

fn find_and_modify(store: &mut StoreMap, database: &str, name: &str, command: &Document) -> DocumentStoreResult<Document> {
    let namespace = format!("{database}.{}", collection_argument(command, name)?);
    let selector = document_argument(command, "query");
    let sort = document_argument(command, "sort");
    let fields = document_argument(command, "fields");
    let update = document_argument(command, "update");
    let remove = flag_argument(command, "remove");
    let return_new = flag_argument(command, "new");
    let upsert = flag_argument(command, "upsert");
    let fault = |fault: Fault| fault.into_command_error(name);

    let target = match store.get(&namespace) {
        Some(collection) => matching_indices(collection, &selector)
            .map_err(fault)?
            .into_iter()
            .min_by(|a, b| compare_by(&sort, &collection[*a], &collection[*b]).then(a.cmp(b))),
        None => None,
    };

    let value = match (target, store.get_mut(&namespace)) {
        (Some(index), Some(collection)) => {
            if remove {
                Bson::Document(collection.remove(index))
            } else {
                let updated = apply_update(&collection[index], &update).map_err(fault)?;
                let previous = std::mem::replace(&mut collection[index], updated.clone());
                Bson::Document(if return_new { updated } else { previous })
            }
        }
        _ => {
            if remove || !upsert {
                return Err(DocumentStoreError::command(name, None::<i32>, NO_MATCH));
            }

            let mut created = upsert_document(&selector, &update).map_err(fault)?;
            ensure_identifier(&mut created).map_err(fault)?;
            store
                .entry(namespace)
                .or_default()
                .push(created.clone());

            if return_new { Bson::Document(created) } else { Bson::Null }
        }
    };

    let value = match value {
        Bson::Document(document) => Bson::Document(project(document, &fields)),
        other => other,
    };

    Ok(doc! { "value": value, "ok": 1.0 })
}

fn drop_collection(store: &mut StoreMap, database: &str, name: &str, command: &Document) -> DocumentStoreResult<Document> {
    let namespace = format!("{database}.{}", collection_argument(command, name)?);
    if store.remove(&namespace).is_none() {
        return Err(DocumentStoreError::command(name, NAMESPACE_NOT_FOUND, "ns not found"));
    }

    Ok(doc! { "ns": namespace, "ok": 1.0 })
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send_write(&self, namespace: &Namespace, op: WriteOp) -> DocumentStoreResult<Vec<ErrorDescriptor>> {
        self.take_fault().await?;
        trace!(%namespace, operation = %op.kind(), "applying write");

        let key = namespace.to_string();
        let mut store = self.store.write().await;

        Ok(match op {
            WriteOp::Insert { documents } => {
                let collection = store.entry(key.clone()).or_default();
                insert(collection, &key, documents)
            }
            WriteOp::Update { selector, update: payload, flags } => {
                vec![update(&mut store, &key, &selector, &payload, flags).unwrap_or_else(Fault::into_descriptor)]
            }
            WriteOp::Delete { selector } => {
                vec![delete(&mut store, &key, &selector).unwrap_or_else(Fault::into_descriptor)]
            }
        })
    }

    async fn send_command(&self, database: &str, command: Document) -> DocumentStoreResult<Document> {
        self.take_fault().await?;

        let name = command_name(&command);
        trace!(database, command = %name, "running command");

        match name.to_ascii_lowercase().as_str() {
            "count" => count(&*self.store.read().await, database, &name, &command),
            "findandmodify" => find_and_modify(&mut *self.store.write().await, database, &name, &command),
            "drop" => drop_collection(&mut *self.store.write().await, database, &name, &command),
            "ping" => Ok(doc! { "ok": 1.0 }),
            _ => Err(DocumentStoreError::command(
                name.as_str(),
                COMMAND_NOT_FOUND,
                format!("no such command: '{name}'"),
            )),
        }
    }

    async fn query(&self, namespace: &Namespace, request: QueryRequest) -> DocumentStoreResult<Vec<Document>> {
        self.take_fault().await?;

        let store = self.store.read().await;
        let Some(collection) = store.get(&namespace.to_string()) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<Document> = matching_indices(collection, &request.selector)
            .map_err(|fault| fault.into_command_error("find"))?
            .into_iter()
            .map(|index| collection[index].clone())
            .collect();

        if let Some(sort) = &request.sort {
            selected.sort_by(|a, b| compare_by(sort, a, b));
        }

        let skip = usize::try_from(request.skip).unwrap_or(usize::MAX);
        let limit = request
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(selected
            .into_iter()
            .skip(skip)
            .take(limit)
            .collect())
    }
}

/// Builder for [`InMemoryTransport`] instances.
#[derive(Default)]
pub struct InMemoryTransportBuilder;

#[async_trait]
impl TransportBuilder for InMemoryTransportBuilder {
    type Transport = InMemoryTransport;

    /// Builds a fresh, empty transport. Always succeeds.
    async fn build(self) -> DocumentStoreResult<Self::Transport> {
        Ok(InMemoryTransport::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace() -> Namespace {
        Namespace::new("app", "people")
    }

    async fn seeded() -> InMemoryTransport {
        let transport = InMemoryTransport::new();
        transport
            .send_write(
                &namespace(),
                WriteOp::Insert {
                    documents: vec![
                        doc! { "_id": 1, "name": "Ada", "age": 36 },
                        doc! { "_id": 2, "name": "Bob", "age": 25 },
                        doc! { "_id": 3, "name": "Cy", "age": 41 },
                    ],
                },
            )
            .await
            .unwrap();
        transport
    }

    #[tokio::test]
    async fn insert_stops_at_first_duplicate() {
        let transport = seeded().await;

        let outcomes = transport
            .send_write(
                &namespace(),
                WriteOp::Insert {
                    documents: vec![doc! { "_id": 4 }, doc! { "_id": 1 }, doc! { "_id": 5 }],
                },
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_error());
        assert_eq!(outcomes[1].code, Some(DUPLICATE_KEY));
        assert!(outcomes[1].message.as_deref().is_some_and(|m| m.starts_with("E11000")));
        assert_eq!(transport.documents(&namespace()).await.len(), 4);
    }

    #[tokio::test]
    async fn insert_assigns_missing_identifiers() {
        let transport = InMemoryTransport::new();
        transport
            .send_write(&namespace(), WriteOp::Insert { documents: vec![doc! { "name": "x" }] })
            .await
            .unwrap();

        let stored = transport.documents(&namespace()).await;
        assert!(matches!(stored[0].get("_id"), Some(Bson::ObjectId(_))));
    }

    #[tokio::test]
    async fn single_and_multi_updates() {
        let transport = seeded().await;

        let single = transport
            .send_write(
                &namespace(),
                WriteOp::Update {
                    selector: doc! { "age": { "$gt": 30 } },
                    update: doc! { "$inc": { "age": 1 } },
                    flags: UpdateFlags::empty(),
                },
            )
            .await
            .unwrap();
        assert_eq!(single[0].affected, 1);
        assert!(single[0].updated_existing);

        let multi = transport
            .send_write(
                &namespace(),
                WriteOp::Update {
                    selector: doc! {},
                    update: doc! { "$set": { "seen": true } },
                    flags: UpdateFlags::MULTI_UPDATE,
                },
            )
            .await
            .unwrap();
        assert_eq!(multi[0].affected, 3);

        let stored = transport.documents(&namespace()).await;
        assert_eq!(stored[0].get("age"), Some(&Bson::Int32(37)));
        assert_eq!(stored[2].get("age"), Some(&Bson::Int32(41)));
        assert!(stored.iter().all(|d| d.get("seen") == Some(&Bson::Boolean(true))));
    }

    #[tokio::test]
    async fn multi_update_rejects_replacements() {
        let transport = seeded().await;

        let outcomes = transport
            .send_write(
                &namespace(),
                WriteOp::Update {
                    selector: doc! {},
                    update: doc! { "name": "all" },
                    flags: UpdateFlags::MULTI_UPDATE,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcomes[0].code, Some(FAILED_TO_PARSE));
    }

    #[tokio::test]
    async fn upsert_creates_from_selector() {
        let transport = InMemoryTransport::new();

        let outcomes = transport
            .send_write(
                &namespace(),
                WriteOp::Update {
                    selector: doc! { "_id": 9 },
                    update: doc! { "name": "new" },
                    flags: UpdateFlags::UPSERT,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcomes[0].upserted, Some(Bson::Int32(9)));
        assert!(!outcomes[0].updated_existing);
        assert_eq!(transport.documents(&namespace()).await, vec![doc! { "name": "new", "_id": 9 }]);
    }

    #[tokio::test]
    async fn delete_with_empty_selector_removes_everything() {
        let transport = seeded().await;

        let outcomes = transport
            .send_write(&namespace(), WriteOp::Delete { selector: doc! {} })
            .await
            .unwrap();

        assert_eq!(outcomes[0].affected, 3);
        assert!(transport.documents(&namespace()).await.is_empty());
        assert_eq!(transport.namespaces().await, vec!["app.people".to_string()]);
    }

    #[tokio::test]
    async fn count_reports_missing_namespace() {
        let transport = seeded().await;

        let response = transport
            .send_command("app", doc! { "count": "people", "query": { "age": { "$lt": 40 } } })
            .await
            .unwrap();
        assert_eq!(response.get("n"), Some(&Bson::Int64(2)));

        let missing = transport
            .send_command("app", doc! { "count": "ghosts", "query": {} })
            .await;
        assert!(matches!(
            missing,
            Err(DocumentStoreError::Command { code: Some(NAMESPACE_NOT_FOUND), .. })
        ));
    }

    #[tokio::test]
    async fn find_and_modify_honors_sort_new_and_fields() {
        let transport = seeded().await;

        let response = transport
            .send_command(
                "app",
                doc! {
                    "findAndModify": "people",
                    "query": {},
                    "update": { "$set": { "picked": true } },
                    "sort": { "age": -1 },
                    "new": true,
                    "fields": { "name": 1 },
                },
            )
            .await
            .unwrap();

        assert_eq!(response.get("value"), Some(&Bson::Document(doc! { "_id": 3, "name": "Cy" })));
    }

    #[tokio::test]
    async fn find_and_modify_without_match() {
        let transport = seeded().await;

        let result = transport
            .send_command(
                "app",
                doc! { "findandmodify": "people", "query": { "name": "Zed" }, "update": { "$set": { "n": 1 } } },
            )
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Command { message, .. }) if message == NO_MATCH));
    }

    #[tokio::test]
    async fn find_and_remove_returns_removed_document() {
        let transport = seeded().await;

        let response = transport
            .send_command(
                "app",
                doc! { "findandmodify": "people", "query": { "name": "Bob" }, "remove": true },
            )
            .await
            .unwrap();

        assert_eq!(response.get_document("value").unwrap().get("_id"), Some(&Bson::Int32(2)));
        assert_eq!(transport.documents(&namespace()).await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_commands_are_rejected() {
        let transport = InMemoryTransport::new();

        let result = transport.send_command("app", doc! { "eval": "1" }).await;

        assert!(matches!(
            result,
            Err(DocumentStoreError::Command { code: Some(COMMAND_NOT_FOUND), .. })
        ));
        assert!(transport.send_command("app", doc! { "ping": 1 }).await.is_ok());
    }

    #[tokio::test]
    async fn query_sorts_skips_and_limits() {
        let transport = seeded().await;

        let batch = transport
            .query(
                &namespace(),
                QueryRequest {
                    selector: doc! {},
                    sort: Some(doc! { "age": 1 }),
                    skip: 1,
                    limit: Some(1),
                    batch_size: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(batch, vec![doc! { "_id": 1, "name": "Ada", "age": 36 }]);
    }

    #[tokio::test]
    async fn injected_fault_fails_the_next_call_only() {
        let transport = seeded().await;
        transport.inject_fault("socket closed").await;

        let first = transport.query(&namespace(), QueryRequest::default()).await;
        assert!(matches!(first, Err(DocumentStoreError::Transport(message)) if message == "socket closed"));
        assert!(transport.query(&namespace(), QueryRequest::default()).await.is_ok());
    }
}
