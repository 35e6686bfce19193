//! The collection facade.
//!
//! A [`Collection`] is one implementation serving two surfaces: a typed one reading
//! and writing `T`, and an untyped one over [`bson::Document`] (the default type
//! parameter). Both go through the same code path and produce identical wire traffic;
//! [`Collection::with_type`] and [`Collection::untyped`] switch between them.
//!
//! Queries are delegated to a lazy [`Cursor`]. Mutations run through the mutation
//! pipeline, which assigns identifiers and performs safe-mode checks. `count` and
//! find-and-modify are administrative commands whose benign failures come back as
//! `0` and `None`.
//!
//! # Example
//!
//! ```ignore
//! use docwire::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! #[entity(collection = "users")]
//! pub struct User {
//!     #[entity(id)]
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<bson::oid::ObjectId>,
//!     pub name: String,
//! }
//!
//! let connection = Connection::new(InMemoryTransport::new());
//! let users = connection.database("app").typed_collection::<User>();
//!
//! let mut user = User { id: None, name: "Alice".to_string() };
//! users.insert(&mut user, true).await?;
//! assert!(user.id.is_some());
//!
//! let found = users.find_one(doc! { "name": "Alice" }).await?;
//! ```

use bson::{Bson, Document, doc};
use serde::Serialize;
use std::marker::PhantomData;

use crate::{
    command::{CommandBuilder, FindAndModifyOptions, find_and_modify_envelope, find_and_remove_envelope},
    cursor::Cursor,
    document::{DocumentExt, Record},
    error::DocumentStoreResult,
    example::example_selector,
    identity::identifier_selector,
    map_reduce::MapReduce,
    pipeline::MutationPipeline,
    session::Connection,
    transport::{Namespace, Transport},
    update::UpdateFlags,
};

/// A collection of `T` on one connection.
#[derive(Debug)]
pub struct Collection<'a, B: Transport, T = Document> {
    connection: &'a Connection<B>,
    namespace: Namespace,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, B: Transport, T> Clone for Collection<'a, B, T> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection,
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<'a, B: Transport, T: Record> Collection<'a, B, T> {
    pub(crate) fn new(connection: &'a Connection<B>, namespace: Namespace) -> Self {
        Self {
            connection,
            namespace,
            _marker: PhantomData,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        self.namespace.collection()
    }

    /// Returns the fully qualified `database.collection` namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn connection(&self) -> &'a Connection<B> {
        self.connection
    }

    /// Views the same collection as holding `U`.
    pub fn with_type<U: Record>(&self) -> Collection<'a, B, U> {
        Collection::new(self.connection, self.namespace.clone())
    }

    /// Views the same collection as untyped documents.
    pub fn untyped(&self) -> Collection<'a, B, Document> {
        self.with_type()
    }

    fn pipeline(&self) -> MutationPipeline<'_, B> {
        MutationPipeline::new(self.connection, &self.namespace)
    }

    fn commands(&self) -> CommandBuilder<'_, B> {
        CommandBuilder::new(self.connection, &self.namespace)
    }

    // Queries

    /// Returns a lazy cursor over the documents matching `selector`.
    pub fn find(&self, selector: Document) -> Cursor<'a, B, T> {
        Cursor::new(self.connection, self.namespace.clone(), selector)
    }

    /// Returns a lazy cursor over every document.
    pub fn find_all(&self) -> Cursor<'a, B, T> {
        self.find(Document::new())
    }

    /// Returns the first document matching `selector`, or `None`.
    pub async fn find_one(&self, selector: Document) -> DocumentStoreResult<Option<T>> {
        self.find(selector)
            .limit(1)
            .next()
            .await
    }

    /// Returns the document with the given identifier, or `None`.
    pub async fn find_one_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<T>> {
        self.find_one(identifier_selector::<T>(id.into()))
            .await
    }

    /// Returns a cursor over the documents equal to `example` on every field it sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the example cannot be converted into a selector.
    pub fn find_by_example<E: Serialize + ?Sized>(&self, example: &E) -> DocumentStoreResult<Cursor<'a, B, T>> {
        let selector = example_selector(self.connection.options(), example)?;
        Ok(self.find(selector))
    }

    pub async fn find_one_by_example<E: Serialize + ?Sized>(&self, example: &E) -> DocumentStoreResult<Option<T>> {
        self.find_by_example(example)?
            .limit(1)
            .next()
            .await
    }

    /// Counts every document. A collection that does not exist counts as empty.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.count_matching(Document::new())
            .await
    }

    /// Counts the documents matching `selector`.
    pub async fn count_matching(&self, selector: Document) -> DocumentStoreResult<u64> {
        self.commands()
            .count(selector)
            .await
    }

    /// Atomically updates the first document matching `selector` and returns it.
    ///
    /// Returns the document as it was before the update unless `return_new` is set, and
    /// `None` when nothing matched. Literal updates are wrapped in `$set`.
    pub async fn find_and_modify(
        &self,
        update: Document,
        selector: Document,
        sort: Option<Document>,
        return_new: bool,
    ) -> DocumentStoreResult<Option<T>> {
        let options = FindAndModifyOptions {
            sort,
            return_new,
            ..FindAndModifyOptions::default()
        };

        self.find_and_modify_with(update, selector, options)
            .await
    }

    /// [`find_and_modify`](Self::find_and_modify) with the full set of options.
    pub async fn find_and_modify_with(
        &self,
        update: Document,
        selector: Document,
        options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<T>> {
        let command = find_and_modify_envelope(self.name(), update, selector, &options);

        self.decode(self.commands().find_and_modify(command).await?)
    }

    /// Atomically removes the first document matching `selector` and returns it.
    pub async fn find_and_remove(
        &self,
        selector: Document,
        sort: Option<Document>,
    ) -> DocumentStoreResult<Option<T>> {
        let command = find_and_remove_envelope(self.name(), selector, sort);

        self.decode(self.commands().find_and_modify(command).await?)
    }

    /// Starts a map-reduce over this collection.
    pub fn map_reduce(&self) -> MapReduce<'a, B, T> {
        MapReduce::new(self.connection, self.namespace.clone())
    }

    // Mutations

    /// Inserts one record, assigning its identifier first if it is unset.
    pub async fn insert(&self, record: &mut T, safe_mode: bool) -> DocumentStoreResult<()> {
        self.pipeline()
            .insert(std::slice::from_mut(record), safe_mode)
            .await
    }

    /// Inserts a batch of records in one write. Identifiers are assigned in place.
    ///
    /// In safe mode a failure anywhere in the batch is raised, even when later
    /// documents went in.
    pub async fn insert_many(&self, records: &mut [T], safe_mode: bool) -> DocumentStoreResult<()> {
        self.pipeline()
            .insert(records, safe_mode)
            .await
    }

    /// Updates the first document matching `selector`.
    ///
    /// `update` is either an operator document (`{ "$inc": { "n": 1 } }`) or a plain
    /// field document, which is applied as `$set`.
    pub async fn update(
        &self,
        update: Document,
        selector: Document,
        flags: UpdateFlags,
        safe_mode: bool,
    ) -> DocumentStoreResult<()> {
        self.pipeline()
            .update(update, selector, flags, safe_mode)
            .await
    }

    /// Updates every document matching `selector`.
    pub async fn update_all(&self, update: Document, selector: Document, safe_mode: bool) -> DocumentStoreResult<()> {
        self.pipeline()
            .update_all(update, selector, UpdateFlags::empty(), safe_mode)
            .await
    }

    /// Removes every document matching `selector`. An empty selector empties the collection.
    pub async fn remove(&self, selector: Document, safe_mode: bool) -> DocumentStoreResult<()> {
        self.pipeline()
            .remove(selector, safe_mode)
            .await
    }

    /// Removes the document with the given identifier.
    pub async fn remove_by_id(&self, id: impl Into<Bson>, safe_mode: bool) -> DocumentStoreResult<()> {
        self.remove(identifier_selector::<T>(id.into()), safe_mode)
            .await
    }

    /// Inserts `record` if it has no identifier, otherwise replaces the stored document
    /// with that identifier, creating it if needed.
    pub async fn save(&self, record: &mut T, safe_mode: bool) -> DocumentStoreResult<()> {
        self.pipeline()
            .save(record, safe_mode)
            .await
    }

    /// Removes every document, keeping the collection.
    pub async fn truncate(&self, safe_mode: bool) -> DocumentStoreResult<()> {
        self.remove(doc! {}, safe_mode)
            .await
    }

    fn decode(&self, document: Option<Document>) -> DocumentStoreResult<Option<T>> {
        document
            .map(T::from_document)
            .transpose()
    }
}
