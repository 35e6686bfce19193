//! Named databases on a connection.

use bson::Document;

use crate::{
    collection::Collection,
    document::{Entity, Record},
    error::DocumentStoreResult,
    session::Connection,
    transport::{Namespace, Transport},
};

/// A handle to one database of a connection. Cheap to create; holds no state of its own.
#[derive(Debug)]
pub struct Database<'a, B: Transport> {
    name: String,
    connection: &'a Connection<B>,
}

impl<'a, B: Transport> Database<'a, B> {
    pub(crate) fn new(name: String, connection: &'a Connection<B>) -> Self {
        Self { name, connection }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &'a Connection<B> {
        self.connection
    }

    /// Returns the named collection, reading and writing `T`.
    ///
    /// Use `bson::Document` for `T` to work with untyped documents.
    pub fn collection<T: Record>(&self, name: &str) -> Collection<'a, B, T> {
        Collection::new(self.connection, Namespace::new(self.name.clone(), name))
    }

    /// Returns the collection an entity type declares for itself.
    pub fn typed_collection<T: Entity>(&self) -> Collection<'a, B, T> {
        self.collection(T::collection_name())
    }

    /// Sends an administrative command to this database and returns the raw response.
    pub async fn run_command(&self, command: Document) -> DocumentStoreResult<Document> {
        self.connection
            .command(&self.name, command)
            .await
    }
}
