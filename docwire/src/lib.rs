//! Main docwire crate providing a typed collection facade over a document store.
//!
//! This crate is the primary entry point for users of docwire. It re-exports the core
//! types from the sub-crates and gives access to the available transports.
//!
//! # Features
//!
//! - **Typed and untyped collections** - Work with serde entities or raw BSON documents
//! - **Safe mode** - Opt into write acknowledgement per call and get typed failures back
//! - **Benign command outcomes** - Counting a missing collection or modifying nothing is not an error
//! - **Cursors** - Lazy batched iteration, also available as a `futures` stream
//! - **Pluggable transports** - In-memory for tests, MongoDB behind the `mongodb` feature
//!
//! # Quick Start
//!
//! ```ignore
//! use docwire::{prelude::*, memory::InMemoryTransport};
//! use bson::{doc, oid::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! #[entity(collection = "users")]
//! pub struct User {
//!     #[entity(id)]
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let connection = Connection::new(InMemoryTransport::new());
//!     let users = connection.database("app").typed_collection::<User>();
//!
//!     let mut user = User { id: None, name: "Alice".to_string() };
//!     users.insert(&mut user, true).await?;
//!     assert!(user.id.is_some());
//!
//!     users.update(doc! { "name": "Alicia" }, doc! { "name": "Alice" }, UpdateFlags::empty(), true).await?;
//!
//!     let renamed = users
//!         .find(Filter::eq("name", "Alicia").to_selector()?)
//!         .try_collect_all()
//!         .await?;
//!     println!("{renamed:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Transports
//!
//! - [`memory`] - In-memory transport for development and testing
//! - [`mongodb`] - MongoDB transport (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docwire;

pub mod prelude;

pub use docwire_core::{
    collection, command, cursor, database, document, error, example, gate, identity, map_reduce, query, session,
    transport, update,
};
pub use docwire_macros::Entity;

// Re-export BSON types for convenience
pub use bson;

/// In-memory transport implementation.
pub mod memory {
    pub use docwire_memory::{InMemoryTransport, InMemoryTransportBuilder};
}

/// MongoDB transport implementation.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docwire_mongodb::{MongoTransport, MongoTransportBuilder};
}
