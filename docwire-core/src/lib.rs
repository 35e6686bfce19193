//! A typed document-collection facade over a single logical store connection.
//!
//! This crate is the core of the docwire project and provides:
//!
//! - **Connections** ([`session`]) - A transport plus the session-scoped last/previous error slots
//! - **Transport contract** ([`transport`]) - Writes, commands and query batches on the wire
//! - **Descriptors** ([`document`]) - Identifier access and conversion between entities and documents
//! - **Collections** ([`collection`]) - The typed and untyped query and mutation surface
//! - **Cursors** ([`cursor`]) - Lazy, batched query results
//! - **Commands** ([`command`]) - `count` and find-and-modify envelopes and their benign failures
//! - **Safe mode** ([`gate`]) - Post-write error checks and error translation
//! - **Updates** ([`update`]) - Operator normalization and write flags
//! - **Filters** ([`query`]) - Typed filter expressions rendered as selectors
//! - **Map-reduce** ([`map_reduce`]) - The `mapreduce` command builder
//! - **Errors** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docwire_core::session::Connection;
//! use bson::doc;
//!
//! let connection = Connection::new(transport);
//! let people = connection.database("app").collection::<bson::Document>("people");
//!
//! let mut ada = doc! { "name": "Ada" };
//! people.insert(&mut ada, true).await?;
//! people.update(doc! { "age": 36 }, doc! { "_id": ada.get("_id").cloned() }, UpdateFlags::empty(), true).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwire_core;

pub mod collection;
pub mod command;
pub mod cursor;
pub mod database;
pub mod document;
pub mod error;
pub mod example;
pub mod gate;
pub mod identity;
pub mod map_reduce;
pub mod query;
pub mod session;
pub mod transport;
pub mod update;

mod pipeline;

#[cfg(test)]
mod testing;
