//! In-memory transport for docwire.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Transport`
//! trait, ideal for development and tests. It understands the same selectors, update
//! operators and administrative commands the collection facade sends, and reports
//! write failures as coded error descriptors, so safe-mode behavior can be exercised
//! without a server.
//!
//! # Features
//!
//! - **Selectors** - Dotted paths, array matching, comparison, membership and logical operators
//! - **Updates** - `$set`, `$unset`, `$inc`, `$push`, `$pull`, `$addToSet`, replacements and upserts
//! - **Commands** - `count`, `findandmodify`, `drop` and `ping`
//! - **Fault injection** - Fail the next call with a transport error
//!
//! # Quick Start
//!
//! ```ignore
//! use docwire::{session::Connection, memory::InMemoryTransport};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::new(InMemoryTransport::new());
//!     let people = connection.database("app").collection::<bson::Document>("people");
//!
//!     people.insert(&mut doc! { "name": "Alice" }, true).await?;
//!     assert_eq!(people.count().await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwire_memory;

mod apply;
mod evaluator;
mod fault;
pub mod store;

pub use store::{InMemoryTransport, InMemoryTransportBuilder};
