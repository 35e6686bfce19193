//! MongoDB transport for docwire.
//!
//! This crate provides a [`Transport`](docwire_core::transport::Transport) backed by the
//! official MongoDB async driver. Writes are translated to the driver's insert, update,
//! replace and delete calls, and each outcome is reported as an error descriptor so the
//! connection's safe-mode bookkeeping works the same as with any other transport.
//!
//! To use this transport, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docwire = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Error mapping
//!
//! - Unreachable servers, DNS and authentication failures surface as transport errors
//! - Write and command errors keep the server's code and message
//!
//! # Example
//!
//! ```ignore
//! use docwire::{mongodb::MongoTransport, session::Connection, transport::TransportBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = MongoTransport::builder("mongodb://localhost:27017")
//!         .build()
//!         .await?;
//!     let connection = Connection::new(transport);
//!     let orders = connection.database("shop").collection::<bson::Document>("orders");
//!
//!     println!("{} orders", orders.count().await?);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwire_mongodb;

pub mod store;

pub use store::{MongoTransport, MongoTransportBuilder};
