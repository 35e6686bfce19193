//! Convenient re-exports of commonly used types from docwire.
//!
//! ```ignore
//! use docwire::prelude::*;
//! ```

pub use docwire_core::{
    collection::Collection,
    command::FindAndModifyOptions,
    cursor::Cursor,
    database::Database,
    document::{Descriptor, DocumentExt, Entity, Record},
    error::{DocumentStoreError, DocumentStoreResult, OperationKind},
    example::{ExampleConverter, FieldEqualityConverter},
    gate::{DefaultErrorTranslator, ErrorTranslator},
    map_reduce::{MapReduce, MapReduceOutput},
    query::{Expr, FieldOp, Filter, QueryVisitor, Sort, SortDirection},
    session::{Connection, ConnectionOptions, ErrorDescriptor},
    transport::{Namespace, QueryRequest, Transport, TransportBuilder, WriteOp},
    update::UpdateFlags,
};
pub use docwire_macros::Entity;
