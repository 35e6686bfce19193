//! Query-by-example.
//!
//! An example is any serializable value; the connection's [`ExampleConverter`]
//! turns it into a selector. The default [`FieldEqualityConverter`] matches on every
//! field the example sets.

use bson::{Bson, Document, ser::serialize_to_bson};
use serde::Serialize;
use std::fmt::Debug;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    session::ConnectionOptions,
};

/// Turns an example value into a selector document.
pub trait ExampleConverter: Send + Sync + Debug {
    fn convert(&self, example: Bson) -> DocumentStoreResult<Document>;
}

/// Builds an equality selector from the example's set fields.
///
/// Null fields are ignored. Nested documents are flattened into dotted paths, so
/// `{ address: { city: "Oslo" } }` matches any document whose address has that city
/// regardless of its other address fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldEqualityConverter;

impl FieldEqualityConverter {
    fn flatten(prefix: Option<&str>, example: Document, selector: &mut Document) {
        for (key, value) in example {
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{key}"),
                None => key,
            };

            match value {
                Bson::Null => {}
                Bson::Document(nested) if !nested.is_empty() => {
                    Self::flatten(Some(&path), nested, selector);
                }
                other => {
                    selector.insert(path, other);
                }
            }
        }
    }
}

impl ExampleConverter for FieldEqualityConverter {
    fn convert(&self, example: Bson) -> DocumentStoreResult<Document> {
        let Bson::Document(example) = example else {
            return Err(DocumentStoreError::InvalidDocument(
                "an example must serialize to a document".to_string(),
            ));
        };

        let mut selector = Document::new();
        Self::flatten(None, example, &mut selector);
        Ok(selector)
    }
}

pub(crate) fn example_selector<E: Serialize + ?Sized>(
    options: &ConnectionOptions,
    example: &E,
) -> DocumentStoreResult<Document> {
    options
        .example_converter
        .convert(serialize_to_bson(example)?)
}
