//! Descriptors bridging typed entities and BSON documents.
//!
//! A [`Descriptor`] knows where a value keeps its identifier and how to mint a new
//! one. [`Entity`] adds the collection a type lives in. Any descriptor that is also
//! serde-serializable is a [`Record`] and can be used with a
//! [`Collection`](crate::collection::Collection); plain [`bson::Document`]s are
//! records too, which is what the untyped surface is built on.

use bson::{Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// The field name the store uses for identifiers unless a type says otherwise.
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Reads, writes and generates the identifier of a stored value.
///
/// # Example
///
/// ```ignore
/// use docwire::document::{Descriptor, Entity};
/// use bson::{Bson, oid::ObjectId};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub name: String,
/// }
///
/// impl Descriptor for User {
///     fn identifier(&self) -> Option<Bson> {
///         self.id.map(Bson::ObjectId)
///     }
///
///     fn set_identifier(&mut self, value: Bson) -> docwire::error::DocumentStoreResult<()> {
///         self.id = Some(bson::de::deserialize_from_bson(value)?);
///         Ok(())
///     }
/// }
///
/// impl Entity for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
///
/// Most types derive both traits with `#[derive(Entity)]` instead.
pub trait Descriptor: Serialize {
    /// The serialized name of the identifier field.
    fn id_field() -> &'static str
    where
        Self: Sized,
    {
        DEFAULT_ID_FIELD
    }

    /// Returns the current identifier, or `None` when it is unset.
    fn identifier(&self) -> Option<Bson>;

    /// Writes `value` into the identifier field.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be converted into the field's type.
    fn set_identifier(&mut self, value: Bson) -> DocumentStoreResult<()>;

    /// Generates a fresh identifier for this value. Defaults to a new [`ObjectId`].
    fn generate_identifier(&self) -> Bson {
        Bson::ObjectId(ObjectId::new())
    }

    /// Returns the serialized property names of this value.
    fn property_names(&self) -> Vec<String> {
        match serialize_to_bson(self) {
            Ok(Bson::Document(document)) => document.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// A typed descriptor that also knows the collection it is stored in.
pub trait Entity: Descriptor + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection this type belongs to.
    fn collection_name() -> &'static str;
}

/// Anything a collection can read and write: a serializable descriptor.
///
/// Implemented automatically; both derived entities and [`bson::Document`] qualify.
pub trait Record: Descriptor + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Descriptor + DeserializeOwned + Send + Sync + 'static {}

impl Descriptor for Document {
    fn identifier(&self) -> Option<Bson> {
        match self.get(DEFAULT_ID_FIELD) {
            None | Some(Bson::Null) => None,
            Some(value) => Some(value.clone()),
        }
    }

    fn set_identifier(&mut self, value: Bson) -> DocumentStoreResult<()> {
        // The identifier goes first, the way the server lays documents out.
        let rest = std::mem::take(self);
        *self = Document::from_iter(
            std::iter::once((DEFAULT_ID_FIELD.to_string(), value))
                .chain(rest.into_iter().filter(|(key, _)| key != DEFAULT_ID_FIELD)),
        );

        Ok(())
    }

    fn property_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// Conversion helpers available on every [`Record`].
pub trait DocumentExt: Record + Sized {
    /// Serializes this value into a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or does not produce a document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Deserializes a value from a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the type's shape.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;

    /// Converts this value to JSON.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a value from JSON.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<R: Record> DocumentExt for R {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a document, serialized to {:?}",
                other.element_type()
            ))),
        }
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn document_identifier_treats_null_as_unset() {
        assert_eq!(doc! { "_id": Bson::Null, "a": 1 }.identifier(), None);
        assert_eq!(doc! { "a": 1 }.identifier(), None);
        assert_eq!(doc! { "_id": 7, "a": 1 }.identifier(), Some(Bson::Int32(7)));
    }

    #[test]
    fn setting_a_document_identifier_puts_it_first() {
        let mut document = doc! { "name": "Ada", "_id": Bson::Null };
        document.set_identifier(Bson::Int32(3)).unwrap();

        assert_eq!(document, doc! { "_id": 3, "name": "Ada" });
        assert_eq!(document.keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn document_round_trips_through_record_conversion() {
        let document = doc! { "_id": 1, "tags": ["a", "b"] };
        let converted = document.to_document().unwrap();

        assert_eq!(Document::from_document(converted).unwrap(), document);
        assert_eq!(document.property_names(), vec!["_id", "tags"]);
    }
}
