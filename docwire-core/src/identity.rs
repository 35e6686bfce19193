//! Identifier assignment.
//!
//! Nothing is handed to the transport for insertion without an identifier. When
//! one is missing, the record's descriptor generates it and writes it back into the
//! caller's value before serialization, so the caller observes the new identifier.

use bson::{Bson, Document, doc};

use crate::{document::Descriptor, error::DocumentStoreResult};

/// Returns the record's identifier, generating and storing one if it is unset.
///
/// # Errors
///
/// Returns an error if the generated value cannot be written into the identifier field.
pub fn assign_identifier<T: Descriptor>(record: &mut T) -> DocumentStoreResult<Bson> {
    if let Some(existing) = record.identifier() {
        return Ok(existing);
    }

    let generated = record.generate_identifier();
    record.set_identifier(generated.clone())?;

    Ok(generated)
}

/// Builds the `{ <id field>: value }` selector addressing a single record.
pub fn identifier_selector<T: Descriptor>(value: Bson) -> Document {
    doc! { T::id_field(): value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identifier_is_generated_and_written_back() {
        let mut document = doc! { "name": "Grace" };
        let assigned = assign_identifier(&mut document).unwrap();

        assert!(matches!(assigned, Bson::ObjectId(_)));
        assert_eq!(document.get("_id"), Some(&assigned));
    }

    #[test]
    fn present_identifier_is_kept() {
        let mut document = doc! { "_id": "fixed", "name": "Grace" };
        let assigned = assign_identifier(&mut document).unwrap();

        assert_eq!(assigned, Bson::String("fixed".into()));
        assert_eq!(document, doc! { "_id": "fixed", "name": "Grace" });
    }

    #[test]
    fn selector_uses_the_descriptor_field() {
        assert_eq!(identifier_selector::<Document>(Bson::Int32(4)), doc! { "_id": 4 });
    }
}
