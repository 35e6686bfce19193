//! Update application: operator documents, replacements and upserts.

use bson::{Bson, Document};

use docwire_core::{identity::assign_identifier, update::is_operator_document};

use crate::{
    evaluator::{matches_operators, values_equal},
    fault::{BAD_VALUE, FAILED_TO_PARSE, Fault, IMMUTABLE_FIELD, PATH_NOT_VIABLE, TYPE_MISMATCH},
};

const ID_FIELD: &str = "_id";

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head) {
            Some(Bson::Document(nested)) => get_path(nested, rest),
            _ => None,
        },
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<(), Fault> {
    let Some((head, rest)) = path.split_once('.') else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }
    match document.get_mut(head) {
        Some(Bson::Document(nested)) => set_path(nested, rest, value),
        _ => Err(Fault::new(
            PATH_NOT_VIABLE,
            format!("Cannot create field '{rest}' in element '{head}'"),
        )),
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(nested)) = document.get_mut(head) {
                remove_path(nested, rest);
            }
        }
    }
}

fn increment(current: &Bson, by: &Bson) -> Option<Bson> {
    Some(match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(*a) + i64::from(*b))),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).wrapping_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.wrapping_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.wrapping_add(*b)),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(a)? + b),
        _ => return None,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn array_field<'a>(document: &'a mut Document, path: &str, operator: &str) -> Result<Option<&'a mut Vec<Bson>>, Fault> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => match get_path_mut(document, parent) {
            Some(parent) => (parent, leaf),
            None => return Ok(None),
        },
        None => (document, path),
    };

    match parent.get_mut(leaf) {
        None => Ok(None),
        Some(Bson::Array(items)) => Ok(Some(items)),
        Some(_) => Err(Fault::new(
            BAD_VALUE,
            format!("Cannot apply {operator} to non-array field '{path}'"),
        )),
    }
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Document> {
    match path.split_once('.') {
        None => match document.get_mut(path) {
            Some(Bson::Document(nested)) => Some(nested),
            _ => None,
        },
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(nested)) => get_path_mut(nested, rest),
            _ => None,
        },
    }
}

fn apply_modifier(document: &mut Document, operator: &str, path: &str, value: &Bson) -> Result<(), Fault> {
    match operator {
        "$set" => set_path(document, path, value.clone()),
        "$unset" => {
            remove_path(document, path);
            Ok(())
        }
        "$inc" => {
            let next = match get_path(document, path) {
                None if as_f64(value).is_some() => value.clone(),
                None => return Err(non_numeric(path)),
                Some(current) => increment(current, value).ok_or_else(|| non_numeric(path))?,
            };
            set_path(document, path, next)
        }
        "$push" => match array_field(document, path, operator)? {
            Some(items) => {
                items.push(value.clone());
                Ok(())
            }
            None => set_path(document, path, Bson::Array(vec![value.clone()])),
        },
        "$addToSet" => match array_field(document, path, operator)? {
            Some(items) => {
                if !items.iter().any(|item| values_equal(item, value)) {
                    items.push(value.clone());
                }
                Ok(())
            }
            None => set_path(document, path, Bson::Array(vec![value.clone()])),
        },
        "$pull" => {
            if let Some(items) = array_field(document, path, operator)? {
                let mut kept = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    let pulled = match value {
                        Bson::Document(operators) if is_operator_document(operators) => {
                            matches_operators(&[&item], operators)?
                        }
                        _ => values_equal(&item, value),
                    };
                    if !pulled {
                        kept.push(item);
                    }
                }
                *items = kept;
            }
            Ok(())
        }
        other => Err(Fault::new(FAILED_TO_PARSE, format!("Unknown modifier: {other}"))),
    }
}

fn non_numeric(path: &str) -> Fault {
    Fault::new(
        TYPE_MISMATCH,
        format!("Cannot apply $inc to a value of non-numeric type at '{path}'"),
    )
}

fn apply_operators(mut document: Document, update: &Document) -> Result<Document, Fault> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(Fault::new(
                FAILED_TO_PARSE,
                format!("Modifier {operator}'s argument must be an object"),
            ));
        };

        for (path, value) in fields {
            apply_modifier(&mut document, operator, path, value)?;
        }
    }

    Ok(document)
}

fn immutable_id() -> Fault {
    Fault::new(
        IMMUTABLE_FIELD,
        "Performing an update on the path '_id' would modify the immutable field '_id'",
    )
}

/// Returns `target` with `update` applied: operators are applied field by field, a
/// replacement document takes the place of every field but `_id`.
///
/// Fails with code 66 if the update would change `_id`.
pub(crate) fn apply_update(target: &Document, update: &Document) -> Result<Document, Fault> {
    let updated = if is_operator_document(update) {
        apply_operators(target.clone(), update)?
    } else {
        if let (Some(replacement_id), Some(id)) = (update.get(ID_FIELD), target.get(ID_FIELD)) {
            if !values_equal(replacement_id, id) {
                return Err(immutable_id());
            }
        }

        target
            .get(ID_FIELD)
            .map(|id| (ID_FIELD.to_string(), id.clone()))
            .into_iter()
            .chain(
                update
                    .iter()
                    .filter(|(key, _)| key.as_str() != ID_FIELD)
                    .map(|(key, value)| (key.clone(), value.clone())),
            )
            .collect()
    };

    if updated.get(ID_FIELD) != target.get(ID_FIELD) {
        return Err(immutable_id());
    }

    Ok(updated)
}

/// Builds the document an upsert inserts: the selector's equality fields, then the update.
pub(crate) fn upsert_document(selector: &Document, update: &Document) -> Result<Document, Fault> {
    let mut seed = Document::new();
    for (key, condition) in selector {
        if key.starts_with('$') {
            continue;
        }
        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                if let Some(value) = operators.get("$eq") {
                    set_path(&mut seed, key, value.clone())?;
                }
            }
            literal => set_path(&mut seed, key, literal.clone())?,
        }
    }

    if is_operator_document(update) {
        return apply_operators(seed, update);
    }

    let mut replacement = update.clone();
    if !replacement.contains_key(ID_FIELD) {
        if let Some(id) = seed.get(ID_FIELD) {
            replacement.insert(ID_FIELD, id.clone());
        }
    }

    Ok(replacement)
}

/// Gives `document` an `_id` if it lacks one and returns it.
pub(crate) fn ensure_identifier(document: &mut Document) -> Result<Bson, Fault> {
    assign_identifier(document).map_err(|err| Fault::bad_value(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn target() -> Document {
        doc! { "_id": 1, "n": 1, "tags": ["a"], "address": { "city": "Oslo" } }
    }

    #[test]
    fn set_and_unset_follow_dotted_paths() {
        let updated = apply_update(
            &target(),
            &doc! { "$set": { "address.zip": "0150", "status": "new" }, "$unset": { "n": "" } },
        )
        .unwrap();

        assert_eq!(
            updated,
            doc! { "_id": 1, "tags": ["a"], "address": { "city": "Oslo", "zip": "0150" }, "status": "new" }
        );
    }

    #[test]
    fn inc_adds_and_widens() {
        let updated = apply_update(&target(), &doc! { "$inc": { "n": 2, "missing": 5, "ratio": 0.5 } }).unwrap();

        assert_eq!(updated.get("n"), Some(&Bson::Int32(3)));
        assert_eq!(updated.get("missing"), Some(&Bson::Int32(5)));
        assert_eq!(updated.get("ratio"), Some(&Bson::Double(0.5)));

        let overflow = apply_update(&doc! { "_id": 1, "n": i32::MAX }, &doc! { "$inc": { "n": 1 } }).unwrap();
        assert_eq!(overflow.get("n"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
    }

    #[test]
    fn inc_on_non_number_is_a_type_mismatch() {
        let fault = apply_update(&target(), &doc! { "$inc": { "tags": 1 } }).unwrap_err();

        assert_eq!(fault.code, TYPE_MISMATCH);
    }

    #[test]
    fn array_modifiers() {
        let updated = apply_update(
            &target(),
            &doc! {
                "$push": { "tags": "b", "log": 1 },
                "$addToSet": { "tags": "a" },
            },
        )
        .unwrap();
        assert_eq!(updated.get("tags"), Some(&Bson::Array(vec!["a".into(), "b".into()])));
        assert_eq!(updated.get("log"), Some(&Bson::Array(vec![Bson::Int32(1)])));

        let pulled = apply_update(&updated, &doc! { "$pull": { "tags": "a" } }).unwrap();
        assert_eq!(pulled.get("tags"), Some(&Bson::Array(vec!["b".into()])));

        let fault = apply_update(&target(), &doc! { "$push": { "n": 2 } }).unwrap_err();
        assert_eq!(fault.code, BAD_VALUE);
    }

    #[test]
    fn unknown_modifier_fails_to_parse() {
        let fault = apply_update(&target(), &doc! { "$rename": { "n": "m" } }).unwrap_err();

        assert_eq!(fault.code, FAILED_TO_PARSE);
    }

    #[test]
    fn replacement_keeps_the_identifier() {
        let updated = apply_update(&target(), &doc! { "name": "new" }).unwrap();
        assert_eq!(updated, doc! { "_id": 1, "name": "new" });

        assert_eq!(
            apply_update(&target(), &doc! { "_id": 2, "name": "new" }).unwrap_err().code,
            IMMUTABLE_FIELD
        );
        assert_eq!(
            apply_update(&target(), &doc! { "$set": { "_id": 2 } }).unwrap_err().code,
            IMMUTABLE_FIELD
        );
    }

    #[test]
    fn upsert_seeds_from_selector_equalities() {
        let created = upsert_document(
            &doc! { "kind": "counter", "n": { "$gt": 3 }, "owner": { "$eq": "ada" } },
            &doc! { "$inc": { "hits": 1 } },
        )
        .unwrap();

        assert_eq!(created, doc! { "kind": "counter", "owner": "ada", "hits": 1 });
    }

    #[test]
    fn replacement_upsert_takes_selector_identifier() {
        let created = upsert_document(&doc! { "_id": 7 }, &doc! { "name": "x" }).unwrap();

        assert_eq!(created.get("_id"), Some(&Bson::Int32(7)));
        assert_eq!(created.get("name"), Some(&Bson::String("x".into())));
    }
}
