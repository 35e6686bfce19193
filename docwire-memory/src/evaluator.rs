//! Selector evaluation for in-memory document filtering.
//!
//! Supports dotted paths, matching against array elements, and the operators
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists $not $all $size` plus the top-level
//! `$and $or $nor`. Values of different types order by type first, the way the store
//! orders them; range operators only match values of the same type.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::cmp::Ordering;

use docwire_core::update::is_operator_document;

use crate::fault::Fault;

/// Borrowed, comparable view of a BSON value.
///
/// All numeric types are normalized to `f64`, so `1`, `1_i64` and `1.0` compare equal.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(&'a Document),
    Array(&'a [Bson]),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    /// Any other type; compared by its debug rendering within the same type.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Document(doc) => Comparable::Map(doc),
            Bson::Array(arr) => Comparable::Array(arr),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 12,
        }
    }

    /// Total order: by type rank, then by value.
    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => compare_documents(a, b),
            (Comparable::Array(a), Comparable::Array(b)) => compare_arrays(a, b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Other(a), Comparable::Other(b)) => (a.element_type() as u8)
                .cmp(&(b.element_type() as u8))
                .then_with(|| format!("{a:?}").cmp(&format!("{b:?}"))),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn same_type(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((left_key, left), (right_key, right)) in a.iter().zip(b.iter()) {
        let ordering = left_key
            .cmp(right_key)
            .then_with(|| Comparable::from(left).compare(&Comparable::from(right)));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.len().cmp(&b.len())
}

fn compare_arrays(a: &[Bson], b: &[Bson]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ordering = Comparable::from(left).compare(&Comparable::from(right));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.len().cmp(&b.len())
}

/// Returns `true` when two values are equal, treating numeric types alike.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

/// Truthiness of option-like values such as `$exists: 1` or `new: true`.
pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        _ => true,
    }
}

/// Collects the values found at a dotted `path`.
///
/// Arrays met along the way are traversed: a numeric segment indexes into them, any
/// other segment is looked up in each embedded document.
pub(crate) fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut segments = path.split('.');
    let mut current: Vec<&'a Bson> = segments
        .next()
        .and_then(|first| document.get(first))
        .into_iter()
        .collect();

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Bson::Document(nested) => next.extend(nested.get(segment)),
                Bson::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => next.extend(items.get(index)),
                    Err(_) => next.extend(items.iter().filter_map(|item| match item {
                        Bson::Document(nested) => nested.get(segment),
                        _ => None,
                    })),
                },
                _ => {}
            }
        }
        current = next;
    }

    current
}

/// The values themselves plus, for arrays, each of their elements.
fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }

    expanded
}

fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }

    candidates(values)
        .into_iter()
        .any(|candidate| values_equal(candidate, target))
}

fn compares(values: &[&Bson], target: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let target = Comparable::from(target);

    candidates(values).into_iter().any(|candidate| {
        let candidate = Comparable::from(candidate);
        candidate.same_type(&target) && accept(candidate.compare(&target))
    })
}

fn array_operand<'b>(operator: &str, operand: &'b Bson) -> Result<&'b [Bson], Fault> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(Fault::bad_value(format!("{operator} needs an array"))),
    }
}

fn apply_operator(values: &[&Bson], operator: &str, operand: &Bson) -> Result<bool, Fault> {
    Ok(match operator {
        "$eq" => equals_any(values, operand),
        "$ne" => !equals_any(values, operand),
        "$gt" => compares(values, operand, Ordering::is_gt),
        "$gte" => compares(values, operand, Ordering::is_ge),
        "$lt" => compares(values, operand, Ordering::is_lt),
        "$lte" => compares(values, operand, Ordering::is_le),
        "$in" => array_operand(operator, operand)?
            .iter()
            .any(|item| equals_any(values, item)),
        "$nin" => !array_operand(operator, operand)?
            .iter()
            .any(|item| equals_any(values, item)),
        "$all" => {
            let required = array_operand(operator, operand)?;
            !required.is_empty() && required.iter().all(|item| equals_any(values, item))
        }
        "$exists" => truthy(operand) == !values.is_empty(),
        "$size" => {
            let size = match operand {
                Bson::Int32(n) => *n as f64,
                Bson::Int64(n) => *n as f64,
                Bson::Double(n) => *n,
                _ => return Err(Fault::bad_value("$size needs a number")),
            };
            values
                .iter()
                .any(|value| matches!(value, Bson::Array(items) if items.len() as f64 == size))
        }
        "$not" => match operand {
            Bson::Document(operators) => !matches_operators(values, operators)?,
            _ => return Err(Fault::bad_value("$not needs a document")),
        },
        other => return Err(Fault::bad_value(format!("unknown operator: {other}"))),
    })
}

pub(crate) fn matches_operators(values: &[&Bson], operators: &Document) -> Result<bool, Fault> {
    for (operator, operand) in operators {
        if !apply_operator(values, operator, operand)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn matches_field(document: &Document, path: &str, condition: &Bson) -> Result<bool, Fault> {
    let values = values_at(document, path);

    match condition {
        Bson::Document(operators) if is_operator_document(operators) => matches_operators(&values, operators),
        literal => Ok(equals_any(&values, literal)),
    }
}

fn clauses<'b>(operator: &str, condition: &'b Bson) -> Result<Vec<&'b Document>, Fault> {
    let items = match condition {
        Bson::Array(items) if !items.is_empty() => items,
        _ => return Err(Fault::bad_value(format!("{operator} must be a nonempty array"))),
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(Fault::bad_value(format!("{operator} entries must be objects"))),
        })
        .collect()
}

/// Returns `true` when `document` satisfies `selector`. An empty selector matches everything.
pub(crate) fn matches(document: &Document, selector: &Document) -> Result<bool, Fault> {
    for (key, condition) in selector {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" { any } else { !any }
            }
            operator if operator.starts_with('$') => {
                return Err(Fault::bad_value(format!("unknown top level operator: {operator}")));
            }
            path => matches_field(document, path, condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Indices of the documents matching `selector`, in storage order.
pub(crate) fn matching_indices(documents: &[Document], selector: &Document) -> Result<Vec<usize>, Fault> {
    let mut indices = Vec::new();
    for (index, document) in documents.iter().enumerate() {
        if matches(document, selector)? {
            indices.push(index);
        }
    }

    Ok(indices)
}

/// Orders two documents by a sort specification, `{ field: 1 | -1, ... }`.
pub(crate) fn compare_by(sort: &Document, a: &Document, b: &Document) -> Ordering {
    for (field, direction) in sort {
        let left = values_at(a, field)
            .first()
            .map(|value| Comparable::from(*value))
            .unwrap_or(Comparable::Null);
        let right = values_at(b, field)
            .first()
            .map(|value| Comparable::from(*value))
            .unwrap_or(Comparable::Null);

        let ordering = left.compare(&right);
        let descending = matches!(direction, Bson::Int32(n) if *n < 0)
            || matches!(direction, Bson::Int64(n) if *n < 0)
            || matches!(direction, Bson::Double(n) if *n < 0.0);
        let ordering = if descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies an inclusion or exclusion projection. `_id` is kept unless excluded.
pub(crate) fn project(document: Document, fields: &Document) -> Document {
    if fields.is_empty() {
        return document;
    }

    let including = fields
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));
    let keep_id = fields.get("_id").map(truthy).unwrap_or(true);

    document
        .into_iter()
        .filter(|(key, _)| {
            if key == "_id" {
                keep_id
            } else if including {
                fields.get(key).map(truthy).unwrap_or(false)
            } else {
                fields.get(key).map(truthy).unwrap_or(true)
            }
        })
        .collect()
}
