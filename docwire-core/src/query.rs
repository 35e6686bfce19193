//! Typed filter expressions and their translation into selector documents.
//!
//! Selectors are plain [`bson::Document`]s everywhere in this crate. [`Filter`] and
//! [`Expr`] are a typed way to build them:
//!
//! ```ignore
//! use docwire::query::Filter;
//!
//! let selector = Filter::eq("status", "open")
//!     .and(Filter::gt("total", 100))
//!     .to_selector()?;
//! // { "$and": [ { "status": { "$eq": "open" } }, { "total": { "$gt": 100 } } ] }
//! ```
//!
//! The [`QueryVisitor`] trait walks an expression tree; [`SelectorTranslator`] is the
//! visitor producing selector documents.

use bson::{Bson, Document, doc};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Desc }
    }

    /// Builds a sort document, `{ field: 1 | -1, ... }`, keeping key order.
    pub fn to_document<'a>(keys: impl IntoIterator<Item = &'a Sort>) -> Document {
        keys.into_iter()
            .map(|sort| (sort.field.clone(), Bson::Int32(sort.direction.as_i32())))
            .collect()
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Array field contains the value, or every value when given an array.
    Contains,
    /// Array field contains none of the given values.
    NotContains,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Translates this expression into a selector document.
    pub fn to_selector(&self) -> DocumentStoreResult<Document> {
        SelectorTranslator.visit_expr(self)
    }
}

/// Constructors for filter expressions.
///
/// ```ignore
/// use docwire::query::Filter;
///
/// let expr = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents whose array field contains the value. An array value
    /// requires every element to be present.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Translates expressions into selector documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectorTranslator;

impl SelectorTranslator {
    fn visit_all(&mut self, exprs: &[Expr]) -> DocumentStoreResult<Vec<Document>> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

fn require_array(op: &str, value: &Bson) -> DocumentStoreResult<()> {
    match value {
        Bson::Array(_) => Ok(()),
        _ => Err(DocumentStoreError::InvalidDocument(format!(
            "{op} requires an array value"
        ))),
    }
}

impl QueryVisitor for SelectorTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    // `$not` only applies to operator expressions; `$nor` of one clause negates any selector.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::Array(values) => doc! { "$all": values },
                    other => doc! { "$eq": other },
                },
                FieldOp::NotContains => match value {
                    Bson::Array(values) => doc! { "$nin": values },
                    other => doc! { "$ne": other },
                },
                FieldOp::AnyOf => {
                    require_array("AnyOf", value)?;
                    doc! { "$in": value }
                }
                FieldOp::NoneOf => {
                    require_array("NoneOf", value)?;
                    doc! { "$nin": value }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_expression_translates_in_order() {
        let selector = Filter::eq("status", "open")
            .and(Filter::gt("total", 100))
            .and(Filter::any_of("region", vec!["eu", "us"]))
            .to_selector()
            .unwrap();

        assert_eq!(
            selector,
            doc! {
                "$and": [
                    { "status": { "$eq": "open" } },
                    { "total": { "$gt": 100 } },
                    { "region": { "$in": ["eu", "us"] } },
                ]
            }
        );
    }

    #[test]
    fn negation_uses_nor() {
        let selector = Filter::exists("deleted_at").not().to_selector().unwrap();

        assert_eq!(selector, doc! { "$nor": [{ "deleted_at": { "$exists": true } }] });
    }

    #[test]
    fn contains_picks_operator_by_value_shape() {
        assert_eq!(
            Filter::contains("tags", "red").to_selector().unwrap(),
            doc! { "tags": { "$eq": "red" } }
        );
        assert_eq!(
            Filter::contains("tags", vec!["red", "blue"]).to_selector().unwrap(),
            doc! { "tags": { "$all": ["red", "blue"] } }
        );
    }

    #[test]
    fn membership_requires_array() {
        assert!(Filter::any_of("region", "eu").to_selector().is_err());
    }

    #[test]
    fn sort_document_keeps_key_order() {
        let sort = [Sort::desc("placed"), Sort::asc("_id")];

        assert_eq!(Sort::to_document(&sort), doc! { "placed": -1, "_id": 1 });
    }
}
