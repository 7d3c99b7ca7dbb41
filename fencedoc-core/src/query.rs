//! Predicates and queries over stored documents.
//!
//! A [`Predicate`] is a backend-neutral boolean condition. Backends either
//! translate it into their native query language or evaluate it directly, both
//! through [`PredicateVisitor`].
//!
//! Field paths are dotted: `"address.zip"` addresses the `zip` field of the
//! nested `address` document. The reserved path [`ID_FIELD`](crate::document::ID_FIELD)
//! addresses a document's identity.
//!
//! ```ignore
//! use fencedoc::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("address.country", "TH").and(Filter::gt("version", 1)))
//!     .sort("name", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```

use bson::Bson;

use crate::error::DocumentStoreError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// The field equals one of the values in an array.
    AnyOf,
    /// The field equals none of the values in an array.
    NoneOf,
}

/// A boolean condition over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document.
    All,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Whether the field at `path` is present.
    Exists(String, bool),
    Field {
        path: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Predicate {
    pub fn field(path: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Predicate::Field { path: path.into(), op, value: value.into() }
    }

    /// Combines this predicate with another using logical AND.
    ///
    /// An existing AND is extended rather than nested.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut list) => {
                list.push(other);
                Predicate::And(list)
            }
            _ => Predicate::And(vec![self, other]),
        }
    }

    /// Combines this predicate with another using logical OR.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut list) => {
                list.push(other);
                Predicate::Or(list)
            }
            _ => Predicate::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

/// Shorthand constructors for [`Predicate`] values.
pub struct Filter;

impl Filter {
    pub fn all() -> Predicate {
        Predicate::All
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Predicate {
        Predicate::field(path, FieldOp::Eq, value)
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Bson>) -> Predicate {
        Predicate::field(path, FieldOp::Ne, value)
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Predicate {
        Predicate::field(path, FieldOp::Gt, value)
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Bson>) -> Predicate {
        Predicate::field(path, FieldOp::Gte, value)
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Bson>) -> Predicate {
        Predicate::field(path, FieldOp::Lt, value)
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Bson>) -> Predicate {
        Predicate::field(path, FieldOp::Lte, value)
    }

    pub fn any_of<V: Into<Bson>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::field(path, FieldOp::AnyOf, Bson::Array(values.into_iter().map(Into::into).collect()))
    }

    pub fn none_of<V: Into<Bson>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::field(path, FieldOp::NoneOf, Bson::Array(values.into_iter().map(Into::into).collect()))
    }

    pub fn exists(path: impl Into<String>) -> Predicate {
        Predicate::Exists(path.into(), true)
    }

    pub fn not_exists(path: impl Into<String>) -> Predicate {
        Predicate::Exists(path.into(), false)
    }

    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
        Predicate::And(predicates.into_iter().collect())
    }

    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
        Predicate::Or(predicates.into_iter().collect())
    }
}

/// A list retrieval: predicate plus ordering and paging.
#[derive(Debug, Clone)]
pub struct Query {
    pub filter: Predicate,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for Query {
    fn default() -> Self {
        Self { filter: Predicate::All, sort: None, limit: None, offset: None }
    }
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// A query returning every document matching `filter`, in store order.
    pub fn matching(filter: Predicate) -> Self {
        Self { filter, ..Self::default() }
    }
}

impl From<Predicate> for Query {
    fn from(filter: Predicate) -> Self {
        Query::matching(filter)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn filter(mut self, filter: Predicate) -> Self {
        self.query.filter = filter;
        self
    }

    /// At most `limit` documents. A limit of zero selects nothing.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks a [`Predicate`] tree. Backends implement this to translate or evaluate predicates.
pub trait PredicateVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_and(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, path: &str, should_exist: bool) -> Result<Self::Output, Self::Error>;
    fn visit_field(&mut self, path: &str, op: FieldOp, value: &Bson) -> Result<Self::Output, Self::Error>;

    fn visit(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        match predicate {
            Predicate::All => self.visit_all(),
            Predicate::And(predicates) => self.visit_and(predicates),
            Predicate::Or(predicates) => self.visit_or(predicates),
            Predicate::Not(inner) => self.visit_not(inner),
            Predicate::Exists(path, should_exist) => self.visit_exists(path, *should_exist),
            Predicate::Field { path, op, value } => self.visit_field(path, *op, value),
        }
    }
}
