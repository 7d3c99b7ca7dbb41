//! Predicate evaluation for in-memory document filtering.
//!
//! Paths are dotted and walk into nested documents. The identity field resolves
//! to the stored key rather than to the body.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document as BsonDocument, datetime::DateTime};

use fencedoc_core::{
    document::ID_FIELD,
    error::DocumentStoreError,
    query::{FieldOp, Predicate, PredicateVisitor},
};

/// Comparable view of a BSON value.
///
/// Integers compare exactly as i64; a double only meets an integer through
/// [`compare_mixed`], so `Int32(2) == Int64(2) == Double(2.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    /// Binary payloads, including UUIDs, by subtype and bytes.
    Bytes(u8, &'a [u8]),
    ObjectId([u8; 12]),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Integer(i64::from(*value)),
            Bson::Int64(value) => Comparable::Integer(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(binary) => Comparable::Bytes(u8::from(binary.subtype), &binary.bytes),
            Bson::ObjectId(oid) => Comparable::ObjectId(oid.bytes()),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Integer(a), Comparable::Integer(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Integer(a), Comparable::Number(b)) => compare_mixed(*a, *b) == Some(Ordering::Equal),
            (Comparable::Number(a), Comparable::Integer(b)) => compare_mixed(*b, *a) == Some(Ordering::Equal),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Bytes(sa, a), Comparable::Bytes(sb, b)) => sa == sb && a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Number(b)) => compare_mixed(*a, *b),
            (Comparable::Number(a), Comparable::Integer(b)) => compare_mixed(*b, *a).map(Ordering::reverse),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

const I64_END: f64 = 9_223_372_036_854_775_808.0;

/// Orders an integer against a double without losing the integer's low bits.
fn compare_mixed(integer: i64, double: f64) -> Option<Ordering> {
    match (integer as f64).partial_cmp(&double)? {
        // 2^63 rounds down from i64::MAX but is out of i64 range.
        Ordering::Equal if double >= I64_END => Some(Ordering::Less),
        // The double is integral here; settle ties the f64 rounding may have hidden.
        Ordering::Equal => Some(integer.cmp(&(double as i64))),
        unequal => Some(unequal),
    }
}

/// Whether two BSON values are equal under the evaluator's comparison rules.
pub(crate) fn same_value(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Resolves a dotted path inside `body`, or the key when the path is the identity field.
pub(crate) fn lookup<'a>(key: &'a Bson, body: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path == ID_FIELD {
        return Some(key);
    }

    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }

    Some(current)
}

pub(crate) struct DocumentEvaluator<'a> {
    key: &'a Bson,
    body: &'a BsonDocument,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(key: &'a Bson, body: &'a BsonDocument) -> Self {
        Self { key, body }
    }

    pub fn evaluate(&mut self, predicate: &Predicate) -> bool {
        self.visit(predicate).unwrap_or(false)
    }

    fn contains(haystack: &Comparable<'_>, needle: &Comparable<'_>) -> bool {
        match (haystack, needle) {
            (Comparable::Array(values), Comparable::Array(wanted)) => {
                wanted.iter().any(|item| values.contains(item))
            }
            (Comparable::Array(values), single) => values.contains(single),
            (single, Comparable::Array(wanted)) => wanted.contains(single),
            _ => false,
        }
    }
}

impl<'a> PredicateVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(true)
    }

    fn visit_and(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        for predicate in predicates {
            if !self.visit(predicate)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        for predicate in predicates {
            if self.visit(predicate)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit(predicate)?)
    }

    fn visit_exists(&mut self, path: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.key, self.body, path).is_some() == should_exist)
    }

    fn visit_field(&mut self, path: &str, op: FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.key, self.body, path) else {
            // A missing field only satisfies the negative operators.
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NoneOf));
        };

        let left = Comparable::from(field_value);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => left == right,
            FieldOp::Ne => left != right,
            FieldOp::Gt => left.partial_cmp(&right) == Some(Ordering::Greater),
            FieldOp::Gte => matches!(left.partial_cmp(&right), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::Lt => left.partial_cmp(&right) == Some(Ordering::Less),
            FieldOp::Lte => matches!(left.partial_cmp(&right), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::AnyOf => Self::contains(&left, &right),
            FieldOp::NoneOf => !Self::contains(&left, &right),
        })
    }
}
