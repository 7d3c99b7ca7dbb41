//! Identity and version predicates used by keyed and fenced writes.

use bson::Bson;

use crate::{
    document::{ID_FIELD, Version, Versioned},
    query::{Filter, Predicate},
};

/// Equality on the identity field.
pub fn by_id(key: impl Into<Bson>) -> Predicate {
    Filter::eq(ID_FIELD, key)
}

/// Equality on the identity field and on `D`'s version field.
pub fn by_id_and_version<D: Versioned>(key: impl Into<Bson>, version: Version) -> Predicate {
    Filter::and([by_id(key), Filter::eq(D::VERSION_FIELD, i64::from(version))])
}
