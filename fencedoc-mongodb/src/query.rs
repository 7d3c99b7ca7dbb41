//! Translation of predicates into MongoDB filter documents.
//!
//! Dotted paths and the `_id` path are native to MongoDB and pass through unchanged.

use bson::{Bson, Document, doc};

use fencedoc_core::{
    document::ID_FIELD,
    error::DocumentStoreError,
    query::{FieldOp, Predicate, PredicateVisitor, Query, SortDirection},
};

/// Translates predicates into MongoDB's native BSON filter syntax.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub(crate) fn filter(predicate: &Predicate) -> Result<Document, DocumentStoreError> {
        MongoQueryTranslator.visit(predicate)
    }

    pub(crate) fn sort(query: &Query) -> Option<Document> {
        query.sort.as_ref().map(|sort| {
            doc! {
                sort.field.clone(): match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                }
            }
        })
    }

    fn visit_all_of(&mut self, predicates: &[Predicate]) -> Result<Vec<Document>, DocumentStoreError> {
        predicates.iter().map(|predicate| self.visit(predicate)).collect()
    }
}

impl PredicateVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(doc! {})
    }

    // The server rejects empty `$and`/`$or` arrays.
    fn visit_and(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        if predicates.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! { "$and": self.visit_all_of(predicates)? })
    }

    fn visit_or(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        if predicates.is_empty() {
            // Every stored document has an identity.
            return Ok(doc! { ID_FIELD: { "$exists": false } });
        }

        Ok(doc! { "$or": self.visit_all_of(predicates)? })
    }

    // `$not` only applies to a single field; `$nor` negates a whole filter.
    fn visit_not(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit(predicate)?] })
    }

    fn visit_exists(&mut self, path: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { path: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, path: &str, op: FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let condition = match op {
            FieldOp::Eq => doc! { "$eq": value },
            FieldOp::Ne => doc! { "$ne": value },
            FieldOp::Gt => doc! { "$gt": value },
            FieldOp::Gte => doc! { "$gte": value },
            FieldOp::Lt => doc! { "$lt": value },
            FieldOp::Lte => doc! { "$lte": value },
            FieldOp::AnyOf | FieldOp::NoneOf => {
                let Bson::Array(values) = value else {
                    return Err(DocumentStoreError::Backend(format!("{op:?} on {path} requires an array value")));
                };

                match op {
                    FieldOp::AnyOf => doc! { "$in": values },
                    _ => doc! { "$nin": values },
                }
            }
        };

        Ok(doc! { path: condition })
    }
}

#[cfg(test)]
mod tests {
    use fencedoc_core::query::Filter;

    use super::*;

    #[test]
    fn all_is_the_empty_filter() {
        assert_eq!(MongoQueryTranslator::filter(&Filter::all()).unwrap(), doc! {});
    }

    #[test]
    fn identity_and_dotted_paths_pass_through() {
        let filter = Filter::eq("_id", "k1").and(Filter::gt("address.zip", "10000"));

        assert_eq!(
            MongoQueryTranslator::filter(&filter).unwrap(),
            doc! { "$and": [
                { "_id": { "$eq": "k1" } },
                { "address.zip": { "$gt": "10000" } },
            ] }
        );
    }

    #[test]
    fn empty_conjunctions_match_everything_and_empty_disjunctions_nothing() {
        assert_eq!(MongoQueryTranslator::filter(&Filter::and(Vec::<Predicate>::new())).unwrap(), doc! {});
        assert_eq!(
            MongoQueryTranslator::filter(&Filter::or(Vec::<Predicate>::new())).unwrap(),
            doc! { "_id": { "$exists": false } }
        );
        assert_eq!(
            MongoQueryTranslator::filter(&Filter::or(Vec::<Predicate>::new()).not()).unwrap(),
            doc! { "$nor": [{ "_id": { "$exists": false } }] }
        );
    }

    #[test]
    fn negation_wraps_the_whole_filter() {
        let filter = Filter::eq("name", "John").or(Filter::exists("tags")).not();

        assert_eq!(
            MongoQueryTranslator::filter(&filter).unwrap(),
            doc! { "$nor": [{ "$or": [
                { "name": { "$eq": "John" } },
                { "tags": { "$exists": true } },
            ] }] }
        );
    }

    #[test]
    fn membership_requires_an_array() {
        assert_eq!(
            MongoQueryTranslator::filter(&Filter::none_of("zip", ["1", "2"])).unwrap(),
            doc! { "zip": { "$nin": ["1", "2"] } }
        );

        let scalar = Predicate::field("zip", FieldOp::AnyOf, "1");
        assert!(MongoQueryTranslator::filter(&scalar).is_err());
    }

    #[test]
    fn sort_direction_maps_to_sign() {
        let query = Query::builder().sort("name", SortDirection::Desc).build();

        assert_eq!(MongoQueryTranslator::sort(&query), Some(doc! { "name": -1 }));
        assert_eq!(MongoQueryTranslator::sort(&Query::default()), None);
    }
}
