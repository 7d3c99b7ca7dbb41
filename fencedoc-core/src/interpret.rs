//! Translation of raw write acknowledgments into [`Outcome`] values.
//!
//! This is the only place where store results are classified; both calling
//! conventions of the collection API go through it.

use crate::{
    backend::{DeleteResult, ReplaceResult},
    error::{DocumentStoreError, DocumentStoreResult, ErrorCode, ErrorInfo, Outcome},
};

/// Classifies a replace-one acknowledgment.
///
/// An acknowledged replace that matched nothing, modified nothing and upserted
/// nothing is a race condition, whatever predicate produced it.
pub fn replace_error(result: &ReplaceResult) -> Option<ErrorInfo> {
    if !result.acknowledged {
        return Some(
            ErrorInfo::new(ErrorCode::DatabaseTransactionError, "Failed to update the data")
                .with_debug_info(format!("{result:?}")),
        );
    }

    if result.upserted_id.is_none() && result.matched_count == 0 && result.modified_count == 0 {
        return Some(ErrorInfo::race_condition());
    }

    None
}

/// The written document on success, otherwise the classified store failure.
pub fn interpret_replace<T>(written: T, result: DocumentStoreResult<ReplaceResult>) -> Outcome<T> {
    let result = result.map_err(DocumentStoreError::classify)?;

    match replace_error(&result) {
        Some(error) => Err(error),
        None => Ok(written),
    }
}

pub fn interpret_insert<T>(written: T, result: DocumentStoreResult<()>) -> Outcome<T> {
    result.map(|_| written).map_err(DocumentStoreError::classify)
}

/// Deletes succeed whether or not anything matched.
pub fn interpret_delete(result: DocumentStoreResult<DeleteResult>) -> Outcome<DeleteResult> {
    result.map_err(DocumentStoreError::classify)
}

/// The first found item, or [`ErrorCode::NotFound`].
pub fn interpret_first<T>(found: DocumentStoreResult<Option<T>>) -> Outcome<T> {
    found
        .map_err(DocumentStoreError::classify)?
        .ok_or_else(ErrorInfo::not_found)
}

#[cfg(test)]
mod tests {
    use bson::Bson;

    use super::*;

    fn replaced(matched: u64, modified: u64, upserted: bool) -> ReplaceResult {
        ReplaceResult {
            acknowledged: true,
            matched_count: matched,
            modified_count: modified,
            upserted_id: upserted.then(|| Bson::Int32(1)),
        }
    }

    #[test]
    fn zero_match_without_upsert_is_a_race_condition() {
        let outcome = interpret_replace("data", Ok(replaced(0, 0, false)));

        assert_eq!(outcome.unwrap_err().code, ErrorCode::RaceCondition);
    }

    #[test]
    fn matched_but_unchanged_is_success() {
        assert_eq!(interpret_replace("data", Ok(replaced(1, 0, false))), Ok("data"));
    }

    #[test]
    fn upsert_insert_is_success() {
        assert_eq!(interpret_replace("data", Ok(replaced(0, 0, true))), Ok("data"));
    }

    #[test]
    fn unacknowledged_replace_is_a_transaction_error() {
        let result = ReplaceResult { acknowledged: false, ..replaced(1, 1, false) };

        let error = interpret_replace("data", Ok(result)).unwrap_err();

        assert_eq!(error.code, ErrorCode::DatabaseTransactionError);
        assert!(error.debug_info.is_some());
    }

    #[test]
    fn identity_overwrite_is_a_transaction_error() {
        let outcome = interpret_replace("data", Err(DocumentStoreError::ImmutableId("customers".into())));

        assert_eq!(outcome.unwrap_err().code, ErrorCode::DatabaseTransactionError);
    }

    #[test]
    fn missing_first_item_is_not_found() {
        assert_eq!(interpret_first::<()>(Ok(None)).unwrap_err().code, ErrorCode::NotFound);
    }
}
