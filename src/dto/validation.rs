//! Validation helpers for DTOs.

use std::collections::BTreeMap;

use validator::ValidationError;

use crate::state::{
    aggregate::{MAX_SCORE, MIN_SCORE},
    party::JOIN_CODE_LENGTH,
};

/// Validates that a join code has the right length and only ASCII letters or digits.
///
/// Case and surrounding whitespace are ignored; the service normalizes them.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("K7PQ2M") // Ok
/// validate_join_code("k7pq2m") // Ok - normalized later
/// validate_join_code("K7PQ")   // Err - too short
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.chars().count() != JOIN_CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {JOIN_CODE_LENGTH} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that every rating of a ballot lies on the rating scale.
pub fn validate_ratings(ratings: &BTreeMap<String, i64>) -> Result<(), ValidationError> {
    let scale = i64::from(MIN_SCORE)..=i64::from(MAX_SCORE);
    if let Some((entry_id, score)) = ratings.iter().find(|(_, score)| !scale.contains(score)) {
        let mut err = ValidationError::new("rating_range");
        err.message = Some(
            format!("Rating {score} for `{entry_id}` must be between {MIN_SCORE} and {MAX_SCORE}")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_join_code_valid() {
        assert!(validate_join_code("K7PQ2M").is_ok());
        assert!(validate_join_code("k7pq2m").is_ok());
        assert!(validate_join_code(" K7PQ2M ").is_ok());
    }

    #[test]
    fn test_validate_join_code_invalid_length() {
        assert!(validate_join_code("K7PQ2").is_err());
        assert!(validate_join_code("K7PQ2MX").is_err());
        assert!(validate_join_code("").is_err());
    }

    #[test]
    fn test_validate_join_code_invalid_format() {
        assert!(validate_join_code("K7PQ-M").is_err());
        assert!(validate_join_code("K7PQ M").is_err());
        assert!(validate_join_code("K7PQÅM").is_err());
    }

    #[test]
    fn test_validate_ratings() {
        assert!(validate_ratings(&BTreeMap::from([("dt1-1".into(), 1), ("dt1-2".into(), 10)])).is_ok());
        assert!(validate_ratings(&BTreeMap::from([("dt1-1".into(), 0)])).is_err());
        assert!(validate_ratings(&BTreeMap::from([("dt1-1".into(), 11)])).is_err());
    }
}
