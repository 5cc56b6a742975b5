use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap();
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL_REGEX.is_match(input)
}

/// Rejects `value` with a `Validation` error on `field` unless it is a syntactically valid address.
pub fn require_email(field: &str, value: &str) -> Result<(), AppError> {
    if is_valid_email(value) {
        Ok(())
    } else {
        Err(AppError::validation(field, "INVALID EMAIL FORMAT"))
    }
}

pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value)
        .map_err(|_| AppError::validation(field, format!("{} IS NOT A VALID UUID", field.to_uppercase())))
}

/// Stable SHA-256 hex digest of a raw token string, used as the invalidation key.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
