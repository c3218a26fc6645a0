//! Request payload validation
//!
//! Unparseable bodies are `InvalidInput` (400); bodies that parse but break a
//! semantic rule are `UnprocessableEntity` (422).

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use stockroom_common::{Error, Result};

use crate::error::ApiError;

/// Semantic checks run after a payload deserializes
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// JSON body that has passed [`Validate`]
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| Error::InvalidInput(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

// ========================================
// Field Rules
// ========================================

pub fn non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::UnprocessableEntity(format!("{} must not be empty", field)));
    }
    Ok(())
}

pub fn positive(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::UnprocessableEntity(format!(
            "{} must be greater than zero",
            field
        )));
    }
    Ok(())
}

pub fn positive_count(field: &str, value: i32) -> Result<()> {
    if value <= 0 {
        return Err(Error::UnprocessableEntity(format!(
            "{} must be greater than zero",
            field
        )));
    }
    Ok(())
}

pub fn non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::UnprocessableEntity(format!("{} must not be negative", field)));
    }
    Ok(())
}

pub fn not_empty<T>(field: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::UnprocessableEntity(format!(
            "{} must contain at least one entry",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert!(non_blank("name", "Main").is_ok());
        assert!(matches!(non_blank("name", "  "), Err(Error::UnprocessableEntity(_))));
    }

    #[test]
    fn test_positive() {
        assert!(positive("quantity", 0.5).is_ok());
        assert!(positive("quantity", 0.0).is_err());
        assert!(positive("quantity", -1.0).is_err());
        assert!(positive("quantity", f64::NAN).is_err());
        assert!(positive_count("quantity", 1).is_ok());
        assert!(positive_count("quantity", 0).is_err());
    }

    #[test]
    fn test_non_negative() {
        assert!(non_negative("buy_price", 0.0).is_ok());
        assert!(non_negative("buy_price", -0.01).is_err());
    }

    #[test]
    fn test_not_empty() {
        assert!(not_empty::<u8>("items", &[]).is_err());
        assert!(not_empty("items", &[1]).is_ok());
    }
}
