//! Catalog entities: stores, categories, units, items and packagings
//!
//! All rows live in the tenant namespace. Everything below a store carries
//! its `store_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stockroom_common::ean::is_valid_ean13_format;
use stockroom_common::{Error, Result};
use uuid::Uuid;

use crate::validation::{non_blank, positive, Validate};

// ========================================
// Stores
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorePayload {
    pub name: String,
}

impl Validate for StorePayload {
    fn validate(&self) -> Result<()> {
        non_blank("name", &self.name)
    }
}

// ========================================
// Categories and Units
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub description: String,
    pub store_id: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnitOfMeasure {
    pub id: i64,
    pub description: String,
    pub store_id: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body for categories and units of measure
#[derive(Debug, Clone, Deserialize)]
pub struct DescriptionPayload {
    pub description: String,
}

impl Validate for DescriptionPayload {
    fn validate(&self) -> Result<()> {
        non_blank("description", &self.description)
    }
}

// ========================================
// Items
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub description: String,
    pub ean_13: Option<String>,
    pub category_id: i64,
    pub unit_of_measure_id: i64,
    pub store_id: i64,
    pub is_fractionable: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item row joined with its category and unit descriptions
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemListing {
    pub id: i64,
    pub description: String,
    pub ean_13: Option<String>,
    pub category_id: i64,
    pub category_description: String,
    pub unit_of_measure_id: i64,
    pub unit_description: String,
    pub store_id: i64,
    pub is_fractionable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPayload {
    pub description: String,
    #[serde(default)]
    pub ean_13: Option<String>,
    pub category_id: i64,
    pub unit_of_measure_id: i64,
    #[serde(default)]
    pub is_fractionable: bool,
}

impl Validate for ItemPayload {
    fn validate(&self) -> Result<()> {
        non_blank("description", &self.description)?;
        if let Some(code) = &self.ean_13 {
            if !is_valid_ean13_format(code) {
                return Err(Error::UnprocessableEntity(format!(
                    "ean_13 must be exactly 13 digits, got {:?}",
                    code
                )));
            }
        }
        Ok(())
    }
}

// ========================================
// Packagings
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemPackaging {
    pub id: i64,
    pub uuid: Uuid,
    pub item_id: i64,
    pub description: String,
    pub quantity: f64,
    pub ean_8: Option<String>,
    pub label_pdf_url: Option<String>,
    pub label_preview_url: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything printed on a packaging label
#[derive(Debug, Clone, FromRow)]
pub struct LabelSubject {
    pub packaging_id: i64,
    pub uuid: Uuid,
    pub ean_8: Option<String>,
    pub packaging_description: String,
    pub quantity: f64,
    pub item_description: String,
    pub unit_description: String,
    pub store_id: i64,
    pub store_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePackagingPayload {
    pub item_id: i64,
    pub description: String,
    pub quantity: f64,
}

impl Validate for CreatePackagingPayload {
    fn validate(&self) -> Result<()> {
        non_blank("description", &self.description)?;
        positive("quantity", self.quantity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePackagingPayload {
    pub description: String,
    pub quantity: f64,
}

impl Validate for UpdatePackagingPayload {
    fn validate(&self) -> Result<()> {
        non_blank("description", &self.description)?;
        positive("quantity", self.quantity)
    }
}

/// Short-lived link to a label preview image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(ean_13: Option<&str>) -> ItemPayload {
        ItemPayload {
            description: "Rice 5kg".to_string(),
            ean_13: ean_13.map(str::to_string),
            category_id: 1,
            unit_of_measure_id: 1,
            is_fractionable: false,
        }
    }

    #[test]
    fn test_item_ean13_format_enforced() {
        assert!(item(None).validate().is_ok());
        assert!(item(Some("4006381333931")).validate().is_ok());
        assert!(matches!(
            item(Some("400638133393")).validate(),
            Err(Error::UnprocessableEntity(_))
        ));
        assert!(item(Some("40063813339AB")).validate().is_err());
    }

    #[test]
    fn test_packaging_quantity_must_be_positive() {
        let payload = CreatePackagingPayload {
            item_id: 1,
            description: "Bag".to_string(),
            quantity: 0.0,
        };
        assert!(matches!(payload.validate(), Err(Error::UnprocessableEntity(_))));
    }

    #[test]
    fn test_item_payload_defaults() {
        let payload: ItemPayload = serde_json::from_str(
            r#"{"description":"Flour","category_id":2,"unit_of_measure_id":3}"#,
        )
        .unwrap();
        assert!(!payload.is_fractionable);
        assert!(payload.ean_13.is_none());
    }
}
