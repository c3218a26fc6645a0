//! Stock movements and the derived stock level
//!
//! Movements are drafts until finalized; only finalized movements count
//! toward stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stockroom_common::{Error, Result};

use crate::validation::{non_blank, non_negative, not_empty, positive, positive_count, Validate};

/// Lifecycle of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    #[default]
    Draft,
    Finalized,
}

impl MovementStatus {
    pub fn is_finalized(self) -> bool {
        self == MovementStatus::Finalized
    }
}

// ========================================
// Stock In
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockIn {
    pub id: i64,
    pub store_id: i64,
    pub status: MovementStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<StockInItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockInItem {
    pub id: i64,
    pub stock_in_id: i64,
    pub item_packaging_id: i64,
    pub buy_price: f64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockInLine {
    /// Existing line id; absent for new lines
    #[serde(default)]
    pub id: Option<i64>,
    pub item_packaging_id: i64,
    pub buy_price: f64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockInPayload {
    pub items: Vec<StockInLine>,
}

impl Validate for StockInPayload {
    fn validate(&self) -> Result<()> {
        not_empty("items", &self.items)?;
        for line in &self.items {
            non_negative("buy_price", line.buy_price)?;
            positive_count("quantity", line.quantity)?;
        }
        Ok(())
    }
}

// ========================================
// Stock Out
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockOut {
    pub id: i64,
    pub store_id: i64,
    pub status: MovementStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<StockOutItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockOutItem {
    pub id: i64,
    pub stock_out_id: i64,
    pub item_id: i64,
    pub total_quantity: f64,
    #[sqlx(skip)]
    pub packagings: Vec<StockOutItemPackaging>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockOutItemPackaging {
    pub id: i64,
    pub stock_out_item_id: i64,
    pub item_packaging_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackagingCount {
    #[serde(default)]
    pub id: Option<i64>,
    pub item_packaging_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockOutLine {
    #[serde(default)]
    pub id: Option<i64>,
    pub item_id: i64,
    pub total_quantity: f64,
    #[serde(default)]
    pub packagings: Vec<PackagingCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockOutPayload {
    pub items: Vec<StockOutLine>,
}

impl Validate for StockOutPayload {
    fn validate(&self) -> Result<()> {
        not_empty("items", &self.items)?;
        for line in &self.items {
            positive("total_quantity", line.total_quantity)?;
            for packaging in &line.packagings {
                positive_count("packagings.quantity", packaging.quantity)?;
            }
        }
        Ok(())
    }
}

// ========================================
// Stock Waste
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockWaste {
    pub id: i64,
    pub store_id: i64,
    pub item_id: i64,
    pub wasted_quantity: f64,
    pub status: MovementStatus,
    pub reason_text: String,
    pub reason_image_url: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockWastePayload {
    pub item_id: i64,
    pub wasted_quantity: f64,
    pub reason_text: String,
    #[serde(default)]
    pub reason_image_url: Option<String>,
}

impl Validate for StockWastePayload {
    fn validate(&self) -> Result<()> {
        positive("wasted_quantity", self.wasted_quantity)?;
        non_blank("reason_text", &self.reason_text)?;
        if let Some(url) = &self.reason_image_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::UnprocessableEntity(
                    "reason_image_url must be an http(s) URL".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ========================================
// Stock Level
// ========================================

/// Current stock of one item, derived from finalized movements
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockLevel {
    pub store_id: i64,
    pub item_id: i64,
    pub item_description: String,
    pub category_id: i64,
    pub category_description: String,
    pub unit_of_measure_id: i64,
    pub unit_description: String,
    pub current_stock: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_in_requires_lines() {
        let payload = StockInPayload { items: vec![] };
        assert!(matches!(payload.validate(), Err(Error::UnprocessableEntity(_))));
    }

    #[test]
    fn test_stock_in_quantity_positive() {
        let payload: StockInPayload = serde_json::from_str(
            r#"{"items":[{"item_packaging_id":1,"buy_price":2.5,"quantity":0}]}"#,
        )
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_stock_out_payload_parses_nested_ids() {
        let payload: StockOutPayload = serde_json::from_str(
            r#"{"items":[{"id":4,"item_id":7,"total_quantity":12,
                "packagings":[{"id":9,"item_packaging_id":3,"quantity":2},
                              {"item_packaging_id":5,"quantity":1}]}]}"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.items[0].id, Some(4));
        assert_eq!(payload.items[0].packagings[1].id, None);
    }

    #[test]
    fn test_waste_needs_reason() {
        let payload = StockWastePayload {
            item_id: 1,
            wasted_quantity: 2.0,
            reason_text: " ".to_string(),
            reason_image_url: None,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&MovementStatus::Finalized).unwrap(),
            "\"finalized\""
        );
        assert!(!MovementStatus::default().is_finalized());
    }
}
