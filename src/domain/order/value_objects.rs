use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

// ============================================================================
// Order Aggregate - Wire & Storage Shape
// ============================================================================
//
// The order aggregate as produced on the ingest topic. The order owns exactly
// one Delivery, one Payment and a non-empty, ordered list of Items. Their
// `order_uid` back-reference lives only in the store's foreign-key columns.
//
// Optional descriptive fields default to an empty string when absent.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    #[serde(default)]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub oof_shard: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub region: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Payment {
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    pub currency: String,
    #[serde(default)]
    pub provider: String,
    pub amount: i32,
    /// Unix seconds
    pub payment_dt: i64,
    #[serde(default)]
    pub bank: String,
    pub delivery_cost: i32,
    pub goods_total: i32,
    pub custom_fee: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    /// Catalog id; together with the order uid it identifies the item row.
    pub chrt_id: i32,
    pub track_number: String,
    pub price: i32,
    #[serde(default)]
    pub rid: String,
    pub name: String,
    pub sale: i32,
    #[serde(default)]
    pub size: String,
    pub total_price: i32,
    pub nm_id: i32,
    #[serde(default)]
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Decode an order from a raw stream payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
