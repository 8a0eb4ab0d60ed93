use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::errors::ValidationError;
use super::value_objects::{Delivery, Item, Order, Payment};

// ============================================================================
// Order Validator
// ============================================================================
//
// Structural and field-level checks on a decoded order. Pure: no I/O, no
// side effects. Returns the first violation found; callers decide whether
// that means drop, dead-letter or accept.
//
// ============================================================================

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Validate a decoded order aggregate.
pub fn validate(order: &Order) -> Result<(), ValidationError> {
    require("order_uid", &order.order_uid)?;
    require("track_number", &order.track_number)?;
    require("entry", &order.entry)?;
    require("locale", &order.locale)?;
    require("customer_id", &order.customer_id)?;
    require("delivery_service", &order.delivery_service)?;
    require("shardkey", &order.shardkey)?;
    non_negative("sm_id", order.sm_id as i64)?;

    validate_delivery(&order.delivery)?;
    validate_payment(&order.payment)?;
    validate_items(&order.items)
}

/// Boolean form of [`validate`].
#[cfg(test)]
pub fn is_valid(order: &Order) -> bool {
    validate(order).is_ok()
}

fn validate_delivery(delivery: &Delivery) -> Result<(), ValidationError> {
    require("delivery.name", &delivery.name)?;
    require("delivery.phone", &delivery.phone)?;
    require("delivery.zip", &delivery.zip)?;
    require("delivery.city", &delivery.city)?;
    require("delivery.address", &delivery.address)?;
    require("delivery.email", &delivery.email)?;

    if !EMAIL.is_match(delivery.email.trim()) {
        return Err(ValidationError::InvalidEmail(delivery.email.clone()));
    }

    Ok(())
}

fn validate_payment(payment: &Payment) -> Result<(), ValidationError> {
    require("payment.transaction", &payment.transaction)?;
    require("payment.currency", &payment.currency)?;
    non_negative("payment.amount", payment.amount as i64)?;
    non_negative("payment.payment_dt", payment.payment_dt)?;
    non_negative("payment.delivery_cost", payment.delivery_cost as i64)?;
    non_negative("payment.goods_total", payment.goods_total as i64)?;
    non_negative("payment.custom_fee", payment.custom_fee as i64)
}

fn validate_items(items: &[Item]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyItems);
    }

    // Items are keyed by catalog id in the store.
    let mut seen = HashSet::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        if item.chrt_id <= 0 {
            return Err(ValidationError::InvalidCatalogId { index, chrt_id: item.chrt_id });
        }
        if !seen.insert(item.chrt_id) {
            return Err(ValidationError::DuplicateCatalogId { index, chrt_id: item.chrt_id });
        }
        if item.name.trim().is_empty() {
            return Err(ValidationError::ItemMissingField { index, field: "name" });
        }
        if item.track_number.trim().is_empty() {
            return Err(ValidationError::ItemMissingField { index, field: "track_number" });
        }

        for (field, value) in [
            ("price", item.price),
            ("sale", item.sale),
            ("total_price", item.total_price),
            ("nm_id", item.nm_id),
        ] {
            if value < 0 {
                return Err(ValidationError::ItemNegative { index, field, value: value as i64 });
            }
        }
    }

    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        Err(ValidationError::Negative { field, value })
    } else {
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
