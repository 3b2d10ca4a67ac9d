//! Default invalidation rules for the restaurant domain.
//!
//! Each rule maps an event payload to the keys (or glob patterns) it makes
//! stale. Deployments can replace any of them with `add_rule`.
//!
//! A payload field that is missing or malformed drops only the keys built
//! from it; every other key of the rule is still returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{CacheError, Result};

/// Pure resolver from an event payload to key patterns.
pub type RuleFn = Arc<dyn Fn(&Value) -> Result<Vec<String>> + Send + Sync>;

// == Event Types ==
pub const ORDER_CREATED: &str = "ORDER_CREATED";
pub const ORDER_UPDATED: &str = "ORDER_UPDATED";
pub const ORDER_DELIVERED: &str = "ORDER_DELIVERED";
pub const EXPENSE_CREATED: &str = "EXPENSE_CREATED";
pub const CASH_CLOSING_CREATED: &str = "CASH_CLOSING_CREATED";
pub const PRODUCT_UPDATED: &str = "PRODUCT_UPDATED";
pub const MENU_UPDATED: &str = "MENU_UPDATED";
pub const CUSTOMER_UPDATED: &str = "CUSTOMER_UPDATED";
pub const BATCH_ORDERS_UPDATE: &str = "BATCH_ORDERS_UPDATE";

/// Maps an emitter topic (`order:created`) to its event type.
pub fn event_type_for_topic(topic: &str) -> Option<&'static str> {
    let event = match topic {
        "order:created" => ORDER_CREATED,
        "order:updated" => ORDER_UPDATED,
        "order:delivered" => ORDER_DELIVERED,
        "expense:created" => EXPENSE_CREATED,
        "cash-closing:created" => CASH_CLOSING_CREATED,
        "product:updated" => PRODUCT_UPDATED,
        "menu:updated" => MENU_UPDATED,
        "customer:updated" => CUSTOMER_UPDATED,
        "orders:batch-updated" => BATCH_ORDERS_UPDATE,
        _ => return None,
    };
    Some(event)
}

// == Payload Helpers ==
/// Reduces a date-like value to `YYYY-MM-DD`.
///
/// Accepts an ISO-8601 date-time string, a plain date string, or epoch
/// milliseconds. Missing or null means today (UTC).
pub fn normalize_date(value: Option<&Value>) -> Result<String> {
    match value {
        None | Some(Value::Null) => Ok(today()),
        Some(Value::String(s)) => {
            let day = s.split('T').next().unwrap_or_default().trim();
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string())
                .map_err(|_| CacheError::InvalidRequest(format!("invalid date '{}'", s)))
        }
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .ok_or_else(|| CacheError::InvalidRequest(format!("invalid timestamp {}", n))),
        Some(other) => Err(CacheError::InvalidRequest(format!(
            "unsupported date value {}",
            other
        ))),
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Date segment of an event or order payload.
///
/// An unparsable string keeps its text before `T`; any other bad value
/// falls back to today.
fn date_of(payload: &Value) -> String {
    let raw = payload.get("date");
    normalize_date(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Unusable event date");
        match raw {
            Some(Value::String(s)) => s.split('T').next().unwrap_or_default().trim().to_string(),
            _ => today(),
        }
    })
}

/// Reads a scalar field as a key segment, or `None` if it is missing.
fn segment(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => {
            warn!(field = %field, "Event payload field missing, dependent keys skipped");
            None
        }
    }
}

// == Rules ==
fn order_created(payload: &Value) -> Result<Vec<String>> {
    let date = date_of(payload);
    Ok(vec![
        format!("dashboard:summary:{}", date),
        format!("dashboard:kpis:{}", date),
        format!("financial:summary:{}", date),
        format!("analytics:orders:{}", date),
        format!("reports:daily:{}", date),
        "dashboard:recent-orders".to_string(),
        "analytics:top-products".to_string(),
    ])
}

fn order_updated(payload: &Value) -> Result<Vec<String>> {
    let date = date_of(payload);
    let mut keys: Vec<String> = segment(payload, "id")
        .map(|id| format!("order:{}", id))
        .into_iter()
        .collect();
    keys.extend([
        format!("dashboard:summary:{}", date),
        format!("financial:summary:{}", date),
        "dashboard:recent-orders".to_string(),
    ]);

    let status_changed = payload
        .get("statusChanged")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if status_changed {
        for field in ["oldStatus", "newStatus"] {
            keys.extend(segment(payload, field).map(|s| format!("orders:status:{}", s)));
        }
    }

    Ok(keys)
}

fn order_delivered(payload: &Value) -> Result<Vec<String>> {
    let date = date_of(payload);
    let mut keys: Vec<String> = segment(payload, "id")
        .map(|id| format!("order:{}", id))
        .into_iter()
        .collect();
    keys.push("deliveries:pending".to_string());
    keys.push(format!("deliveries:completed:{}", date));
    keys.extend(segment(payload, "delivererId").map(|id| format!("deliverer:{}:stats", id)));
    keys.push(format!("dashboard:delivery-metrics:{}", date));
    Ok(keys)
}

fn expense_created(payload: &Value) -> Result<Vec<String>> {
    let date = date_of(payload);
    let mut keys = vec![format!("financial:summary:{}", date)];
    keys.extend(segment(payload, "category").map(|c| format!("expenses:category:{}:{}", c, date)));
    keys.push(format!("reports:profit-loss:{}", date));
    keys.push(format!("owner:analytics:{}", date));
    Ok(keys)
}

fn cash_closing_created(payload: &Value) -> Result<Vec<String>> {
    let date = date_of(payload);
    Ok(vec![
        format!("cash-closing:{}", date),
        format!("financial:summary:{}", date),
        format!("reports:daily:{}", date),
        "cash-closing:recent".to_string(),
    ])
}

fn product_updated(payload: &Value) -> Result<Vec<String>> {
    let mut keys: Vec<String> = segment(payload, "id")
        .map(|id| format!("product:{}", id))
        .into_iter()
        .collect();
    keys.extend(segment(payload, "category").map(|c| format!("products:category:{}", c)));
    keys.extend(["menu:all", "menu:pizzas", "menu:active"].map(String::from));
    Ok(keys)
}

fn menu_updated(_payload: &Value) -> Result<Vec<String>> {
    Ok(vec![
        "menu:*".to_string(),
        "products:*".to_string(),
        "pricing:*".to_string(),
    ])
}

fn customer_updated(payload: &Value) -> Result<Vec<String>> {
    let mut keys: Vec<String> = segment(payload, "id")
        .map(|id| format!("customer:{}", id))
        .into_iter()
        .collect();
    keys.extend(segment(payload, "phone").map(|p| format!("customer:phone:{}", p)));
    keys.extend(["customers:recent", "customers:top-spenders"].map(String::from));
    Ok(keys)
}

fn batch_orders_update(payload: &Value) -> Result<Vec<String>> {
    let Some(orders) = payload.get("orders").and_then(Value::as_array) else {
        warn!("Batch update without 'orders', nothing to invalidate");
        return Ok(Vec::new());
    };

    let dates: BTreeSet<String> = orders.iter().map(date_of).collect();

    Ok(dates
        .iter()
        .flat_map(|date| {
            [
                format!("dashboard:summary:{}", date),
                format!("financial:summary:{}", date),
                format!("analytics:orders:{}", date),
            ]
        })
        .collect())
}

/// The baseline rule set registered by `InvalidationManager::new`.
pub fn default_rules() -> Vec<(&'static str, RuleFn)> {
    vec![
        (ORDER_CREATED, Arc::new(order_created) as RuleFn),
        (ORDER_UPDATED, Arc::new(order_updated) as RuleFn),
        (ORDER_DELIVERED, Arc::new(order_delivered) as RuleFn),
        (EXPENSE_CREATED, Arc::new(expense_created) as RuleFn),
        (CASH_CLOSING_CREATED, Arc::new(cash_closing_created) as RuleFn),
        (PRODUCT_UPDATED, Arc::new(product_updated) as RuleFn),
        (MENU_UPDATED, Arc::new(menu_updated) as RuleFn),
        (CUSTOMER_UPDATED, Arc::new(customer_updated) as RuleFn),
        (BATCH_ORDERS_UPDATE, Arc::new(batch_orders_update) as RuleFn),
    ]
}
