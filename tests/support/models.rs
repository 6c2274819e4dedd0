use salus::Record;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Record)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl Customer {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Record)]
#[record(collection = "orders", tag = "Order")]
pub struct Order {
    #[record(key)]
    #[serde(rename = "OrderId")]
    pub order_id: Uuid,
    pub customer_id: i64,
    pub total_cents: i64,
}

/// Written through the session but never captured.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Record)]
#[record(collection = "audit_log")]
pub struct AuditEntry {
    pub id: i64,
    pub message: String,
}

/// Consumer-side copy of `Customer`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Record)]
#[record(collection = "customer_copies", tag = "CustomerCopy")]
pub struct CustomerCopy {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Consumer-side projection that keeps only some of `Customer`'s fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Record)]
#[record(collection = "customer_names")]
pub struct CustomerName {
    pub id: i64,
    pub name: String,
}

/// Keyed by free-form text, some of which looks like a UUID.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Record)]
pub struct Voucher {
    pub id: String,
    pub amount_cents: i64,
}
