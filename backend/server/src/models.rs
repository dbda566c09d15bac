use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, de};
use sqlx::FromRow;
use thiserror::Error;

pub const FIRST_ORDER_NUMBER: i64 = 100;

pub const ORDER_SAVED: &str = "Order saved successfully!";
pub const ORDER_READY: &str = "Order marked as ready";
pub const ORDER_COMPLETED: &str = "Order completed and deleted successfully";
pub const SERVER_RUNNING: &str = "Server is running";

/// Completed is never written to the table; completing an order deletes its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Preparing,
    Ready,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Ready => "Ready",
            OrderStatus::Completed => "Completed",
        }
    }
}

#[derive(Error, Debug)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Preparing" => Ok(OrderStatus::Preparing),
            "Ready" => Ok(OrderStatus::Ready),
            "Completed" => Ok(OrderStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Order {
    pub number_order: i64,
    pub food: String,
    pub drink: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub order_time: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    All,
    Pending,
}

#[derive(Deserialize)]
pub struct NewOrder {
    pub food: Option<String>,
    pub drink: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderNumber {
    #[serde(default, deserialize_with = "number_or_text")]
    pub order_number: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

/// Ticket screens may send the number as `"101"`.
fn number_or_text<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(number)) => Ok(Some(number)),
        Some(NumberOrText::Text(text)) => text.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

#[derive(Serialize)]
pub struct LastOrder {
    pub last_order: i64,
    pub next_order: i64,
}

#[derive(Serialize)]
pub struct OrderPlaced {
    pub message: &'static str,
    pub order_number: i64,
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(OrderStatus::Preparing.as_str(), "Preparing");
        assert_eq!("Ready".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
        assert!("Done".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_number_accepts_text() {
        let parse = |body: &str| serde_json::from_str::<OrderNumber>(body).map(|o| o.order_number);

        assert_eq!(parse(r#"{"order_number": 101}"#).unwrap(), Some(101));
        assert_eq!(parse(r#"{"order_number": "101"}"#).unwrap(), Some(101));
        assert_eq!(parse(r#"{"order_number": " 102 "}"#).unwrap(), Some(102));
        assert_eq!(parse(r#"{"order_number": null}"#).unwrap(), None);
        assert_eq!(parse("{}").unwrap(), None);
        assert!(parse(r#"{"order_number": "soup"}"#).is_err());
        assert!(parse(r#"{"order_number": 1.5}"#).is_err());
    }

    #[test]
    fn test_order_serializes_iso_timestamp() {
        let order = Order {
            number_order: 100,
            food: "soup".to_string(),
            drink: "tea".to_string(),
            status: OrderStatus::Preparing,
            order_time: NaiveDateTime::parse_from_str("2024-03-01 12:30:05", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
        };

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["number_order"], 100);
        assert_eq!(json["status"], "Preparing");
        assert_eq!(json["order_time"], "2024-03-01T12:30:05");
    }
}
