//! Core domain model for the event reconciliation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "evrec-core";

/// Logical record-set names, doubling as destination table names.
pub const OPEN_EVENTS: &str = "open_events";
pub const OPEN_EVENTS_HISTORICAL: &str = "open_events_historical";
pub const RECEIPT_EVENTS: &str = "receipt_events";
pub const RECEIPT_EVENTS_HISTORICAL: &str = "receipt_events_historical";

/// One raw open-event CSV row as delivered in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOpenRow {
    pub id: i64,
    pub date: String,
    pub receipt_id: Option<i64>,
    pub user_agent: Option<String>,
    pub page_url: Option<String>,
}

/// One raw receipt-event CSV row as delivered in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReceiptRow {
    pub id: i64,
    pub date: String,
    pub brand_id: Option<String>,
    pub trans_amt: Option<String>,
    pub email_address: Option<String>,
}

/// Normalized open event. `brand_id` and `email_domain` stay `None` until
/// enrichment copies them from the receipt event matching `receipt_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenEvent {
    pub id: i64,
    pub date: Option<DateTime<Utc>>,
    pub receipt_id: Option<i64>,
    pub user_agent: Option<String>,
    pub page_url: Option<String>,
    pub brand_id: Option<String>,
    pub email_domain: Option<String>,
}

/// Normalized receipt event. `name_on_email` and `email_domain` are derived
/// from the raw email field and are `None` when no address was found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptEvent {
    pub id: i64,
    pub date: Option<DateTime<Utc>>,
    pub brand_id: Option<String>,
    pub trans_amt: Option<f64>,
    pub email_address: Option<String>,
    pub name_on_email: Option<String>,
    pub email_domain: Option<String>,
}

/// A record that belongs to a logical entity and carries an event timestamp.
///
/// Multiple records may share an `entity_id`; they are successive versions of
/// the same entity ranked by `event_date`.
pub trait Versioned {
    fn entity_id(&self) -> i64;
    fn event_date(&self) -> Option<DateTime<Utc>>;
}

impl Versioned for OpenEvent {
    fn entity_id(&self) -> i64 {
        self.id
    }

    fn event_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }
}

impl Versioned for ReceiptEvent {
    fn entity_id(&self) -> i64 {
        self.id
    }

    fn event_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }
}
