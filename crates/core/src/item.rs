//! Item definition and its store encoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ConvoyError, Result};

/// Hash field names of an item record.
pub mod fields {
    pub const ID: &str = "id";
    pub const CREATED: &str = "created";
    pub const QUEUE: &str = "queue";
    pub const ATTEMPTS: &str = "attempts";
    pub const OUTCOME: &str = "outcome";
    pub const ERRORS: &str = "errors";
    pub const META: &str = "meta";
}

/// Unique identifier for an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a new random ItemId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where an item stands after its most recent completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Not completed yet, or sent back by a retry.
    Pending,
    /// The last execution succeeded.
    Success,
    /// The last execution failed.
    Error,
}

impl Outcome {
    /// The value stored in the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = ConvoyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Outcome::Pending),
            "success" => Ok(Outcome::Success),
            "error" => Ok(Outcome::Error),
            other => Err(ConvoyError::MalformedItem(format!(
                "unknown outcome `{}`",
                other
            ))),
        }
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item identifier, assigned at enqueue time.
    pub id: ItemId,
    /// Enqueue timestamp (milliseconds since the Unix epoch).
    pub created: i64,
    /// Owning queue name.
    pub queue: String,
    /// Number of times the item has been claimed.
    pub attempts: u32,
    /// Outcome of the most recent execution.
    pub outcome: Outcome,
    /// Failure messages, oldest first. Kept across retries.
    pub errors: Vec<String>,
    /// Caller-supplied payload. Never inspected by the engine.
    pub meta: String,
}

impl Item {
    /// Create a fresh pending item.
    pub fn new(queue: impl Into<String>, meta: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            created: now_millis(),
            queue: queue.into(),
            attempts: 0,
            outcome: Outcome::Pending,
            errors: Vec::new(),
            meta: meta.into(),
        }
    }

    /// Whether the last execution succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// The most recent failure message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }

    /// Decode `meta` as JSON.
    pub fn meta_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.meta)?)
    }

    /// Encode the item as hash fields.
    pub fn to_fields(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            (fields::ID, self.id.to_string()),
            (fields::CREATED, self.created.to_string()),
            (fields::QUEUE, self.queue.clone()),
            (fields::ATTEMPTS, self.attempts.to_string()),
            (fields::OUTCOME, self.outcome.as_str().to_string()),
            (fields::ERRORS, serde_json::to_string(&self.errors)?),
            (fields::META, self.meta.clone()),
        ])
    }

    /// Decode an item from hash fields.
    ///
    /// Any missing or unparseable field yields [`ConvoyError::MalformedItem`];
    /// a record evicted mid-write looks exactly like that.
    pub fn from_fields(record: &HashMap<String, String>) -> Result<Self> {
        let created = field(record, fields::CREATED)?
            .parse()
            .map_err(|_| malformed(fields::CREATED))?;
        let attempts = field(record, fields::ATTEMPTS)?
            .parse()
            .map_err(|_| malformed(fields::ATTEMPTS))?;
        let errors = serde_json::from_str(field(record, fields::ERRORS)?)
            .map_err(|_| malformed(fields::ERRORS))?;

        Ok(Self {
            id: ItemId::from(field(record, fields::ID)?),
            created,
            queue: field(record, fields::QUEUE)?.to_string(),
            attempts,
            outcome: field(record, fields::OUTCOME)?.parse()?,
            errors,
            meta: field(record, fields::META)?.to_string(),
        })
    }
}

fn field<'a>(record: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    record
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ConvoyError::MalformedItem(format!("missing field `{}`", name)))
}

fn malformed(name: &str) -> ConvoyError {
    ConvoyError::MalformedItem(format!("invalid field `{}`", name))
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(item: &Item) -> HashMap<String, String> {
        item.to_fields()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_item_creation() {
        let item = Item::new("orders", r#"{"sku":"A1"}"#);
        assert_eq!(item.queue, "orders");
        assert_eq!(item.attempts, 0);
        assert_eq!(item.outcome, Outcome::Pending);
        assert!(!item.is_success());
        assert!(item.errors.is_empty());
        assert!(item.last_error().is_none());
    }

    #[test]
    fn test_item_id_uniqueness() {
        let id1 = ItemId::new();
        let id2 = ItemId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_item_id_display() {
        let id = ItemId::new();
        let display = format!("{}", id);
        // UUID v4 format: 8-4-4-4-12 hex characters
        assert_eq!(display.len(), 36);
        assert_eq!(display.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn test_fields_keep_meta_opaque() {
        let mut item = Item::new("orders", "not json at all");
        item.attempts = 3;
        item.outcome = Outcome::Error;
        item.errors = vec!["first".to_string(), "second".to_string()];

        let decoded = Item::from_fields(&as_map(&item)).unwrap();
        assert_eq!(decoded, item);
        assert_eq!(decoded.meta, "not json at all");
        assert_eq!(decoded.last_error(), Some("second"));
    }

    #[test]
    fn test_from_fields_missing_field() {
        let mut map = as_map(&Item::new("orders", "{}"));
        map.remove(fields::CREATED);

        let err = Item::from_fields(&map).unwrap_err();
        assert!(matches!(err, ConvoyError::MalformedItem(_)));
        assert!(err.to_string().contains("created"));
    }

    #[test]
    fn test_from_fields_partial_record() {
        // What HINCRBY leaves behind on a record that was already evicted.
        let mut map = HashMap::new();
        map.insert(fields::ATTEMPTS.to_string(), "1".to_string());
        assert!(Item::from_fields(&map).is_err());
    }

    #[test]
    fn test_from_fields_bad_attempts() {
        let mut map = as_map(&Item::new("orders", "{}"));
        map.insert(fields::ATTEMPTS.to_string(), "many".to_string());
        assert!(matches!(
            Item::from_fields(&map),
            Err(ConvoyError::MalformedItem(_))
        ));
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!("success".parse::<Outcome>().unwrap(), Outcome::Success);
        assert_eq!("error".parse::<Outcome>().unwrap(), Outcome::Error);
        assert_eq!("pending".parse::<Outcome>().unwrap(), Outcome::Pending);
        assert!("true".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_meta_json() {
        #[derive(Deserialize)]
        struct Order {
            sku: String,
        }

        let item = Item::new("orders", r#"{"sku":"A1"}"#);
        let order: Order = item.meta_json().unwrap();
        assert_eq!(order.sku, "A1");

        let opaque = Item::new("orders", "plain text");
        assert!(matches!(
            opaque.meta_json::<Order>(),
            Err(ConvoyError::Serialization(_))
        ));
    }

    #[test]
    fn test_now_millis() {
        // Should be a reasonable Unix timestamp in ms (after year 2020)
        assert!(now_millis() > 1_577_836_800_000);
    }
}
