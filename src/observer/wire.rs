use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::error::Error;

/// A notification pushed by a store node over its observation channel.
///
/// Every text frame is one JSON object of the form
/// `{"type": "<tag>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    /// The node's own description and its view of the full membership.
    RingChange(RingChange),
    /// A request travelling between two positions, optionally about a key.
    Comm(Comm),
    /// Anti-entropy synchronization between two nodes.
    Sync(Activity),
    /// Cleanup of entries a node should no longer hold.
    Clean(Activity),
    /// Entries migrating between nodes. Logged, not animated.
    Migration(Activity),
}

const TAGS: [&str; 5] = ["RingChange", "Comm", "Sync", "Clean", "Migration"];

impl Notification {
    pub fn decode(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)?;
        if let Some(tag) = value.get("type").and_then(Value::as_str) {
            if !TAGS.contains(&tag) {
                return Err(Error::UnknownTag(tag.to_string()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Notification::RingChange(_) => "RingChange",
            Notification::Comm(_) => "Comm",
            Notification::Sync(_) => "Sync",
            Notification::Clean(_) => "Clean",
            Notification::Migration(_) => "Migration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RingChange {
    pub description: NodeDescriptor,
    #[serde(default)]
    pub routes: Vec<NodeDescriptor>,
}

/// A node as described by the store. Positions stay base64 encoded here and
/// are validated when the descriptor is turned into a snapshot, so that one
/// bad route does not take the rest of the notification down with it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeDescriptor {
    #[serde(rename = "Addr")]
    pub addr: String,
    #[serde(rename = "Pos")]
    pub pos: String,
    #[serde(rename = "OwnedEntries", default)]
    pub owned_entries: u64,
    #[serde(rename = "HeldEntries", default)]
    pub held_entries: u64,
    #[serde(rename = "LastReroute", default)]
    pub last_reroute: Option<DateTime<Utc>>,
    #[serde(rename = "LastSync", default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(rename = "LastMigrate", default)]
    pub last_migrate: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Comm {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub sub_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Activity {
    pub source: String,
    pub destination: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ring_change() {
        let text = r#"{
            "type": "RingChange",
            "data": {
                "description": {
                    "Addr": "10.0.0.1:9000",
                    "Pos": "AAAAAAAAAAAAAAAAAAAAAQ==",
                    "OwnedEntries": 3,
                    "HeldEntries": 5,
                    "LastSync": "2013-04-01T12:00:00Z"
                },
                "routes": [{"Addr": "10.0.0.2:9000", "Pos": "gAAAAAAAAAAAAAAAAAAAAA=="}]
            }
        }"#;
        let change = match Notification::decode(text).unwrap() {
            Notification::RingChange(change) => change,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(change.description.addr, "10.0.0.1:9000");
        assert_eq!(change.description.owned_entries, 3);
        assert_eq!(change.description.held_entries, 5);
        assert!(change.description.last_sync.is_some());
        assert!(change.description.last_migrate.is_none());
        assert_eq!(change.routes.len(), 1);
        assert_eq!(change.routes[0].owned_entries, 0);
    }

    #[test]
    fn decodes_activity() {
        let text = r#"{"type":"Comm","data":{"type":"Put","source":"AA==","destination":"AQ==","key":"Ag=="}}"#;
        let comm = match Notification::decode(text).unwrap() {
            Notification::Comm(comm) => comm,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(comm.kind, "Put");
        assert_eq!(comm.key.as_deref(), Some("Ag=="));
        assert!(comm.sub_key.is_none());

        let text = r#"{"type":"Clean","data":{"source":"AA==","destination":"AQ=="}}"#;
        let clean = Notification::decode(text).unwrap();
        assert_eq!(clean.tag(), "Clean");
    }

    #[test]
    fn unknown_tags_are_errors() {
        let text = r#"{"type":"Reticulate","data":{}}"#;
        assert!(matches!(
            Notification::decode(text),
            Err(Error::UnknownTag(tag)) if tag == "Reticulate"
        ));
        assert!(matches!(Notification::decode("not json"), Err(Error::Decode(_))));
        // a known tag with a broken payload is a decode error, not an unknown one
        let text = r#"{"type":"Sync","data":{"source":"AA=="}}"#;
        assert!(matches!(Notification::decode(text), Err(Error::Decode(_))));
    }
}
