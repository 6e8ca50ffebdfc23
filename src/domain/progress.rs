//! Progress events streamed to subscribers and persisted per process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Progress,
    Success,
    Error,
}

/// One entry in a process's progress stream.
///
/// A `node: true` event opens a new hierarchical step; subsequent non-node
/// events are leaves under the most recent node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub time: DateTime<Utc>,
    pub step: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub node: bool,
}

impl ProgressEvent {
    pub fn new(
        step: impl Into<String>,
        message: impl Into<String>,
        kind: ProgressKind,
        node: bool,
    ) -> Self {
        Self {
            time: Utc::now(),
            step: step.into(),
            message: message.into(),
            kind,
            node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProgressKind::Progress).unwrap(),
            "\"progress\""
        );
        assert_eq!(
            serde_json::to_string(&ProgressKind::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&ProgressKind::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn event_serializes_kind_under_type_key() {
        let event = ProgressEvent::new("create-registry", "Creating Registry", ProgressKind::Progress, true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["step"], "create-registry");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["node"], true);
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn event_roundtrips_through_json() {
        let event = ProgressEvent::new("finish-setup", "Process finish with success", ProgressKind::Success, true);
        let json = serde_json::to_string(&event).unwrap();
        let back: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
