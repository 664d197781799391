//! Event and definition file loading
//!
//! Events arrive as newline-delimited JSON (one record per line) or as a JSON
//! array; funnel definitions arrive as a JSON array.

use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;
use crate::types::{Event, FunnelDefinition};

/// A stored event row as ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Owning tenant
    #[serde(default, alias = "tenant", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub session_id: String,
    pub event_name: String,
    pub timestamp_ms: i64,
}

impl EventRecord {
    /// Split into the owning tenant and the scanned event
    pub fn into_parts(self) -> (Option<String>, Event) {
        (
            self.api_key,
            Event {
                session_id: self.session_id,
                event_name: self.event_name,
                timestamp_ms: self.timestamp_ms,
            },
        )
    }
}

/// A funnel definition as written in a definitions file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionRecord {
    #[serde(alias = "tenant")]
    pub api_key: String,
    pub name: String,
    pub steps: Vec<String>,
}

/// Parse NDJSON event records; blank lines are skipped
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<EventRecord>, AnalyticsError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(AnalyticsError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// Parse a JSON array of event records
pub fn parse_event_array(json: &str) -> Result<Vec<EventRecord>, AnalyticsError> {
    let records: Vec<EventRecord> = serde_json::from_str(json)?;
    Ok(records)
}

/// Parse and validate a JSON array of funnel definitions
pub fn parse_definitions(json: &str) -> Result<Vec<FunnelDefinition>, AnalyticsError> {
    let records: Vec<DefinitionRecord> = serde_json::from_str(json)?;
    records
        .into_iter()
        .map(|r| FunnelDefinition::new(r.api_key, r.name, r.steps))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let input = r#"
{"api_key": "key", "session_id": "s1", "event_name": "view", "timestamp_ms": 1}

{"session_id": "s2", "event_name": "view", "timestamp_ms": 2, "platform": "android"}
"#;
        let records = parse_ndjson(input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].api_key.as_deref(), Some("key"));
        assert_eq!(records[1].api_key, None);
    }

    #[test]
    fn test_parse_ndjson_reports_line_number() {
        let input = "{\"session_id\": \"s1\", \"event_name\": \"view\", \"timestamp_ms\": 1}\nnot json\n";
        let err = parse_ndjson(input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_tenant_alias() {
        let records = parse_event_array(
            r#"[{"tenant": "t1", "session_id": "s", "event_name": "e", "timestamp_ms": 5}]"#,
        )
        .unwrap();
        let (tenant, event) = records[0].clone().into_parts();
        assert_eq!(tenant.as_deref(), Some("t1"));
        assert_eq!(event, Event::new("s", "e", 5));
    }

    #[test]
    fn test_parse_definitions_validates_steps() {
        let ok = parse_definitions(r#"[{"api_key": "k", "name": "signup", "steps": ["view", "signup"]}]"#)
            .unwrap();
        assert_eq!(ok[0].name, "signup");

        let err = parse_definitions(r#"[{"api_key": "k", "name": "bad", "steps": []}]"#);
        assert!(matches!(err, Err(AnalyticsError::InvalidDefinition(_))));
    }
}
