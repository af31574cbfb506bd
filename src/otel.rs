//! OTLP log payload parsing.
//!
//! Translates log records shipped by the telemetry pipeline (Vector OTLP
//! sink format) into [`ErrorEvent`]s. This is a thin shim: anything that
//! does not look like an error record is dropped, never an error.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use patrol_core::{ErrorEvent, ErrorRecord};

/// Resource attributes worth carrying into the record context: repo and
/// revision hints used later by context resolution.
const RESOURCE_HINT_KEYS: [&str; 6] = [
    "git.repository.url",
    "git.commit.sha",
    "git.sha",
    "vcs.repository.url",
    "vcs.ref.head.name",
    "vcs.ref.head.revision",
];

/// Parse one OTLP log payload (`resourceLogs` envelope) into an event.
pub fn parse_otel_log(otel_log: &Value) -> Option<ErrorEvent> {
    let resource_log = otel_log.get("resourceLogs")?.as_array()?.first()?;
    let resource_attrs = resource_log
        .pointer("/resource/attributes")
        .cloned()
        .unwrap_or(Value::Null);

    let log_record = resource_log
        .get("scopeLogs")?
        .as_array()?
        .first()?
        .get("logRecords")?
        .as_array()?
        .first()?;

    let error_log = extract_error_record(log_record, &resource_attrs);

    let trace_id = string_attr(log_record, "traceId").unwrap_or_default();
    let span_id = string_attr(log_record, "spanId").unwrap_or_default();

    let timestamp = log_record
        .get("timeUnixNano")
        .and_then(parse_nanos)
        .map(|nanos| nanos / 1_000_000)
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    let event_id = if !trace_id.is_empty() && !span_id.is_empty() {
        format!("{trace_id}-{span_id}")
    } else {
        format!("otel-{timestamp}")
    };

    let repository_url = ["git.repository.url", "vcs.repository.url", "repository.url"]
        .iter()
        .find_map(|key| string_attr(&resource_attrs, key));

    Some(ErrorEvent {
        event_id,
        timestamp,
        error_log,
        repository_url,
    })
}

fn extract_error_record(log_record: &Value, resource_attrs: &Value) -> ErrorRecord {
    let body = log_record.get("body");
    let mut message = body
        .and_then(|b| {
            b.get("stringValue")
                .and_then(Value::as_str)
                .or_else(|| b.as_str())
        })
        .unwrap_or("")
        .to_string();

    let attributes = log_record.get("attributes").cloned().unwrap_or(Value::Null);

    let exception_type = string_attr(&attributes, "exception.type");
    let exception_message = string_attr(&attributes, "exception.message");
    let stack_trace = string_attr(&attributes, "exception.stacktrace");

    match (&exception_type, &exception_message) {
        (Some(kind), Some(msg)) => message = format!("{kind}: {msg}"),
        (None, Some(msg)) => message = msg.clone(),
        _ => {}
    }
    if message.is_empty() {
        message = "Unknown error".to_string();
    }

    let file_path = string_attr(&attributes, "code.filepath");
    let line_number = attributes
        .get("code.lineno")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .and_then(|n| u32::try_from(n).ok());

    // Everything that is not exception/code metadata travels as context.
    let mut context: HashMap<String, String> = HashMap::new();
    if let Some(map) = attributes.as_object() {
        for (key, value) in map {
            if key.starts_with("exception.") || key.starts_with("code.") {
                continue;
            }
            if let Some(rendered) = render_value(value) {
                context.insert(key.clone(), rendered);
            }
        }
    }
    for key in ["service.name", "service.version"] {
        if let Some(value) = string_attr(resource_attrs, key) {
            context.insert(key.to_string(), value);
        }
    }
    for key in RESOURCE_HINT_KEYS {
        if let Some(value) = string_attr(resource_attrs, key) {
            context.insert(key.to_string(), value);
        }
    }

    let timestamp = log_record
        .get("timeUnixNano")
        .and_then(parse_nanos)
        .map(|nanos| nanos / 1_000_000)
        .unwrap_or(0);

    ErrorRecord {
        message,
        code: exception_type,
        file_path,
        line_number,
        stack_trace,
        context,
        timestamp,
    }
}

/// Parse a batch of OTLP payloads, dropping anything unparsable.
pub fn parse_otel_batch(otel_logs: &[Value]) -> Vec<ErrorEvent> {
    otel_logs.iter().filter_map(parse_otel_log).collect()
}

/// Parse a sink payload: `{"logs": [...]}` with either a single record
/// object or an array of them.
pub fn parse_sink_payload(payload: &Value) -> Vec<ErrorEvent> {
    match payload.get("logs") {
        Some(Value::Array(logs)) => parse_otel_batch(logs),
        Some(single @ Value::Object(_)) => parse_otel_log(single).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn string_attr(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_nanos(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "resourceLogs": [{
                "resource": {
                    "attributes": {
                        "service.name": "user-api",
                        "service.version": "1.4.2",
                        "git.repository.url": "https://github.com/acme/user-api",
                        "git.commit.sha": "a1b2c3d4e5f60718"
                    }
                },
                "scopeLogs": [{
                    "scope": { "name": "app-logger" },
                    "logRecords": [{
                        "timeUnixNano": "1707817200000000000",
                        "severityNumber": 17,
                        "severityText": "ERROR",
                        "body": { "stringValue": "unhandled exception" },
                        "attributes": {
                            "exception.type": "TypeError",
                            "exception.message": "Cannot read property of undefined",
                            "exception.stacktrace": "at getUserById (src/handlers/user.ts:45:15)",
                            "code.filepath": "src/handlers/user.ts",
                            "code.lineno": 45,
                            "http.method": "GET"
                        },
                        "traceId": "abc123",
                        "spanId": "def456"
                    }]
                }]
            }]
        })
    }

    #[test]
    fn test_parse_full_payload() {
        let event = parse_otel_log(&sample_payload()).unwrap();

        assert_eq!(event.event_id, "abc123-def456");
        assert_eq!(event.timestamp, 1707817200000);
        assert_eq!(
            event.repository_url.as_deref(),
            Some("https://github.com/acme/user-api")
        );

        let record = &event.error_log;
        assert_eq!(record.message, "TypeError: Cannot read property of undefined");
        assert_eq!(record.code.as_deref(), Some("TypeError"));
        assert_eq!(record.file_path.as_deref(), Some("src/handlers/user.ts"));
        assert_eq!(record.line_number, Some(45));
        assert_eq!(record.context.get("service.name").unwrap(), "user-api");
        assert_eq!(record.context.get("http.method").unwrap(), "GET");
        assert_eq!(
            record.context.get("git.commit.sha").unwrap(),
            "a1b2c3d4e5f60718"
        );
        assert!(!record.context.contains_key("exception.type"));
        assert!(!record.context.contains_key("code.filepath"));
    }

    #[test]
    fn test_missing_resource_logs_is_none() {
        assert!(parse_otel_log(&json!({})).is_none());
        assert!(parse_otel_log(&json!({"resourceLogs": []})).is_none());
    }

    #[test]
    fn test_message_fallbacks() {
        let mut payload = sample_payload();
        let attrs = payload
            .pointer_mut("/resourceLogs/0/scopeLogs/0/logRecords/0/attributes")
            .unwrap();
        *attrs = json!({});

        let event = parse_otel_log(&payload).unwrap();
        assert_eq!(event.error_log.message, "unhandled exception");
        assert!(event.error_log.code.is_none());
    }

    #[test]
    fn test_event_id_without_trace() {
        let mut payload = sample_payload();
        let record = payload
            .pointer_mut("/resourceLogs/0/scopeLogs/0/logRecords/0")
            .unwrap();
        record["traceId"] = json!("");

        let event = parse_otel_log(&payload).unwrap();
        assert!(event.event_id.starts_with("otel-"));
    }

    #[test]
    fn test_bad_line_number_ignored() {
        let mut payload = sample_payload();
        let record = payload
            .pointer_mut("/resourceLogs/0/scopeLogs/0/logRecords/0")
            .unwrap();
        record["attributes"]["code.lineno"] = json!("not-a-number");

        let event = parse_otel_log(&payload).unwrap();
        assert!(event.error_log.line_number.is_none());
    }

    #[test]
    fn test_sink_payload_batch() {
        let payload = json!({ "logs": [sample_payload(), sample_payload()] });
        assert_eq!(parse_sink_payload(&payload).len(), 2);
    }

    #[test]
    fn test_sink_payload_single_object() {
        let payload = json!({ "logs": sample_payload() });
        assert_eq!(parse_sink_payload(&payload).len(), 1);
    }

    #[test]
    fn test_sink_payload_empty() {
        assert!(parse_sink_payload(&json!({})).is_empty());
        assert!(parse_sink_payload(&json!({ "logs": [] })).is_empty());
    }
}
