//! Span wire types shared by the podtag proxy and its clients
//!
//! These mirror the Zipkin v2 JSON model:
//! - field names are camelCase on the wire
//! - optional fields are omitted when absent
//! - fields this crate does not model are kept in `extra` so that a span
//!   survives decode/encode without losing data

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Content type of a Zipkin v2 JSON span list
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single traced operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Span {
    /// Value of the first tag in `keys` that is present on this span
    pub fn first_tag<'a, I>(&self, keys: I) -> Option<(&'a str, &str)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .find_map(|key| self.tags.get(key).map(|value| (key, value.as_str())))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Timestamped event recorded on a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub timestamp: u64,
    pub value: String,
}

/// Decode a JSON span list
pub fn decode_spans(body: &[u8]) -> serde_json::Result<Vec<Span>> {
    serde_json::from_slice(body)
}

/// Encode a span list as JSON
pub fn encode_spans(spans: &[Span]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[{
        "traceId": "5af7183fb1d4cf5f",
        "id": "352bff9a74ca9ad2",
        "parentId": "6b221d5bc9e6496c",
        "name": "get /api",
        "kind": "SERVER",
        "timestamp": 1556604172355737,
        "duration": 1431,
        "localEndpoint": {"serviceName": "backend", "ipv4": "192.168.99.1", "port": 3306},
        "annotations": [{"timestamp": 1556604172355740, "value": "wr"}],
        "tags": {"http.method": "GET", "k8s.pod": "default/backend-7d9f"},
        "shared": true
    }]"#;

    #[test]
    fn test_decode_zipkin_span() {
        let spans = decode_spans(SAMPLE.as_bytes()).expect("valid span list");

        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.trace_id, "5af7183fb1d4cf5f");
        assert_eq!(span.parent_id.as_deref(), Some("6b221d5bc9e6496c"));
        assert_eq!(
            span.local_endpoint
                .as_ref()
                .and_then(|e| e.service_name.as_deref()),
            Some("backend")
        );
        assert_eq!(span.annotations[0].value, "wr");
        assert_eq!(span.extra.get("shared"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_unknown_fields_survive_reencode() {
        let spans = decode_spans(SAMPLE.as_bytes()).unwrap();
        let encoded = encode_spans(&spans).unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(value[0]["shared"], Value::Bool(true));
        assert_eq!(value[0]["localEndpoint"]["port"], 3306);
        assert!(value[0].get("remoteEndpoint").is_none());
    }

    #[test]
    fn test_first_tag_respects_key_order() {
        let mut span = Span::default();
        span.tags.insert("pod".to_string(), "b".to_string());
        span.tags.insert("k8s.pod".to_string(), "a".to_string());

        assert_eq!(span.first_tag(["k8s.pod", "pod"]), Some(("k8s.pod", "a")));
        assert_eq!(span.first_tag(["pod", "k8s.pod"]), Some(("pod", "b")));
        assert_eq!(span.first_tag(["missing"]), None);
    }
}
