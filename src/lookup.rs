//! Pod label lookups and span enrichment
//!
//! Direct lookups return the full label map of an indexed pod. Span
//! enrichment resolves a pod identity from the span's tags, using the first
//! configured key present, and attaches the pod's labels as tags.

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::forwarder::Payload;
use crate::index::PodIndex;
use crate::k8s::types::{IdentityScheme, PodIdentity};
use crate::metrics::Metrics;
use bytes::Bytes;
use flate2::read::GzDecoder;
use podtag_common::{decode_spans, encode_spans, Span, JSON_CONTENT_TYPE};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use tracing::{debug, info, warn};

/// Selects which labels become tags and how their keys are spelled
#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    allow: BTreeSet<String>,
    prefix: String,
}

impl LabelFilter {
    pub fn new<I, S>(allow: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            prefix: prefix.into(),
        }
    }

    /// Allowed labels as tags. The allow-list matches bare label keys; the
    /// prefix only applies to the emitted key.
    pub fn emit(&self, labels: &BTreeMap<String, String>) -> Vec<(String, String)> {
        labels
            .iter()
            .filter(|(key, _)| self.allow.is_empty() || self.allow.contains(*key))
            .map(|(key, value)| (format!("{}{}", self.prefix, key), value.clone()))
            .collect()
    }
}

/// Result of enriching one span
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// None of the identity keys were present
    NoIdentity,
    /// An identity key was present but its value is not a valid identity
    InvalidIdentity { key: String, value: String },
    NotFound { identity: PodIdentity },
    Enriched { identity: PodIdentity, tags: usize },
}

impl EnrichOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EnrichOutcome::NoIdentity => "no_identity",
            EnrichOutcome::InvalidIdentity { .. } => "invalid_identity",
            EnrichOutcome::NotFound { .. } => "not_found",
            EnrichOutcome::Enriched { .. } => "enriched",
        }
    }
}

/// Per-batch tally of enrichment outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub spans: usize,
    pub enriched: usize,
    /// False when the body was passed through without being decoded
    pub decoded: bool,
}

pub struct LookupService {
    index: PodIndex,
    scheme: IdentityScheme,
    identity_keys: Vec<String>,
    labels: LabelFilter,
    metrics: Metrics,
    max_body_bytes: usize,
}

impl LookupService {
    pub fn new(
        index: PodIndex,
        scheme: IdentityScheme,
        identity_keys: Vec<String>,
        labels: LabelFilter,
        metrics: Metrics,
    ) -> Self {
        Self {
            index,
            scheme,
            identity_keys,
            labels,
            metrics,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Cap on a decompressed span batch; larger batches pass through
    /// compressed.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn scheme(&self) -> IdentityScheme {
        self.scheme
    }

    /// Labels of the pod with this identity, or `None` if it is not indexed
    pub fn lookup(&self, identity: &PodIdentity) -> Option<BTreeMap<String, String>> {
        let labels = self.index.get(identity).map(|record| record.labels.clone());
        self.metrics.record_lookup(labels.is_some());
        labels
    }

    /// Attach pod labels to `span` as tags. Never fails; a span that cannot
    /// be enriched is left untouched.
    pub fn enrich(&self, span: &mut Span) -> EnrichOutcome {
        let outcome = self.enrich_span(span);
        self.metrics.record_span(outcome.as_str());
        outcome
    }

    fn enrich_span(&self, span: &mut Span) -> EnrichOutcome {
        let Some((key, value)) = span.first_tag(self.identity_keys.iter().map(String::as_str))
        else {
            return EnrichOutcome::NoIdentity;
        };

        let identity = match self.scheme.parse(value) {
            Ok(identity) => identity,
            Err(e) => {
                debug!(trace_id = %span.trace_id, error = %e, "Span carries an invalid pod identity");
                return EnrichOutcome::InvalidIdentity {
                    key: key.to_string(),
                    value: value.to_string(),
                };
            }
        };

        let Some(record) = self.index.get(&identity) else {
            self.metrics.record_lookup(false);
            info!(trace_id = %span.trace_id, pod = %identity, "No indexed pod for span, forwarding as is");
            return EnrichOutcome::NotFound { identity };
        };
        self.metrics.record_lookup(true);

        let mut count = 0;
        for (key, value) in self.labels.emit(&record.labels) {
            if span.tags.contains_key(&key) {
                debug!(trace_id = %span.trace_id, tag = %key, "Span already carries tag, keeping its value");
                continue;
            }
            span.tags.insert(key, value);
            count += 1;
        }

        EnrichOutcome::Enriched {
            identity,
            tags: count,
        }
    }

    /// Enrich a request body holding a span list.
    ///
    /// Gzip bodies are inflated first. Bodies that are not JSON span lists,
    /// or that use another encoding, are passed through untouched with their
    /// original headers, as are batches in which no span picked up a tag.
    /// An enriched batch is forwarded uncompressed.
    pub fn enrich_batch(
        &self,
        content_type: &str,
        content_encoding: Option<&str>,
        body: Bytes,
    ) -> (Payload, BatchSummary) {
        let passthrough = |body: Bytes| Payload {
            content_type: content_type.to_string(),
            content_encoding: content_encoding.map(str::to_string),
            body,
        };

        if !is_json(content_type) {
            debug!(content_type, "Forwarding non-JSON span batch without enrichment");
            return (passthrough(body), BatchSummary::default());
        }

        let decoded = match content_encoding.map(str::trim) {
            None | Some("") => Ok(body.clone()),
            Some(encoding) if encoding.eq_ignore_ascii_case("identity") => Ok(body.clone()),
            Some(encoding) if encoding.eq_ignore_ascii_case("gzip") => self.gunzip(&body),
            Some(encoding) => Err(format!("unsupported content encoding {}", encoding)),
        };
        let plain = match decoded {
            Ok(plain) => plain,
            Err(reason) => {
                warn!(%reason, "Forwarding span batch without enrichment");
                return (passthrough(body), BatchSummary::default());
            }
        };

        let mut spans = match decode_spans(&plain) {
            Ok(spans) => spans,
            Err(e) => {
                warn!(error = %e, "Span batch did not decode, forwarding without enrichment");
                return (passthrough(body), BatchSummary::default());
            }
        };

        let enriched = spans
            .iter_mut()
            .map(|span| self.enrich(span))
            .filter(|outcome| matches!(outcome, EnrichOutcome::Enriched { tags, .. } if *tags > 0))
            .count();

        let summary = BatchSummary {
            spans: spans.len(),
            enriched,
            decoded: true,
        };

        if enriched == 0 {
            return (passthrough(body), summary);
        }

        match encode_spans(&spans) {
            Ok(encoded) => (
                Payload {
                    content_type: content_type.to_string(),
                    content_encoding: None,
                    body: Bytes::from(encoded),
                },
                summary,
            ),
            Err(e) => {
                warn!(error = %e, "Failed to re-encode enriched spans, forwarding original");
                (
                    passthrough(body),
                    BatchSummary {
                        enriched: 0,
                        ..summary
                    },
                )
            }
        }
    }

    fn gunzip(&self, body: &[u8]) -> std::result::Result<Bytes, String> {
        let limit = self.max_body_bytes as u64;
        let mut plain = Vec::new();
        GzDecoder::new(body)
            .take(limit + 1)
            .read_to_end(&mut plain)
            .map_err(|e| format!("gzip body did not inflate: {}", e))?;

        if plain.len() as u64 > limit {
            return Err(format!("inflated span batch exceeds {} bytes", limit));
        }
        Ok(Bytes::from(plain))
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
        .unwrap_or(false)
}
