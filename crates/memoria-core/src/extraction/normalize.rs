//! Trigger payload normalization.
//!
//! Trigger payloads arrive from the UI, from scheduled jobs and from older
//! clients, each with a slightly different shape. `normalize` parses all of
//! them into one canonical `ExtractionRequest` and rejects anything malformed
//! at the boundary, so the rest of the orchestrator never sees optionals it
//! has to re-check.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use memoria_types::error::ValidationError;
use memoria_types::extraction::{ExtractionRequest, SourceKind};
use memoria_types::memory::MemoryLayer;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Raw payload shape
// ---------------------------------------------------------------------------

/// A field that may be sent as a single value or as an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Identifiers are strings, but some producers send numeric ids.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

/// Dates as RFC 3339 / `YYYY-MM-DD` strings or epoch milliseconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDate {
    Millis(i64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawPayload {
    #[serde(alias = "async_task_id")]
    async_task_id: Option<String>,
    #[serde(alias = "user_id")]
    user_id: Option<OneOrMany<RawId>>,
    #[serde(alias = "user_ids")]
    user_ids: Option<OneOrMany<RawId>>,
    #[serde(alias = "topic_id")]
    topic_id: Option<OneOrMany<RawId>>,
    #[serde(alias = "topic_ids")]
    topic_ids: Option<OneOrMany<RawId>>,
    source: Option<OneOrMany<String>>,
    sources: Option<OneOrMany<String>>,
    layers: Option<OneOrMany<String>>,
    #[serde(alias = "fromDate", alias = "from_date")]
    from: Option<RawDate>,
    #[serde(alias = "toDate", alias = "to_date")]
    to: Option<RawDate>,
    #[serde(alias = "force_all")]
    force_all: Option<bool>,
    #[serde(alias = "force_topics")]
    force_topics: Option<bool>,
    #[serde(alias = "user_initiated")]
    user_initiated: Option<bool>,
    #[serde(alias = "base_url")]
    base_url: Option<String>,
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Parse a permissive trigger payload into a canonical `ExtractionRequest`.
///
/// Unknown fields are ignored. Absent `layers` means every layer and absent
/// `sources` means `{chat-topic}`. Fails on non-object payloads, unparseable
/// dates, unknown layer names, blank ids, or `from > to`.
pub fn normalize(raw: &Value) -> Result<ExtractionRequest, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject);
    }

    let payload: RawPayload = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::field("payload", e.to_string()))?;

    let async_task_id = payload
        .async_task_id
        .map(|id| {
            Uuid::parse_str(id.trim()).map_err(|e| ValidationError::field("asyncTaskId", e.to_string()))
        })
        .transpose()?;

    let user_ids = merge_ids("userIds", payload.user_id, payload.user_ids)?;
    let topic_ids = merge_ids("topicIds", payload.topic_id, payload.topic_ids)?;
    let sources = parse_sources(payload.source, payload.sources)?;
    let layers = parse_layers(payload.layers)?;

    let from = payload
        .from
        .map(|d| parse_date("from", d, DayBound::Start))
        .transpose()?;
    let to = payload
        .to
        .map(|d| parse_date("to", d, DayBound::End))
        .transpose()?;

    let request = ExtractionRequest {
        async_task_id,
        user_ids,
        topic_ids,
        sources,
        layers,
        from,
        to,
        force_all: payload.force_all.unwrap_or(false),
        force_topics: payload.force_topics.unwrap_or(false),
        user_initiated: payload.user_initiated.unwrap_or(false),
        base_url: payload.base_url.map(|u| u.trim().to_string()).unwrap_or_default(),
    };

    request.validate()?;
    Ok(request)
}

/// Singular then plural, order preserved, duplicates dropped.
fn merge_ids(
    field: &str,
    single: Option<OneOrMany<RawId>>,
    many: Option<OneOrMany<RawId>>,
) -> Result<Vec<String>, ValidationError> {
    let mut ids: Vec<String> = Vec::new();
    let raw = single
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .chain(many.map(OneOrMany::into_vec).unwrap_or_default());

    for id in raw {
        let id = match id {
            RawId::Text(text) => text.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        };
        if id.is_empty() {
            return Err(ValidationError::field(field, "identifier must not be blank"));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn parse_sources(
    single: Option<OneOrMany<String>>,
    many: Option<OneOrMany<String>>,
) -> Result<BTreeSet<SourceKind>, ValidationError> {
    if single.is_none() && many.is_none() {
        return Ok(BTreeSet::from([SourceKind::ChatTopic]));
    }

    let mut sources = BTreeSet::new();
    let names = single
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .chain(many.map(OneOrMany::into_vec).unwrap_or_default());
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::field("sources", "source must not be blank"));
        }
        sources.insert(SourceKind::from(name));
    }
    Ok(sources)
}

fn parse_layers(raw: Option<OneOrMany<String>>) -> Result<BTreeSet<MemoryLayer>, ValidationError> {
    raw.map(OneOrMany::into_vec)
        .unwrap_or_default()
        .iter()
        .map(|name| {
            name.parse::<MemoryLayer>()
                .map_err(|reason| ValidationError::field("layers", reason))
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum DayBound {
    Start,
    End,
}

/// A bare `YYYY-MM-DD` covers the whole day: start of day for `from`, last
/// millisecond of the day for `to`.
fn parse_date(field: &str, raw: RawDate, bound: DayBound) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = |value: String| ValidationError::InvalidDate {
        field: field.to_string(),
        value,
    };

    match raw {
        RawDate::Millis(ms) => DateTime::from_timestamp_millis(ms).ok_or_else(|| invalid(ms.to_string())),
        RawDate::Text(text) => {
            let text = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Ok(dt.with_timezone(&Utc));
            }
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid(text.to_string()))?;
            let time = match bound {
                DayBound::Start => date.and_hms_milli_opt(0, 0, 0, 0),
                DayBound::End => date.and_hms_milli_opt(23, 59, 59, 999),
            };
            time.map(|t| t.and_utc()).ok_or_else(|| invalid(text.to_string()))
        }
    }
}
