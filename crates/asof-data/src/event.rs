//! Append-only raw event streams.
//!
//! Each stream (`members`, `transactions`, `user_logs`, ...) is a sequence of
//! [`RawEvent`]s in arrival order. An event's position in that sequence is its
//! `seq`, which never changes once assigned: streams only grow at the end.
//!
//! Streams are loaded from JSON Lines, one event per line:
//!
//! ```json
//! {"subject_id": "u1", "event_ts": "2017-01-05", "event_type": "transaction", "payload": {"amount": 149.0}}
//! ```
//!
//! Lines that fail to parse (bad JSON, unparseable timestamp, non-numeric
//! payload) are rejected and counted in [`LoadReport`], never joined.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::BufRead,
};

use serde::{Deserialize, Serialize};

use crate::{DataError, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub subject_id: String,
    pub event_ts: Timestamp,
    pub event_type: String,
    #[serde(default)]
    pub payload: BTreeMap<String, f64>,
}

impl RawEvent {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<f64> {
        self.payload.get(name).copied()
    }
}

/// Outcome of loading one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub accepted: usize,
    pub rejected: usize,
    /// 1-based line numbers of the first few rejected lines.
    pub rejected_lines: Vec<usize>,
}

const MAX_REPORTED_LINES: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct EventStream {
    name: String,
    events: Vec<RawEvent>,
    /// Per-subject seqs ordered by `(event_ts, seq)`.
    by_subject: BTreeMap<String, Vec<usize>>,
}

impl EventStream {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            by_subject: BTreeMap::new(),
        }
    }

    /// Builds a stream from events in arrival order.
    pub fn from_events<I>(name: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut stream = Self::new(name);
        for event in events {
            stream.push(event);
        }
        stream
    }

    /// Reads a JSON Lines stream, skipping blank lines and rejecting
    /// malformed ones.
    pub fn from_jsonl<R>(name: impl Into<String>, reader: R) -> std::io::Result<(Self, LoadReport)>
    where
        R: BufRead,
    {
        let mut stream = Self::new(name);
        let mut report = LoadReport::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawEvent>(&line) {
                Ok(event) => {
                    stream.push(event);
                    report.accepted += 1;
                }
                Err(e) => {
                    tracing::debug!(stream = %stream.name, line = i + 1, error = %e, "rejected event");
                    report.rejected += 1;
                    if report.rejected_lines.len() < MAX_REPORTED_LINES {
                        report.rejected_lines.push(i + 1);
                    }
                }
            }
        }
        if report.rejected > 0 {
            tracing::warn!(
                stream = %stream.name,
                rejected = report.rejected,
                accepted = report.accepted,
                "rejected malformed events"
            );
        }
        Ok((stream, report))
    }

    /// Appends an event and returns its seq.
    pub fn push(&mut self, event: RawEvent) -> usize {
        let seq = self.events.len();
        let ts = event.event_ts;
        let seqs = self.by_subject.entry(event.subject_id.clone()).or_default();
        // seqs are strictly increasing, so ties on ts keep arrival order
        let pos = seqs.partition_point(|&s| self.events[s].event_ts <= ts);
        seqs.insert(pos, seq);
        self.events.push(event);
        seq
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn get(&self, seq: usize) -> Option<&RawEvent> {
        self.events.get(seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RawEvent)> + '_ {
        self.events.iter().enumerate()
    }

    /// Events of one subject ordered by `(event_ts, seq)`.
    pub fn subject_events<'a>(
        &'a self,
        subject_id: &str,
    ) -> impl DoubleEndedIterator<Item = (usize, &'a RawEvent)> + use<'a> {
        self.by_subject
            .get(subject_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&seq| (seq, &self.events[seq]))
    }

    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }

    /// Earliest and latest event timestamp, or `None` when empty.
    #[must_use]
    pub fn ts_range(&self) -> Option<(Timestamp, Timestamp)> {
        let min = self.events.iter().map(|e| e.event_ts).min()?;
        let max = self.events.iter().map(|e| e.event_ts).max()?;
        Some((min, max))
    }

    /// Payload field names present anywhere in the stream.
    #[must_use]
    pub fn fields(&self) -> BTreeSet<&str> {
        self.events
            .iter()
            .flat_map(|e| e.payload.keys().map(String::as_str))
            .collect()
    }
}

/// All loaded streams, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    streams: BTreeMap<String, EventStream>,
}

impl EventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stream: EventStream) -> Result<(), DataError> {
        if self.streams.contains_key(stream.name()) {
            return Err(DataError::DuplicateStream {
                stream: stream.name().to_owned(),
            });
        }
        self.streams.insert(stream.name().to_owned(), stream);
        Ok(())
    }

    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&EventStream> {
        self.streams.get(name)
    }

    #[must_use]
    pub fn event(&self, stream: &str, seq: usize) -> Option<&RawEvent> {
        self.streams.get(stream)?.get(seq)
    }

    pub fn streams(&self) -> impl Iterator<Item = &EventStream> + '_ {
        self.streams.values()
    }

    #[must_use]
    pub fn total_events(&self) -> usize {
        self.streams.values().map(EventStream::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn event(subject: &str, ts: &str, amount: f64) -> RawEvent {
        RawEvent {
            subject_id: subject.to_owned(),
            event_ts: ts.parse().unwrap(),
            event_type: "transaction".to_owned(),
            payload: BTreeMap::from([("amount".to_owned(), amount)]),
        }
    }

    #[test]
    fn test_subject_events_sorted_by_time_then_arrival() {
        let stream = EventStream::from_events(
            "transactions",
            [
                event("u1", "2017-01-03", 1.0),
                event("u2", "2017-01-01", 2.0),
                event("u1", "2017-01-01", 3.0),
                event("u1", "2017-01-03", 4.0),
            ],
        );
        let seqs = stream.subject_events("u1").map(|(seq, _)| seq).collect::<Vec<_>>();
        assert_eq!(seqs, [2, 0, 3]);
        assert_eq!(stream.subject_events("nobody").count(), 0);
        assert_eq!(stream.subject_count(), 2);
        assert_eq!(stream.get(1).unwrap().field("amount"), Some(2.0));
    }

    #[test]
    fn test_jsonl_rejects_malformed_lines() {
        let input = concat!(
            r#"{"subject_id":"u1","event_ts":"2017-01-05","event_type":"t","payload":{"amount":1.5}}"#,
            "\n",
            r#"{"subject_id":"u1","event_ts":"not a date","event_type":"t"}"#,
            "\n\n",
            "{broken json\n",
            r#"{"subject_id":"u2","event_ts":20170106,"event_type":"t"}"#,
            "\n",
        );
        let (stream, report) = EventStream::from_jsonl("t", Cursor::new(input)).unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.rejected_lines, [2, 4]);
        assert!(stream.get(1).unwrap().payload.is_empty());
    }

    #[test]
    fn test_store_rejects_duplicate_stream() {
        let mut store = EventStore::new();
        store.insert(EventStream::new("a")).unwrap();
        assert_eq!(
            store.insert(EventStream::new("a")),
            Err(DataError::DuplicateStream {
                stream: "a".to_owned()
            })
        );
        assert!(store.event("a", 0).is_none());
    }

    #[test]
    fn test_ts_range_and_fields() {
        let stream = EventStream::from_events(
            "t",
            [event("u1", "2017-01-03", 1.0), event("u2", "2017-01-01", 2.0)],
        );
        let (min, max) = stream.ts_range().unwrap();
        assert_eq!(min.to_string(), "2017-01-01T00:00:00Z");
        assert_eq!(max.to_string(), "2017-01-03T00:00:00Z");
        assert_eq!(stream.fields().into_iter().collect::<Vec<_>>(), ["amount"]);
    }
}
