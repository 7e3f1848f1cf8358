//! Rendering of trace-event JSON.
//!
//! A finished document has the shape
//!
//! ```text
//! { "displayTimeUnit": "ns", "traceEvents": [
//!   {"name":"load","ph":"B","pid":0,"tid":"7","ts":"120"},
//!   {"name":"load","ph":"E","pid":0,"tid":"7","ts":"5120"}
//! ] }
//! ```
//!
//! Records are rendered one at a time and only ever *preceded* by a
//! separator, so the document never ends in a dangling comma no matter how
//! many records it holds (including none).

use crate::open_events::OpenEvent;
use serde::Serialize;

const PREAMBLE: &[u8] = br#"{ "displayTimeUnit": "ns", "traceEvents": ["#;
const RECORD_INDENT: &[u8] = b"\n  ";
const SEPARATOR: u8 = b',';
const CLOSING: &[u8] = b"\n] }\n";

#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize)]
pub enum Phase {
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "E")]
    End,
}

#[derive(Serialize)]
struct TraceRecord<'a> {
    name: &'a str,
    #[serde(rename = "ph")]
    phase: Phase,
    #[serde(rename = "pid")]
    process_id: u32,
    // Both are emitted as strings; that is what the trace viewers we target
    // were fed historically and they accept it.
    #[serde(rename = "tid")]
    thread_id: String,
    #[serde(rename = "ts")]
    timestamp: String,
}

pub fn preamble() -> &'static [u8] {
    PREAMBLE
}

pub fn closing() -> &'static [u8] {
    CLOSING
}

fn render(name: &str, phase: Phase, process_id: u32, thread_id: u64, ts: u64) -> Vec<u8> {
    let record = TraceRecord {
        name,
        phase,
        process_id,
        thread_id: thread_id.to_string(),
        timestamp: ts.to_string(),
    };

    // A struct of strings and integers always serializes.
    serde_json::to_vec(&record).expect("trace record serialization cannot fail")
}

/// The `"B"` record for `event`.
pub fn begin_record(event: &OpenEvent, process_id: u32) -> Vec<u8> {
    render(
        &event.name,
        Phase::Begin,
        process_id,
        event.thread_id,
        event.start_ts,
    )
}

/// The `"E"` record closing `event` at `end_ts`.
pub fn end_record(event: &OpenEvent, end_ts: u64, process_id: u32) -> Vec<u8> {
    render(&event.name, Phase::End, process_id, event.thread_id, end_ts)
}

/// The document under construction during a capture.
#[derive(Debug)]
pub struct TraceBuffer {
    bytes: Vec<u8>,
    records: usize,
}

impl TraceBuffer {
    /// A buffer holding just the preamble.
    pub fn new() -> TraceBuffer {
        TraceBuffer {
            bytes: preamble().to_vec(),
            records: 0,
        }
    }

    pub fn push_record(&mut self, record: &[u8]) {
        if self.records > 0 {
            self.bytes.push(SEPARATOR);
        }
        self.bytes.extend_from_slice(RECORD_INDENT);
        self.bytes.extend_from_slice(record);
        self.records += 1;
    }

    #[inline]
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Appends the closing sequence and hands out the finished document.
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(closing());
        self.bytes
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        TraceBuffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn event(name: &str) -> OpenEvent {
        OpenEvent {
            name: name.to_string(),
            thread_id: 3,
            start_ts: 10,
        }
    }

    #[test]
    fn empty_document_is_valid_json() {
        let doc = TraceBuffer::new().finish();
        assert!(doc.starts_with(preamble()));
        assert!(doc.ends_with(closing()));
        let value: Value = serde_json::from_slice(&doc).unwrap();
        assert_eq!(value["displayTimeUnit"], "ns");
        assert_eq!(value["traceEvents"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn separators_only_between_records() {
        let mut buffer = TraceBuffer::new();
        let ev = event("frame");
        buffer.push_record(&begin_record(&ev, 0));
        buffer.push_record(&end_record(&ev, 25, 0));
        assert_eq!(buffer.record_count(), 2);

        let doc = String::from_utf8(buffer.finish()).unwrap();
        assert!(!doc.contains(",\n]"));
        assert_eq!(doc.matches("},").count(), 1);

        let value: Value = serde_json::from_str(&doc).unwrap();
        let events = value["traceEvents"].as_array().unwrap();
        assert_eq!(events[0]["ph"], "B");
        assert_eq!(events[0]["ts"], "10");
        assert_eq!(events[1]["ph"], "E");
        assert_eq!(events[1]["ts"], "25");
        assert_eq!(events[1]["tid"], "3");
        assert_eq!(events[1]["pid"], 0);
    }

    #[test]
    fn record_field_layout() {
        let rec = begin_record(&event("load"), 0);
        assert_eq!(
            std::str::from_utf8(&rec).unwrap(),
            r#"{"name":"load","ph":"B","pid":0,"tid":"3","ts":"10"}"#
        );
    }

    #[test]
    fn names_are_escaped() {
        let ev = event("say \"hi\"\\\n");
        let mut buffer = TraceBuffer::new();
        buffer.push_record(&begin_record(&ev, 0));
        let value: Value = serde_json::from_slice(&buffer.finish()).unwrap();
        assert_eq!(value["traceEvents"][0]["name"], "say \"hi\"\\\n");
    }

    #[test]
    fn process_id_is_configurable() {
        let rec = end_record(&event("x"), 11, 42);
        let value: Value = serde_json::from_slice(&rec).unwrap();
        assert_eq!(value["pid"], 42);
    }
}
