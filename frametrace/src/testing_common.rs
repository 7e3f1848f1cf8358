//! Helpers shared by the unit tests, the integration tests and downstream
//! crates that want to check what their instrumentation recorded.

use crate::clock::Clock;
use crate::config::TraceConfig;
use crate::session::TraceSession;
use crate::sink::{MemorySink, TraceSink};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A clock that only moves when told to. Clones share the same time, so a
/// test can keep one handle and give the other to a session.
#[derive(Clone, Default, Debug)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance_micros(&self, micros: u64) {
        self.advance(Duration::from_micros(micros));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }

    fn ticks_to_micros(&self, ticks: u64) -> u64 {
        ticks / 1_000
    }
}

/// Fails the first `failures` flushes with `io::ErrorKind::Other`, then
/// behaves like a [`MemorySink`].
#[derive(Debug)]
pub struct FlakySink {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    inner: MemorySink,
}

impl FlakySink {
    pub fn failing(failures: usize) -> FlakySink {
        FlakySink {
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: MemorySink::new(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> &MemorySink {
        &self.inner
    }
}

impl TraceSink for FlakySink {
    fn flush(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(io::Error::new(io::ErrorKind::Other, "injected flush failure"));
        }
        self.inner.flush(path, bytes)
    }
}

/// A session backed by a [`MemorySink`] and a [`ManualClock`].
pub fn memory_session(
    config: TraceConfig,
) -> (TraceSession<MemorySink, ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let session = TraceSession::with_parts(config, MemorySink::new(), clock.clone());
    (session, clock)
}

/// One entry of a document's `traceEvents` array.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParsedRecord {
    pub name: String,
    pub phase: String,
    pub process_id: u64,
    pub thread_id: String,
    pub ts: u64,
}

/// Parses a finished document, panicking if it is not well-formed
/// trace-event JSON of the shape the session writes.
pub fn parse_trace(bytes: &[u8]) -> Vec<ParsedRecord> {
    let document: Value = serde_json::from_slice(bytes).unwrap_or_else(|e| {
        panic!(
            "trace is not valid JSON ({}):\n{}",
            e,
            String::from_utf8_lossy(bytes)
        )
    });

    assert_eq!(document["displayTimeUnit"], "ns");

    document["traceEvents"]
        .as_array()
        .expect("`traceEvents` must be an array")
        .iter()
        .map(|record| {
            let object = record.as_object().expect("records must be objects");
            assert_eq!(object.len(), 5, "unexpected fields in {}", record);

            let phase = record["ph"].as_str().expect("`ph` must be a string");
            assert!(phase == "B" || phase == "E", "unexpected phase {}", phase);

            ParsedRecord {
                name: record["name"].as_str().expect("`name` must be a string").to_owned(),
                phase: phase.to_owned(),
                process_id: record["pid"].as_u64().expect("`pid` must be a number"),
                thread_id: record["tid"].as_str().expect("`tid` must be a string").to_owned(),
                ts: record["ts"]
                    .as_str()
                    .expect("`ts` must be a string")
                    .parse()
                    .expect("`ts` must hold an integer"),
            }
        })
        .collect()
}

/// Checks that every `B` has a matching `E` on the same thread, properly
/// nested and not earlier than its `B`, and that timestamps never go back
/// within a thread. Returns the number of matched pairs.
pub fn check_balanced(records: &[ParsedRecord]) -> usize {
    let mut open: FxHashMap<&str, Vec<&ParsedRecord>> = FxHashMap::default();
    let mut last_ts: FxHashMap<&str, u64> = FxHashMap::default();
    let mut pairs = 0;

    for record in records {
        let tid = record.thread_id.as_str();

        let last = last_ts.entry(tid).or_insert(0);
        assert!(
            record.ts >= *last,
            "timestamps went backwards on thread {}: {:?}",
            tid,
            record
        );
        *last = record.ts;

        let stack = open.entry(tid).or_default();
        if record.phase == "B" {
            stack.push(record);
        } else {
            let begin = stack
                .pop()
                .unwrap_or_else(|| panic!("`E` without `B`: {:?}", record));
            assert_eq!(begin.name, record.name);
            assert!(record.ts >= begin.ts);
            pairs += 1;
        }
    }

    for (tid, stack) in open {
        assert!(stack.is_empty(), "unclosed `B` records on thread {}", tid);
    }

    pairs
}

/// Opens `depth` nested durations named after `names` (cycling), advancing
/// `clock` by a microsecond at every step, and closes them again in order.
pub fn pseudo_invocation<S: TraceSink>(
    session: &TraceSession<S, ManualClock>,
    clock: &ManualClock,
    names: &[&str],
    depth: usize,
) {
    if depth == 0 {
        return;
    }

    let _guard = session.scope(names[depth % names.len()]);
    clock.advance_micros(1);
    pseudo_invocation(session, clock, names, depth - 1);
    clock.advance_micros(1);
}
