use crate::clock::{Clock, WallTime};
use crate::config::{Strictness, TraceConfig};
use crate::error::TraceError;
use crate::open_events::OpenEventStack;
use crate::serialization::{self, TraceBuffer};
use crate::sink::{FileSink, TraceSink};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Identifier of the calling thread, stable for the thread's lifetime.
#[inline]
pub fn current_thread_id() -> u64 {
    thread_id::get() as u64
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum SessionState {
    Idle,
    Capturing,
}

/// Counters for the current (or most recently stopped) capture.
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug)]
pub struct TraceStats {
    /// Durations popped and written as a `B`/`E` pair.
    pub durations: u64,
    /// Pushes dropped because the session was at capacity.
    pub dropped_pushes: u64,
    /// Pops that had no open event to close.
    pub unbalanced_pops: u64,
    /// Names cut down to `max_name_len`.
    pub truncated_names: u64,
    /// Events still open when the capture stopped.
    pub discarded_open: u64,
}

/// Records nested durations from any number of threads and writes them out
/// as a trace-event JSON document when the capture stops.
///
/// One session lives for as long as the instrumented program (or subsystem)
/// does and can run any number of captures, one at a time. Share it with an
/// `Arc` or by reference; there is no global instance.
pub struct TraceSession<S: TraceSink = FileSink, C: Clock = WallTime> {
    config: TraceConfig,
    sink: S,
    clock: C,
    // Mirrors `Inner::capture.is_some()` so idle push/pop stay lock-free.
    active: AtomicBool,
    inner: Mutex<Inner>,
}

struct Inner {
    capture: Option<Capture>,
    finished: Option<FinishedTrace>,
    stats: TraceStats,
}

struct Capture {
    output_path: PathBuf,
    origin: u64,
    buffer: TraceBuffer,
    threads: FxHashMap<u64, ThreadTimeline>,
    open_total: usize,
}

struct FinishedTrace {
    document: Vec<u8>,
    // `Some` until the document has reached the sink.
    unflushed_path: Option<PathBuf>,
}

/// The open events and not-yet-emitted records of one thread.
///
/// Records are held back until the thread's outermost region closes so that
/// they land in the shared buffer in timestamp order.
struct ThreadTimeline {
    open: OpenEventStack,
    // Index into `pending` of the `B` record of each open event.
    begin_slots: Vec<usize>,
    pending: Vec<PendingRecord>,
    // Pushes dropped on this thread that have not been popped yet. While
    // non-zero every push is dropped too, so the next pops match them.
    dropped_depth: usize,
}

struct PendingRecord {
    bytes: Vec<u8>,
    closed: bool,
}

impl ThreadTimeline {
    fn new(capacity: usize) -> ThreadTimeline {
        ThreadTimeline {
            open: OpenEventStack::new(capacity),
            begin_slots: Vec::new(),
            pending: Vec::new(),
            dropped_depth: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.open.is_empty() && self.pending.is_empty() && self.dropped_depth == 0
    }

    fn emit_closed(&mut self, buffer: &mut TraceBuffer) {
        for record in self.pending.drain(..) {
            if record.closed {
                buffer.push_record(&record.bytes);
            }
        }
    }
}

impl TraceSession<FileSink, WallTime> {
    /// A session writing to the file system and timing with [`WallTime`].
    pub fn new(config: TraceConfig) -> Self {
        TraceSession::with_parts(config, FileSink, WallTime::new())
    }
}

impl<S: TraceSink, C: Clock> TraceSession<S, C> {
    pub fn with_parts(config: TraceConfig, sink: S, clock: C) -> Self {
        TraceSession {
            config,
            sink,
            clock,
            active: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                capture: None,
                finished: None,
                stats: TraceStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn is_capturing(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        if self.inner.lock().capture.is_some() {
            SessionState::Capturing
        } else {
            SessionState::Idle
        }
    }

    pub fn stats(&self) -> TraceStats {
        self.inner.lock().stats
    }

    /// Starts recording into a fresh buffer that will be written to `path`.
    ///
    /// Any document kept from the previous capture is discarded, including
    /// one whose flush failed.
    pub fn capture_start<P: AsRef<Path>>(&self, path: P) -> Result<(), TraceError> {
        let path = path.as_ref();
        let mut inner = self.inner.lock();

        if inner.capture.is_some() {
            return self.misuse(TraceError::AlreadyCapturing);
        }

        if let Some(FinishedTrace {
            unflushed_path: Some(old_path),
            ..
        }) = inner.finished.take()
        {
            warn!(
                "discarding unflushed trace for `{}` as a new capture starts",
                old_path.display()
            );
        }

        inner.stats = TraceStats::default();
        inner.capture = Some(Capture {
            output_path: path.to_path_buf(),
            origin: self.clock.now(),
            buffer: TraceBuffer::new(),
            threads: FxHashMap::default(),
            open_total: 0,
        });
        self.active.store(true, Ordering::Release);

        info!("trace capture started, writing to `{}`", path.display());
        Ok(())
    }

    /// Ends the capture and writes the document to the path given to
    /// `capture_start`.
    ///
    /// Events still open are dropped. If the write fails the document is
    /// kept and [`TraceSession::retry_flush`] can try again.
    pub fn capture_stop(&self) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();

        let capture = match inner.capture.take() {
            Some(capture) => capture,
            None => return self.misuse(TraceError::NotCapturing),
        };
        self.active.store(false, Ordering::Release);

        let Capture {
            output_path,
            mut buffer,
            mut threads,
            ..
        } = capture;

        let mut discarded = 0;
        for timeline in threads.values_mut() {
            discarded += timeline.open.len() as u64;
            timeline.emit_closed(&mut buffer);
        }
        inner.stats.discarded_open += discarded;
        if discarded > 0 {
            debug!("discarding {} unterminated trace events", discarded);
        }

        let records = buffer.record_count();
        inner.finished = Some(FinishedTrace {
            document: buffer.finish(),
            unflushed_path: Some(output_path),
        });

        info!("trace capture stopped with {} records", records);
        Self::flush_finished(&self.sink, &mut inner)
    }

    /// Writes the document of the last `capture_stop` again if that write
    /// failed. Does nothing if there is nothing left to write.
    pub fn retry_flush(&self) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();
        Self::flush_finished(&self.sink, &mut inner)
    }

    fn flush_finished(sink: &S, inner: &mut Inner) -> Result<(), TraceError> {
        let finished = match inner.finished.as_mut() {
            Some(finished) => finished,
            None => return Ok(()),
        };
        let path = match finished.unflushed_path.as_ref() {
            Some(path) => path,
            None => return Ok(()),
        };

        match sink.flush(path, &finished.document) {
            Ok(()) => {
                finished.unflushed_path = None;
                Ok(())
            }
            Err(source) => {
                warn!("failed to write trace to `{}`: {}", path.display(), source);
                Err(TraceError::Io {
                    path: path.clone(),
                    source,
                })
            }
        }
    }

    /// The document produced by the last `capture_stop`, until the next
    /// `capture_start`.
    pub fn last_trace(&self) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .finished
            .as_ref()
            .map(|finished| finished.document.clone())
    }

    fn misuse(&self, error: TraceError) -> Result<(), TraceError> {
        match self.config.strictness {
            Strictness::Strict => Err(error),
            Strictness::Lenient => {
                debug!("ignoring trace session misuse: {}", error);
                Ok(())
            }
        }
    }

    /// Opens a duration named `name` on the calling thread.
    ///
    /// Never fails; see [`TraceSession::try_duration_push`] for the outcome.
    #[inline]
    pub fn duration_push(&self, name: &str) {
        let _ = self.try_duration_push(name);
    }

    /// Closes the calling thread's innermost open duration.
    #[inline]
    pub fn duration_pop(&self) {
        let _ = self.try_duration_pop();
    }

    /// Like `duration_push`, but reports a dropped push as `Capacity`.
    /// Does nothing and succeeds while idle.
    pub fn try_duration_push(&self, name: &str) -> Result<(), TraceError> {
        if !self.is_capturing() {
            return Ok(());
        }

        let thread_id = current_thread_id();
        let capacity = self.config.capacity;
        let (name, truncated) = truncate_name(name, self.config.max_name_len);

        let mut inner = self.inner.lock();
        let Inner {
            ref mut capture,
            ref mut stats,
            ..
        } = *inner;
        let capture = match capture.as_mut() {
            Some(capture) => capture,
            // Stopped between the flag check and taking the lock.
            None => return Ok(()),
        };

        let timeline = capture
            .threads
            .entry(thread_id)
            .or_insert_with(|| ThreadTimeline::new(capacity));

        if timeline.dropped_depth > 0 || capture.open_total >= capacity {
            timeline.dropped_depth += 1;
            stats.dropped_pushes += 1;
            if stats.dropped_pushes == 1 {
                warn!(
                    "trace session is at its capacity of {} open events, dropping durations",
                    capacity
                );
            }
            return Err(TraceError::Capacity { capacity });
        }

        if truncated {
            stats.truncated_names += 1;
            debug!("truncated trace event name to {:?}", name);
        }

        let start_ts = self
            .clock
            .ticks_to_micros(self.clock.now().saturating_sub(capture.origin));
        match timeline.open.push_open(name.to_owned(), thread_id, start_ts) {
            Ok(depth) => debug_assert_eq!(depth, timeline.begin_slots.len()),
            Err(_) => {
                timeline.dropped_depth += 1;
                stats.dropped_pushes += 1;
                return Err(TraceError::Capacity { capacity });
            }
        }
        capture.open_total += 1;

        // The event we just pushed is on top.
        if let Some(event) = timeline.open.peek() {
            timeline.begin_slots.push(timeline.pending.len());
            timeline.pending.push(PendingRecord {
                bytes: serialization::begin_record(event, self.config.process_id),
                closed: false,
            });
        }

        Ok(())
    }

    /// Like `duration_pop`, but reports a pop with nothing open as
    /// `Unbalanced`. Does nothing and succeeds while idle.
    ///
    /// Open events are keyed by thread id. A thread that exits with regions
    /// still open keeps them (and their share of `capacity`) until
    /// `capture_stop`, and since thread ids are reused, a later thread with
    /// the same id may pop them.
    pub fn try_duration_pop(&self) -> Result<(), TraceError> {
        if !self.is_capturing() {
            return Ok(());
        }

        let thread_id = current_thread_id();

        let mut inner = self.inner.lock();
        let Inner {
            ref mut capture,
            ref mut stats,
            ..
        } = *inner;
        let capture = match capture.as_mut() {
            Some(capture) => capture,
            None => return Ok(()),
        };

        let timeline = match capture.threads.get_mut(&thread_id) {
            Some(timeline) => timeline,
            None => return Err(Self::unbalanced(stats)),
        };

        if timeline.dropped_depth > 0 {
            // Closes a push that was never recorded.
            timeline.dropped_depth -= 1;
            if timeline.is_idle() {
                capture.threads.remove(&thread_id);
            }
            return Ok(());
        }

        let event = match timeline.open.pop_open() {
            Ok(event) => event,
            Err(_) => return Err(Self::unbalanced(stats)),
        };
        capture.open_total -= 1;

        let end_ts = self
            .clock
            .ticks_to_micros(self.clock.now().saturating_sub(capture.origin))
            .max(event.start_ts);

        if let Some(slot) = timeline.begin_slots.pop() {
            timeline.pending[slot].closed = true;
        }
        timeline.pending.push(PendingRecord {
            bytes: serialization::end_record(&event, end_ts, self.config.process_id),
            closed: true,
        });
        stats.durations += 1;

        if timeline.open.is_empty() {
            timeline.emit_closed(&mut capture.buffer);
            capture.threads.remove(&thread_id);
        }

        Ok(())
    }

    fn unbalanced(stats: &mut TraceStats) -> TraceError {
        stats.unbalanced_pops += 1;
        if stats.unbalanced_pops == 1 {
            warn!("trace duration popped without a matching push");
        }
        TraceError::Unbalanced
    }

    /// Pushes `name` now and pops it when the returned guard is dropped.
    #[inline]
    pub fn scope<'a>(&'a self, name: &str) -> DurationGuard<'a, S, C> {
        self.duration_push(name);
        DurationGuard { session: self }
    }
}

impl<S: TraceSink, C: Clock> Drop for TraceSession<S, C> {
    fn drop(&mut self) {
        if let Some(capture) = self.inner.get_mut().capture.as_ref() {
            debug!(
                "dropping trace session with a running capture for `{}`, nothing is written",
                capture.output_path.display()
            );
        }
    }
}

/// When dropped, this `DurationGuard` pops the duration its session pushed
/// in `TraceSession::scope`.
#[must_use]
pub struct DurationGuard<'a, S: TraceSink, C: Clock> {
    session: &'a TraceSession<S, C>,
}

impl<'a, S: TraceSink, C: Clock> Drop for DurationGuard<'a, S, C> {
    #[inline]
    fn drop(&mut self) {
        self.session.duration_pop();
    }
}

/// Cuts `name` to at most `max_len` bytes without splitting a character.
fn truncate_name(name: &str, max_len: usize) -> (&str, bool) {
    if name.len() <= max_len {
        return (name, false);
    }

    let mut end = max_len;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    (&name[..end], true)
}

// Make sure that `TraceSession` can be shared between threads.
fn _assert_bounds() {
    fn assert_bounds_inner<T: Send + Sync + 'static>() {}
    assert_bounds_inner::<TraceSession>();
}
