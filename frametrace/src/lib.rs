//! In-process duration recorder producing trace-event JSON.
//!
//! Instrumented code calls [`TraceSession::duration_push`] when it enters a
//! region and [`TraceSession::duration_pop`] when it leaves. While a capture
//! is running the session pairs these up per thread, and on
//! [`TraceSession::capture_stop`] the whole timeline is written out as a
//! document that Chrome's `about:tracing`, Perfetto and similar viewers load
//! directly.
//!
//! ```no_run
//! use frametrace::{TraceConfig, TraceSession};
//!
//! let session = TraceSession::new(TraceConfig::default());
//! session.capture_start("frame.json")?;
//! {
//!     let _update = session.scope("update");
//!     session.duration_push("physics");
//!     session.duration_pop();
//! }
//! session.capture_stop()?;
//! # Ok::<(), frametrace::TraceError>(())
//! ```
//!
//! Recording is best effort: pushes beyond the configured capacity are
//! dropped, unmatched pops are ignored, and neither ever panics. Only
//! failing to write the finished file is reported as an error.

mod clock;
mod config;
mod error;
mod open_events;
mod serialization;
mod session;
mod sink;

pub mod testing_common;

pub use crate::clock::{Clock, WallTime};
pub use crate::config::{Strictness, TraceConfig};
pub use crate::error::TraceError;
pub use crate::open_events::{OpenEvent, OpenEventStack, StackError};
pub use crate::serialization::{begin_record, closing, end_record, preamble, Phase, TraceBuffer};
pub use crate::session::{
    current_thread_id, DurationGuard, SessionState, TraceSession, TraceStats,
};
pub use crate::sink::{FileSink, MemorySink, TraceSink};
