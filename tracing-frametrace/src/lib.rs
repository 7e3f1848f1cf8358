use frametrace::{Clock, TraceSession, TraceSink};
use std::sync::Arc;
use tracing_core::{span::Id, Subscriber};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

/// Records every span as a duration: entering pushes the span's name onto
/// the session, exiting pops it.
///
/// Events are ignored. Spans that are entered and exited out of order on
/// one thread pair up by position, not by identity, just like manual
/// `duration_push`/`duration_pop` calls would.
pub struct FrameTraceLayer<S: TraceSink, C: Clock> {
    session: Arc<TraceSession<S, C>>,
}

impl<S: TraceSink, C: Clock> FrameTraceLayer<S, C> {
    pub fn new(session: Arc<TraceSession<S, C>>) -> Self {
        FrameTraceLayer { session }
    }
}

impl<S, C, Sub> Layer<Sub> for FrameTraceLayer<S, C>
where
    S: TraceSink,
    C: Clock,
    Sub: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_enter(&self, id: &Id, ctx: Context<'_, Sub>) {
        if let Some(span) = ctx.span(id) {
            self.session.duration_push(span.name());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, Sub>) {
        if ctx.span(id).is_some() {
            self.session.duration_pop();
        }
    }
}
