//! Bridge from Bevy's `tracing` spans to Micromegas thread-local spans.
//!
//! Bevy (with the `trace` feature) emits a `tracing` span for every schedule
//! run. This layer forwards the selected schedule spans as Micromegas
//! named-scope events, so each race tick shows up on the trace timeline
//! next to the decision core's own spans.

use micromegas_tracing::dispatch::{on_begin_named_scope, on_end_named_scope};
use micromegas_tracing::intern_string::intern_string;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

// All bridged schedule spans share a single static source location.
micromegas_tracing::static_span_location!(BRIDGE_LOCATION);

/// Which schedule spans are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleFilter {
    All,
    /// Only the fixed-timestep schedules that drive the race.
    #[default]
    FixedTick,
}

impl ScheduleFilter {
    pub fn accepts(self, schedule: &str) -> bool {
        match self {
            ScheduleFilter::All => true,
            ScheduleFilter::FixedTick => {
                schedule.starts_with("Fixed") || schedule == "RunFixedMainLoop"
            }
        }
    }
}

/// Data stored in each bridged span's extensions.
struct ScheduleSpanData {
    name: &'static str,
}

/// Field visitor that extracts the `name` field from a tracing span.
#[derive(Default)]
struct NameVisitor {
    name: Option<String>,
}

impl Visit for NameVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "name" {
            self.name = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "name" && self.name.is_none() {
            self.name = Some(format!("{:?}", value));
        }
    }
}

/// A `tracing_subscriber::Layer` that bridges Bevy schedule spans into
/// Micromegas thread-local named-scope events.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicromegasBridgeLayer {
    filter: ScheduleFilter,
}

impl MicromegasBridgeLayer {
    pub fn new(filter: ScheduleFilter) -> Self {
        Self { filter }
    }
}

impl<S> Layer<S> for MicromegasBridgeLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != "schedule" {
            return;
        }

        let mut visitor = NameVisitor::default();
        attrs.record(&mut visitor);

        let label = visitor.name.unwrap_or_default();
        if !self.filter.accepts(&label) {
            return;
        }
        let interned = intern_string(&label);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut()
                .insert(ScheduleSpanData { name: interned });
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let extensions = span.extensions();
            if let Some(data) = extensions.get::<ScheduleSpanData>() {
                on_begin_named_scope(&BRIDGE_LOCATION, data.name);
            }
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let extensions = span.extensions();
            if let Some(data) = extensions.get::<ScheduleSpanData>() {
                on_end_named_scope(&BRIDGE_LOCATION, data.name);
            }
        }
    }
}
