//! Change tracking and diagnostics for pass execution.
//!
//! Passes and the analysis cache record what they did — recomputations,
//! invalidations, gate skips, canonicalization steps — into an [`EventLog`].
//! The log is append-only and safe to write from parallel per-function pass
//! runs. Tests use it to assert the exact side-effect profile of a run.

use std::fmt;

use crate::{analysis::AnalysisKind, ir::FunctionId};

/// The kind of event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A cached analysis was (re)computed on demand.
    AnalysisComputed,
    /// A cached analysis entry was dropped by an invalidation.
    AnalysisInvalidated,
    /// An invalidation request was issued against the cache.
    InvalidationRequested,
    /// A pass declined to run on a function (configuration gate or
    /// synthesized-initializer gate).
    PassSkipped,
    /// Loop canonicalization inserted a preheader block.
    PreheaderInserted,
    /// Loop canonicalization merged multiple latches into one.
    LatchMerged,
    /// A loop visitor reported that it changed the function.
    VisitorChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::AnalysisComputed => "analysis-computed",
            EventKind::AnalysisInvalidated => "analysis-invalidated",
            EventKind::InvalidationRequested => "invalidation-requested",
            EventKind::PassSkipped => "pass-skipped",
            EventKind::PreheaderInserted => "preheader-inserted",
            EventKind::LatchMerged => "latch-merged",
            EventKind::VisitorChanged => "visitor-changed",
        };
        f.write_str(name)
    }
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The function the event concerns, if any.
    pub function: Option<FunctionId>,
    /// The analysis kind the event concerns, if any.
    pub analysis: Option<AnalysisKind>,
    /// Free-form detail (e.g. the invalidation scope).
    pub message: Option<String>,
}

/// Append-only log of [`Event`]s.
///
/// Writers append concurrently without locking; readers observe every event
/// appended before the read began.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        EventLog::default()
    }

    /// Starts recording an event of the given kind.
    ///
    /// The event is committed when the returned recorder is dropped:
    ///
    /// ```rust,ignore
    /// events.record(EventKind::AnalysisComputed)
    ///     .at(function_id)
    ///     .analysis(AnalysisKind::Dominance);
    /// ```
    pub fn record(&self, kind: EventKind) -> EventRecorder<'_> {
        EventRecorder {
            log: self,
            event: Some(Event {
                kind,
                function: None,
                analysis: None,
                message: None,
            }),
        }
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all recorded events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, event)| event)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Counts events of the given kind recorded for the given function.
    #[must_use]
    pub fn count_for(&self, kind: EventKind, function: FunctionId) -> usize {
        self.iter()
            .filter(|e| e.kind == kind && e.function == Some(function))
            .count()
    }
}

/// Builder for one event; commits to the log on drop.
pub struct EventRecorder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventRecorder<'_> {
    /// Attaches the function the event concerns.
    #[must_use]
    pub fn at(mut self, function: FunctionId) -> Self {
        if let Some(event) = &mut self.event {
            event.function = Some(function);
        }
        self
    }

    /// Attaches the analysis kind the event concerns.
    #[must_use]
    pub fn analysis(mut self, kind: AnalysisKind) -> Self {
        if let Some(event) = &mut self.event {
            event.analysis = Some(kind);
        }
        self
    }

    /// Attaches a free-form detail message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(event) = &mut self.event {
            event.message = Some(message.into());
        }
        self
    }
}

impl Drop for EventRecorder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}
