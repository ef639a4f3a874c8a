//! Event log of a build.
//!
//! Every structural change the patcher makes is recorded as an [`Event`]: edits, register
//! allocations, synthesized helpers, aggregate registrations, literal overrides and hooks. The
//! log is append only and can be inspected after the build or ignored.
//!
//! ```rust,ignore
//! ctx.events()
//!     .record(EventKind::HookInstalled)
//!     .at(method, 12)
//!     .message("setProtoBuffer([B)V");
//!
//! println!("{}", ctx.events().summary());
//! ```

use std::{collections::HashMap, fmt};

use crate::metadata::MethodId;

/// Categories of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Instructions were inserted into a method.
    InstructionsInserted,
    /// Instructions were replaced.
    InstructionsReplaced,
    /// Instructions were removed.
    InstructionsRemoved,
    /// Scratch registers were allocated at an edit point.
    RegistersAllocated,
    /// The allocator found no free register and a helper was used instead.
    RegistersExhausted,
    /// A helper method was synthesized.
    HelperSynthesized,
    /// An aggregate was opened.
    AggregateOpened,
    /// An entry was registered in an aggregate.
    EntryRegistered,
    /// An aggregate was finalized.
    AggregateFinalized,
    /// A literal guarded value was forced.
    LiteralOverridden,
    /// The returns of a method were forced to a constant.
    ReturnOverridden,
    /// A hook point was located.
    HookLocated,
    /// A call was attached to a hook point.
    HookInstalled,
    /// The instrumentation strategy was selected.
    StrategySelected,
    /// A patch started executing.
    PatchStarted,
    /// A patch completed.
    PatchCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::InstructionsInserted => "instructions inserted",
            Self::InstructionsReplaced => "instructions replaced",
            Self::InstructionsRemoved => "instructions removed",
            Self::RegistersAllocated => "registers allocated",
            Self::RegistersExhausted => "registers exhausted",
            Self::HelperSynthesized => "helper synthesized",
            Self::AggregateOpened => "aggregate opened",
            Self::EntryRegistered => "entry registered",
            Self::AggregateFinalized => "aggregate finalized",
            Self::LiteralOverridden => "literal overridden",
            Self::ReturnOverridden => "return overridden",
            Self::HookLocated => "hook located",
            Self::HookInstalled => "hook installed",
            Self::StrategySelected => "strategy selected",
            Self::PatchStarted => "patch started",
            Self::PatchCompleted => "patch completed",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Returns true if this event changed code.
    #[must_use]
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            Self::InstructionsInserted
                | Self::InstructionsReplaced
                | Self::InstructionsRemoved
                | Self::HelperSynthesized
                | Self::EntryRegistered
                | Self::AggregateFinalized
                | Self::LiteralOverridden
                | Self::ReturnOverridden
                | Self::HookInstalled
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The method where the event occurred (if applicable).
    pub method: Option<MethodId>,
    /// Instruction index within the method.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Patch that caused the event.
    pub patch: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: message.into(),
            patch: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(method) = self.method {
            write!(f, " in {method}")?;
        }
        if let Some(location) = self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

/// Fluent event creation, the event is added to the log when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Sets the method and instruction index.
    pub fn at(mut self, method: MethodId, location: usize) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method);
            event.location = Some(location);
        }
        self
    }

    /// Sets only the method.
    pub fn method(mut self, method: MethodId) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method);
        }
        self
    }

    /// Sets the message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.message = message.into();
        }
        self
    }

    /// Associates the event with a patch.
    pub fn patch(mut self, patch: impl Into<String>) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.patch = Some(patch.into());
        }
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.push(event);
        }
    }
}

/// Append only collection of events.
///
/// A disabled log accepts and drops everything, so callers never need to check whether
/// recording is on.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
    enabled: bool,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let log = Self {
            events: boxcar::Vec::new(),
            enabled: self.enabled,
        };
        for (_, event) in &self.events {
            log.events.push(event.clone());
        }
        log
    }
}

impl EventLog {
    /// Creates an empty, recording log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
            enabled: true,
        }
    }

    /// Creates a log that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            events: boxcar::Vec::new(),
            enabled: false,
        }
    }

    /// Returns true if events are kept.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event::new(kind, kind.description())),
        }
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.push(Event::new(EventKind::Warning, message));
    }

    fn push(&self, event: Event) {
        if self.enabled {
            self.events.push(event);
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events of a specific method.
    pub fn filter_method(&self, method: MethodId) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.method == Some(method))
    }

    /// Returns an iterator over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of the modifications.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut counts: Vec<_> = self
            .count_by_kind()
            .into_iter()
            .filter(|(kind, _)| kind.is_modification())
            .collect();
        if counts.is_empty() {
            return format!("{} events", self.len());
        }

        counts.sort();
        counts
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
