//! Per-attempt telemetry sink.
//!
//! A [`Session`](crate::Session) calls its single injected [`OutcomeReporter`] after every
//! connect attempt and every statement attempt. One reporter is typically shared by many
//! sessions, so implementations must be `Send + Sync`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorKind;
use crate::outcome::FailureReason;

/// Event name used for connection attempts.
pub const CONNECT_EVENT: &str = "CONNECT";

pub type ReportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    ConnectAttempt,
    QueryAttempt,
}

/// One connect or statement attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeEvent {
    pub kind: EventKind,
    /// `CONNECT`, or the statement's leading keyword (`SELECT`, `INSERT`, ...).
    pub name: String,
    pub elapsed: Duration,
    pub row_count: usize,
    /// Zero for the initial try, then one per retry.
    pub attempt: u32,
    pub failure: Option<FailureReason>,
}

impl OutcomeEvent {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    #[must_use]
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Receives every outcome event a session produces.
///
/// Reporting is best-effort: a returned error is logged by the session and never changes
/// the result of the database operation being described.
pub trait OutcomeReporter: Send + Sync {
    /// Record one event.
    ///
    /// # Errors
    /// Implementations return an error when the event could not be recorded.
    fn report(&self, event: &OutcomeEvent) -> Result<(), ReportError>;
}

impl<R: OutcomeReporter + ?Sized> OutcomeReporter for Arc<R> {
    fn report(&self, event: &OutcomeEvent) -> Result<(), ReportError> {
        (**self).report(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl OutcomeReporter for NoopReporter {
    fn report(&self, _event: &OutcomeEvent) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl OutcomeReporter for TracingReporter {
    fn report(&self, event: &OutcomeEvent) -> Result<(), ReportError> {
        match &event.failure {
            None => tracing::debug!(
                kind = ?event.kind,
                name = %event.name,
                elapsed_ms = event.elapsed_millis(),
                rows = event.row_count,
                attempt = event.attempt,
                "attempt succeeded"
            ),
            Some(reason) => tracing::warn!(
                kind = ?event.kind,
                name = %event.name,
                elapsed_ms = event.elapsed_millis(),
                attempt = event.attempt,
                error_kind = %reason.kind,
                error = %reason.message,
                "attempt failed"
            ),
        }
        Ok(())
    }
}

/// Aggregated numbers for one event name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStats {
    pub requests: u64,
    pub failures: u64,
    pub total_elapsed: Duration,
    pub max_elapsed: Duration,
    pub rows: u64,
}

impl EventStats {
    #[must_use]
    pub fn average_millis(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_elapsed.as_secs_f64() * 1000.0 / self.requests as f64
        }
    }

    fn record(&mut self, event: &OutcomeEvent) {
        self.requests += 1;
        if !event.succeeded() {
            self.failures += 1;
        }
        self.total_elapsed += event.elapsed;
        self.max_elapsed = self.max_elapsed.max(event.elapsed);
        self.rows += event.row_count as u64;
    }
}

/// Keeps every event in memory. Safe to share between many sessions.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<OutcomeEvent>>,
}

impl MemoryReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutcomeEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            // a panicking writer cannot leave a half-pushed Vec behind
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Events of `kind` whose success matches `succeeded`.
    #[must_use]
    pub fn count(&self, kind: EventKind, succeeded: bool) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.kind == kind && e.succeeded() == succeeded)
            .count()
    }

    #[must_use]
    pub fn failures(&self) -> Vec<OutcomeEvent> {
        self.lock()
            .iter()
            .filter(|e| !e.succeeded())
            .cloned()
            .collect()
    }

    /// Per-name statistics, sorted by name.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<String, EventStats> {
        let mut stats: BTreeMap<String, EventStats> = BTreeMap::new();
        for event in self.lock().iter() {
            stats.entry(event.name.clone()).or_default().record(event);
        }
        stats
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl OutcomeReporter for MemoryReporter {
    fn report(&self, event: &OutcomeEvent) -> Result<(), ReportError> {
        self.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards each event to several sinks, still presenting one reporter to the session.
///
/// Every sink sees every event even if an earlier sink fails; the first error is returned.
#[derive(Default, Clone)]
pub struct FanoutReporter {
    sinks: Vec<Arc<dyn OutcomeReporter>>,
}

impl FanoutReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn OutcomeReporter>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl OutcomeReporter for FanoutReporter {
    fn report(&self, event: &OutcomeEvent) -> Result<(), ReportError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.report(event) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, millis: u64, rows: usize, failed: bool) -> OutcomeEvent {
        OutcomeEvent {
            kind: if name == CONNECT_EVENT {
                EventKind::ConnectAttempt
            } else {
                EventKind::QueryAttempt
            },
            name: name.to_string(),
            elapsed: Duration::from_millis(millis),
            row_count: rows,
            attempt: 0,
            failure: failed.then(|| FailureReason::new(ErrorKind::QueryFailed, "boom")),
        }
    }

    #[test]
    fn memory_reporter_summarises_by_name() {
        let reporter = MemoryReporter::new();
        reporter.report(&event("SELECT", 10, 3, false)).unwrap();
        reporter.report(&event("SELECT", 30, 1, false)).unwrap();
        reporter.report(&event("SELECT", 5, 0, true)).unwrap();
        reporter.report(&event(CONNECT_EVENT, 2, 0, false)).unwrap();

        let summary = reporter.summary();
        let select = &summary["SELECT"];
        assert_eq!(select.requests, 3);
        assert_eq!(select.failures, 1);
        assert_eq!(select.rows, 4);
        assert_eq!(select.max_elapsed, Duration::from_millis(30));
        assert!((select.average_millis() - 15.0).abs() < 1e-9);
        assert_eq!(reporter.count(EventKind::ConnectAttempt, true), 1);
        assert_eq!(reporter.failures().len(), 1);
    }

    struct Failing;

    impl OutcomeReporter for Failing {
        fn report(&self, _event: &OutcomeEvent) -> Result<(), ReportError> {
            Err("sink offline".into())
        }
    }

    #[test]
    fn fanout_reaches_every_sink_and_surfaces_first_error() {
        let memory = Arc::new(MemoryReporter::new());
        let fanout = FanoutReporter::new()
            .with(Arc::new(Failing))
            .with(memory.clone());

        let err = fanout.report(&event("INSERT", 1, 1, false)).unwrap_err();
        assert_eq!(err.to_string(), "sink offline");
        assert_eq!(memory.len(), 1);
    }
}
