//! A scripted in-memory driver.
//!
//! Connect and statement results are taken from FIFO scripts; when a script runs dry a
//! fallback applies (success unless an `always_fail_*` error was set). Every call is
//! counted so tests can assert on exactly how the session drove the driver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Endpoint;
use crate::driver::{Connector, DriverConnection, DriverCursor, StatementOutput};
use crate::error::DriverError;
use crate::types::RowValues;

/// One statement as the driver received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub connection_id: u64,
    pub sql: String,
    pub params: Vec<RowValues>,
}

#[derive(Debug, Default)]
struct ScriptState {
    connects: VecDeque<Result<(), DriverError>>,
    connect_fallback: Option<DriverError>,
    connect_delay: Option<Duration>,
    cursor_failures: VecDeque<DriverError>,
    statements: VecDeque<Result<StatementOutput, DriverError>>,
    statement_fallback: Option<DriverError>,
    statement_delay: Option<Duration>,
    connect_calls: u32,
    closed_connections: u32,
    next_connection_id: u64,
    // connections with an id below this have been cut off
    killed_below: u64,
    executed: Vec<ExecutedStatement>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Cloneable handle to a shared script; every clone drives the same state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        lock(&self.state)
    }

    /// Queue the result of the next connect call.
    pub fn push_connect(&self, result: Result<(), DriverError>) -> &Self {
        self.lock().connects.push_back(result);
        self
    }

    /// Make the next `n` connect calls fail with `err`.
    pub fn fail_connects(&self, n: usize, err: &DriverError) -> &Self {
        let mut state = self.lock();
        for _ in 0..n {
            state.connects.push_back(Err(err.clone()));
        }
        drop(state);
        self
    }

    /// Fail every connect call not covered by the script.
    pub fn always_fail_connects(&self, err: DriverError) -> &Self {
        self.lock().connect_fallback = Some(err);
        self
    }

    /// Make each connect call take `delay` before resolving.
    pub fn delay_connects(&self, delay: Duration) -> &Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    /// Make the next cursor creation fail with `err`.
    pub fn fail_next_cursor(&self, err: DriverError) -> &Self {
        self.lock().cursor_failures.push_back(err);
        self
    }

    /// Queue the result of the next statement.
    pub fn push_statement(&self, result: Result<StatementOutput, DriverError>) -> &Self {
        self.lock().statements.push_back(result);
        self
    }

    /// Fail every statement not covered by the script.
    pub fn always_fail_statements(&self, err: DriverError) -> &Self {
        self.lock().statement_fallback = Some(err);
        self
    }

    /// Make each statement take `delay` before resolving.
    pub fn delay_statements(&self, delay: Duration) -> &Self {
        self.lock().statement_delay = Some(delay);
        self
    }

    /// Simulate the server dropping every connection opened so far.
    pub fn kill_open_connections(&self) {
        let mut state = self.lock();
        state.killed_below = state.next_connection_id;
    }

    #[must_use]
    pub fn connect_calls(&self) -> u32 {
        self.lock().connect_calls
    }

    #[must_use]
    pub fn closed_connections(&self) -> u32 {
        self.lock().closed_connections
    }

    /// Statements that reached the driver, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.lock().executed.clone()
    }

    /// Highest number of statements that were running at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn is_alive(state: &Mutex<ScriptState>, id: u64, closed: bool) -> bool {
    !closed && id >= lock(state).killed_below
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(
        &self,
        _endpoint: &Endpoint,
        _timeout: Duration,
    ) -> Result<ScriptedConnection, DriverError> {
        let (scripted, delay) = {
            let mut state = self.lock();
            state.connect_calls += 1;
            let scripted = match state.connects.pop_front() {
                Some(result) => result,
                None => state.connect_fallback.clone().map_or(Ok(()), Err),
            };
            (scripted, state.connect_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted?;

        let mut state = self.lock();
        let id = state.next_connection_id;
        state.next_connection_id += 1;
        Ok(ScriptedConnection {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    id: u64,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnection {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl DriverConnection for ScriptedConnection {
    type Cursor = ScriptedCursor;

    fn is_usable(&self) -> bool {
        is_alive(&self.state, self.id, false)
    }

    fn cursor(&self) -> Result<ScriptedCursor, DriverError> {
        if let Some(err) = lock(&self.state).cursor_failures.pop_front() {
            return Err(err);
        }
        Ok(ScriptedCursor {
            connection_id: self.id,
            state: Arc::clone(&self.state),
            closed: false,
        })
    }

    async fn close(self) -> Result<(), DriverError> {
        lock(&self.state).closed_connections += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScriptedCursor {
    connection_id: u64,
    state: Arc<Mutex<ScriptState>>,
    closed: bool,
}

#[async_trait]
impl DriverCursor for ScriptedCursor {
    fn is_closed(&self) -> bool {
        !is_alive(&self.state, self.connection_id, self.closed)
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<StatementOutput, DriverError> {
        if self.is_closed() {
            return Err(DriverError::transient("cursor already closed"));
        }

        let delay = {
            let mut state = lock(&self.state);
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.executed.push(ExecutedStatement {
                connection_id: self.connection_id,
                sql: sql.to_string(),
                params: params.to_vec(),
            });
            state.statement_delay
        };

        // give any concurrent caller a chance to overlap with us
        tokio::task::yield_now().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        state.in_flight -= 1;
        match state.statements.pop_front() {
            Some(result) => result,
            None => match &state.statement_fallback {
                Some(err) => Err(err.clone()),
                None => Ok(StatementOutput::Command { rows_affected: 1 }),
            },
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
