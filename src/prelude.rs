//! Convenient imports for common functionality.
//!
//! ```no_run
//! use pg_session::prelude::*;
//! ```

pub use crate::config::{Endpoint, SessionConfig};
pub use crate::error::{ErrorKind, SessionError};
pub use crate::outcome::{FailureReason, QueryOutcome};
pub use crate::reporter::{
    FanoutReporter, MemoryReporter, NoopReporter, OutcomeEvent, OutcomeReporter, TracingReporter,
};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::session::{ConnectionState, Session};
pub use crate::translation::PlaceholderStyle;
pub use crate::types::{ErrorMode, RowValues};
