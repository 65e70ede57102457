//! Progress and warning events emitted by backup and restore.
//!
//! Components never configure logging themselves. They report [`Event`]s to
//! an injected [`Observer`]; [`TracingObserver`] forwards them to `tracing`.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::restore::RestorePhase;

/// Something noteworthy that happened during an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A restore attempt entered a phase.
    PhaseStarted { attempt: u32, phase: RestorePhase },

    /// A table was captured into the snapshot.
    TableBackedUp { table: String, rows: usize },

    /// A table definition was rebuilt from the snapshot.
    TableDefined { table: String, columns: usize },

    /// A table's rows were replaced.
    TableRestored {
        table: String,
        deleted: u64,
        inserted: u64,
    },

    /// An index whose columns could not be resolved was left out.
    IndexSkipped { table: String, index: String },

    /// A temporal value matched no known format and was stored as NULL.
    ValueNulled {
        table: String,
        column: String,
        value: String,
    },

    /// A foreign key points at a table that is not in the snapshot.
    DanglingReference { table: String, referenced: String },

    /// An attempt failed on a lock and will be retried after `delay`.
    AttemptLocked {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        message: String,
    },
}

impl Event {
    /// True for events that indicate degraded output.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::IndexSkipped { .. } | Event::ValueNulled { .. } | Event::DanglingReference { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::PhaseStarted { attempt, phase } => {
                write!(f, "attempt {}: {}", attempt, phase)
            }
            Event::TableBackedUp { table, rows } => write!(f, "{}: backed up {} rows", table, rows),
            Event::TableDefined { table, columns } => {
                write!(f, "{}: defined {} columns", table, columns)
            }
            Event::TableRestored {
                table,
                deleted,
                inserted,
            } => write!(
                f,
                "{}: deleted {} rows, inserted {} rows",
                table, deleted, inserted
            ),
            Event::IndexSkipped { table, index } => write!(
                f,
                "{}: skipping index {} (no matching columns)",
                table, index
            ),
            Event::ValueNulled {
                table,
                column,
                value,
            } => write!(
                f,
                "{}.{}: unparseable temporal value {:?} stored as NULL",
                table, column, value
            ),
            Event::DanglingReference { table, referenced } => write!(
                f,
                "{}: foreign key references {} which is not in the snapshot",
                table, referenced
            ),
            Event::AttemptLocked {
                attempt,
                max_attempts,
                delay,
                message,
            } => write!(
                f,
                "attempt {}/{} hit a lock ({}), retrying in {:?}",
                attempt, max_attempts, message, delay
            ),
        }
    }
}

/// Receives events from running operations.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event) {
        match event {
            Event::PhaseStarted { attempt, phase } => {
                debug!(attempt, phase = %phase, "Entering restore phase");
            }
            Event::TableDefined { .. } => debug!("{}", event),
            Event::AttemptLocked { attempt, .. } => warn!(attempt, "{}", event),
            e if e.is_warning() => warn!("{}", e),
            e => info!("{}", e),
        }
    }
}
