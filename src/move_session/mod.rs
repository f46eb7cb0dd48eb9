//! Two-phase move with interactive conflict resolution.
//!
//! A [`MoveSession`] is driven by the caller: it suspends at every conflict
//! until a [`Resolution`] is supplied, then moves one node per step while
//! reporting progress.

mod conflict;
mod resolver;
mod session;

pub use conflict::{
    Conflict, ConflictKind, MoveReport, MoveStep, ProgressUpdate, Resolution, UnknownResolution,
};
pub use resolver::{ConflictResolver, FixedPolicy};
pub use session::{MoveError, MoveSession};
