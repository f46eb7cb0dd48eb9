use std::str::FromStr;

use derive_more::Display;
use snafu::Snafu;

use crate::filesystem::NodeId;

/// Caller's answer to a [`Conflict`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Remove the existing node and move the source in its place.
    #[display("replace")]
    Replace,
    /// Leave the source where it is.
    #[display("skip")]
    Skip,
    /// Abort the whole move.
    #[display("cancel")]
    Cancel,
}

impl FromStr for Resolution {
    type Err = UnknownResolution;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" | "r" => Ok(Resolution::Replace),
            "skip" | "s" => Ok(Resolution::Skip),
            "cancel" | "c" => Ok(Resolution::Cancel),
            _ => UnknownResolutionSnafu { input: s.trim() }.fail(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("'{}' is not one of replace, skip or cancel", input))]
pub struct UnknownResolution {
    input: String,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both nodes are files, or the name is already claimed by another source.
    #[display("name taken")]
    NameTaken,
    /// A directory meets a file of the same name.
    #[display("kind mismatch")]
    KindMismatch,
}

/// A name collision that needs a [`Resolution`] before the move can go on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub message: String,
    pub kind: ConflictKind,
    pub source: NodeId,
    pub existing: NodeId,
    pub target: NodeId,
    /// Display path the source would end up at.
    pub target_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub node_name: String,
    pub percentage: u8,
}

impl ProgressUpdate {
    pub fn new(current: usize, total: usize, node_name: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            current,
            total,
            node_name: node_name.into(),
            percentage,
        }
    }
}

/// Summary of a completed move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub moved: usize,
    pub replaced: usize,
    pub merged: usize,
    pub skipped: usize,
}

/// What a [`MoveSession`](super::MoveSession) stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveStep {
    /// Waiting for [`MoveSession::resolve`](super::MoveSession::resolve).
    Conflict(Conflict),
    /// One node was moved. Step again to continue.
    Progress(ProgressUpdate),
    /// Finished. `None` when nothing was moved.
    Completed(Option<MoveReport>),
    Cancelled,
}
