use canopy::Resolution;
use clap::ValueEnum;

/// How the binary answers move conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OnConflict {
    /// Prompt on stdin for each conflict
    #[default]
    Ask,
    Replace,
    Skip,
    Cancel,
}

impl OnConflict {
    /// The fixed answer, or `None` when the user is asked.
    pub fn to_resolution(self) -> Option<Resolution> {
        match self {
            OnConflict::Ask => None,
            OnConflict::Replace => Some(Resolution::Replace),
            OnConflict::Skip => Some(Resolution::Skip),
            OnConflict::Cancel => Some(Resolution::Cancel),
        }
    }
}
