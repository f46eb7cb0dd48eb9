mod log_level;
mod on_conflict;

pub use log_level::LogLevel;
pub use on_conflict::OnConflict;
