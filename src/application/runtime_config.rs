use std::path::PathBuf;

use crate::{application::data::OnConflict, cli::Cli};

#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub sources: Vec<String>,
    pub into: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub fixture: PathBuf,
    pub move_request: Option<MoveRequest>,
    pub on_conflict: OnConflict,
    pub undo: bool,
    pub find: Option<String>,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        let move_request = cli.into.map(|into| MoveRequest {
            sources: cli.sources,
            into,
        });
        Self {
            fixture: cli.fixture,
            move_request,
            on_conflict: cli.on_conflict,
            undo: cli.undo,
            find: cli.find,
        }
    }
}
