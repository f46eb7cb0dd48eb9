use std::path::PathBuf;

use clap::Parser;

use crate::application::data::{LogLevel, OnConflict};

/// Loads a namespace fixture, optionally moves nodes around in it and prints
/// the resulting tree.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// YAML file describing the initial tree
    pub fixture: PathBuf,

    /// Paths of the nodes to move, e.g. `/docs/report.txt`
    #[clap(long = "move", num_args = 1.., requires = "into")]
    pub sources: Vec<String>,

    /// Directory the nodes are moved into
    #[clap(long, requires = "sources")]
    pub into: Option<String>,

    #[clap(long, default_value = "ask", value_enum)]
    pub on_conflict: OnConflict,

    /// Undo the last operation before printing
    #[clap(long)]
    pub undo: bool,

    /// Print the paths of nodes whose name contains this text
    #[clap(long)]
    pub find: Option<String>,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_a_move() {
        let cli = Cli::try_parse_from([
            "canopy",
            "tree.yaml",
            "--move",
            "/b",
            "/c",
            "--into",
            "/a",
            "--on-conflict",
            "skip",
        ])
        .unwrap();

        assert_eq!(cli.sources, vec!["/b", "/c"]);
        assert_eq!(cli.into.as_deref(), Some("/a"));
        assert_eq!(cli.on_conflict, OnConflict::Skip);
        assert!(!cli.undo);
    }

    #[test]
    fn cli_requires_a_target_for_moves() {
        assert!(Cli::try_parse_from(["canopy", "tree.yaml", "--move", "/b"]).is_err());
    }
}
