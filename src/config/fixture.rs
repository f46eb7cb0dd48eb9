use compio::{fs::File, io::AsyncReadExt, io::BufReader};
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use std::{
    borrow::Cow,
    io::Cursor,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::filesystem::{NodeId, NodeKind, PATH_SEPARATOR, validate_name};
use crate::namespace::{NamespaceStore, StoreError};

const ROOT_KEY: &str = "root";

/// One entry of a fixture tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEntry {
    File { name: String, size: u64 },
    Directory { name: String, entries: Vec<FixtureEntry> },
}

impl FixtureEntry {
    pub fn name(&self) -> &str {
        match self {
            FixtureEntry::File { name, .. } | FixtureEntry::Directory { name, .. } => name,
        }
    }
}

/// A namespace described in YAML.
///
/// ```yaml
/// root:
///   docs:
///     report.txt: 1200
///     empty.txt: ~
///   music: {}
/// ```
///
/// Mappings are directories, integers are files of that many bytes and
/// `null` is an empty file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixture {
    entries: Vec<FixtureEntry>,
}

impl Fixture {
    pub async fn from_path(path: PathBuf) -> Result<Self, FixtureError> {
        debug!("Opening fixture file: {}", path.display());
        let file = File::open(&path).await.context(ReadSnafu {
            file_path: path.display().to_string(),
        })?;

        let cursor = Cursor::new(file);
        let mut reader = BufReader::new(cursor);
        let res = reader.read_to_string(String::new()).await;
        match res.0 {
            Ok(n) => debug!("Read fixture file: {n} bytes"),
            Err(e) => {
                return Err(e).context(ReadSnafu {
                    file_path: path.display().to_string(),
                });
            }
        }
        res.1.as_str().try_into()
    }

    pub async fn read(path: &Path) -> Result<Self, FixtureError> {
        Self::from_path(path.to_path_buf()).await
    }

    pub fn entries(&self) -> &[FixtureEntry] {
        &self.entries
    }

    /// Builds the fixture under the store's root and forgets the history of
    /// doing so. Returns the number of nodes created.
    pub fn populate(&self, store: &mut NamespaceStore) -> Result<usize, FixtureError> {
        let root = store.root();
        let created = populate_entries(store, root, &self.entries)?;
        store.clear_history();
        debug!("Populated {} node(s) from fixture", created);
        Ok(created)
    }

    fn parse_entries(
        mapping: &LinkedHashMap<Yaml, Yaml>,
        parent_path: &str,
    ) -> Result<Vec<FixtureEntry>, FixtureError> {
        mapping
            .iter()
            .map(|(key, value)| {
                let name = match key {
                    Yaml::Value(Scalar::String(name)) if validate_name(name).is_ok() => {
                        name.to_string()
                    }
                    _ => {
                        return InvalidEntrySnafu {
                            path: format!("{parent_path}{PATH_SEPARATOR}{key:?}"),
                        }
                        .fail();
                    }
                };
                let path = format!("{parent_path}{PATH_SEPARATOR}{name}");
                match value {
                    Yaml::Mapping(children) => Ok(FixtureEntry::Directory {
                        entries: Self::parse_entries(children, &path)?,
                        name,
                    }),
                    Yaml::Value(Scalar::Null) => Ok(FixtureEntry::File { name, size: 0 }),
                    Yaml::Value(Scalar::Integer(size)) => match u64::try_from(*size) {
                        Ok(size) => Ok(FixtureEntry::File { name, size }),
                        Err(_) => InvalidEntrySnafu { path }.fail(),
                    },
                    _ => InvalidEntrySnafu { path }.fail(),
                }
            })
            .collect()
    }
}

fn populate_entries(
    store: &mut NamespaceStore,
    parent: NodeId,
    entries: &[FixtureEntry],
) -> Result<usize, FixtureError> {
    let mut created = 0;
    for entry in entries {
        let id = match entry {
            FixtureEntry::File { name, size } => store.create_node(name.as_str(), NodeKind::File, *size),
            FixtureEntry::Directory { name, .. } => {
                store.create_node(name.as_str(), NodeKind::Directory, 0)
            }
        };
        store.add_node(id, parent).context(PopulateSnafu)?;
        created += 1;
        if let FixtureEntry::Directory { entries, .. } = entry {
            created += populate_entries(store, id, entries)?;
        }
    }
    Ok(created)
}

impl TryFrom<&str> for Fixture {
    type Error = FixtureError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().ok_or(FixtureError::MalformedFixture)?;

        let top_level = document
            .as_mapping()
            .ok_or(FixtureError::TopLevelNotMap)?;

        let Some(root) = top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed(ROOT_KEY)))) else {
            debug!("Fixture has no '{}' section, the tree stays empty", ROOT_KEY);
            return Ok(Fixture::default());
        };
        let entries = match root {
            Yaml::Mapping(mapping) => Self::parse_entries(mapping, "")?,
            Yaml::Value(Scalar::Null) => Vec::new(),
            _ => return Err(FixtureError::RootNotMap),
        };

        Ok(Fixture { entries })
    }
}

#[derive(Debug, Snafu)]
pub enum FixtureError {
    #[snafu(display("Failed to read the fixture file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse the fixture file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted fixture file"))]
    MalformedFixture,
    #[snafu(display("Top level of the fixture should be a map"))]
    TopLevelNotMap,
    #[snafu(display("The '{}' section should be a map", ROOT_KEY))]
    RootNotMap,
    #[snafu(display("Invalid fixture entry at {}", path))]
    InvalidEntry { path: String },
    #[snafu(display("Failed to build the fixture tree"))]
    Populate { source: StoreError },
}
